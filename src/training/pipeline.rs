//! The training flow: `start → preprocessing → split → train_model →
//! evaluate → end`, each step timed and logged by [`step`].

use super::dataset::{self, DatasetError, Samples, Table};
use super::evaluation::{classification_report, ClassificationMetrics};
use super::grid::{grid_search, GridSearchError};
use super::plot::{save_confusion_matrices, PlotError};
use super::split::{train_test_split, SplitError, TrainTestSplit};
use super::tracking::{Run, RunStatus, TrackingError, TrackingStore};
use crate::classifier::{
    Classifier, Estimator, ForestParams, Kernel, LogisticModel, LogisticParams, ModelArtifact,
    ModelError, RandomForest, SvmModel, SvmParams, TrainedModel,
};
use crate::config::TrainConfig;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span, warn};

pub const DATASET_LINK: &str = "https://www.kaggle.com/datasets/uciml/breast-cancer-wisconsin-data";
pub const DATASET_VERSION: &str = "v2";
pub const FOREST_ARTIFACT: &str = "random_forest_model";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    GridSearch(#[from] GridSearchError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error("failed to serialize {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to render {path}: {source}")]
    Plot {
        path: PathBuf,
        source: PlotError,
    },
}

/// Models fitted by `train_model`, plus the run they were logged under.
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub run_id: String,
    pub feature_names: Vec<String>,
    pub rf: RandomForest,
    pub svc: SvmModel,
    pub logreg: LogisticModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReport {
    pub name: &'static str,
    pub suffix: &'static str,
    pub metrics: ClassificationMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub run_id: String,
    pub models: Vec<ModelReport>,
}

impl PipelineReport {
    pub fn model(&self, suffix: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.suffix == suffix)
    }
}

pub fn run(config: &TrainConfig) -> Result<PipelineReport, PipelineError> {
    config.validate().map_err(PipelineError::Config)?;
    let store = TrackingStore::open(&config.tracking_dir)?;

    let table = step("start", || start(config))?;
    let samples = step("preprocessing", || preprocessing(&table))?;
    let split = step("split", || split(config, &samples))?;
    let trained = step("train_model", || train_model(config, &store, &split.train))?;
    let finished = step("evaluate", || evaluate(config, &store, &trained, &split.test))
        .and_then(|report| step("end", || end(config, &trained)).map(|_| report));
    if finished.is_err() {
        mark_failed(&store, config, &trained.run_id);
    }
    finished
}

/// Reopens a run that `train_model` already closed and records the failure
/// of a later step on it.
fn mark_failed(store: &TrackingStore, config: &TrainConfig, run_id: &str) {
    let outcome = store
        .experiment(&config.experiment)
        .and_then(|experiment| store.resume_run(&experiment, run_id))
        .and_then(|run| run.end(RunStatus::Failed));
    if let Err(e) = outcome {
        warn!("could not mark run {} as failed: {}", run_id, e);
    }
}

fn step<T>(
    name: &'static str,
    body: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let span = info_span!("step", name);
    let _entered = span.enter();
    let started = Instant::now();
    info!("Starting step {}", name);
    match body() {
        Ok(value) => {
            info!("Step {} finished in {:.2}s", name, started.elapsed().as_secs_f64());
            Ok(value)
        }
        Err(e) => {
            error!("Step {} failed: {}", name, e);
            Err(e)
        }
    }
}

fn start(config: &TrainConfig) -> Result<Table, PipelineError> {
    std::fs::create_dir_all(&config.output_dir).map_err(|source| PipelineError::Io {
        path: config.output_dir.clone(),
        source,
    })?;
    Ok(dataset::load_csv(&config.data_path)?)
}

fn preprocessing(table: &Table) -> Result<Samples, PipelineError> {
    let samples = dataset::preprocess(table)?;
    let [benign, malignant] = samples.class_counts();
    info!("X shape: ({}, {})", samples.records.nrows(), samples.records.ncols());
    info!("y shape: ({},)", samples.len());
    info!("y value counts: 0={}, 1={}", benign, malignant);
    Ok(samples)
}

fn split(config: &TrainConfig, samples: &Samples) -> Result<TrainTestSplit, PipelineError> {
    let split = train_test_split(samples, config.test_size, config.random_state)?;
    info!("Train rows: {}, test rows: {}", split.train.len(), split.test.len());
    Ok(split)
}

/// One classifier family: how it is named in the tracker, its search grid
/// and the parameters used when tuning is off.
struct Family<E> {
    name: &'static str,
    suffix: &'static str,
    artifact: &'static str,
    grid: Vec<E>,
    fixed: E,
}

fn forest_family(config: &TrainConfig) -> Family<ForestParams> {
    let seed = config.random_state;
    let grid = [50, 100, 200]
        .into_iter()
        .flat_map(|n_estimators| {
            [Some(5), Some(10), None]
                .into_iter()
                .map(move |max_depth| ForestParams {
                    n_estimators,
                    max_depth,
                    seed,
                })
        })
        .collect();
    Family {
        name: "RandomForest",
        suffix: "rf",
        artifact: FOREST_ARTIFACT,
        grid,
        fixed: ForestParams {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth(),
            seed,
        },
    }
}

fn svm_family(config: &TrainConfig) -> Family<SvmParams> {
    let mut kernels = vec![config.svc_kernel];
    for kernel in [Kernel::Linear, Kernel::Poly] {
        if !kernels.contains(&kernel) {
            kernels.push(kernel);
        }
    }
    let grid = [0.1, 1.0, 10.0]
        .into_iter()
        .flat_map(|c| kernels.iter().map(move |&kernel| SvmParams { c, kernel }))
        .collect();
    Family {
        name: "SVM",
        suffix: "svc",
        artifact: "svc_model",
        grid,
        fixed: SvmParams {
            c: 1.0,
            kernel: config.svc_kernel,
        },
    }
}

fn logistic_family(config: &TrainConfig) -> Family<LogisticParams> {
    Family {
        name: "LogisticRegression",
        suffix: "logreg",
        artifact: "logreg_model",
        grid: [0.1, 1.0, 10.0]
            .into_iter()
            .map(|c| LogisticParams { c })
            .collect(),
        fixed: LogisticParams {
            c: config.c_logreg,
        },
    }
}

fn train_model(
    config: &TrainConfig,
    store: &TrackingStore,
    train: &Samples,
) -> Result<TrainedModels, PipelineError> {
    let experiment = store.experiment(&config.experiment)?;
    let run = store.start_run(&experiment)?;
    let run_id = run.id().to_string();
    info!("Tracking run {} in experiment {}", run_id, experiment.name);

    within_run(run, |run| {
        run.log_param("n_estimators", config.n_estimators)?;
        run.log_param("max_depth", config.max_depth)?;
        run.log_param("test_size", config.test_size)?;
        run.log_param("random_state", config.random_state)?;
        run.log_param("svc_kernel", config.svc_kernel)?;
        run.log_param("c_logreg", config.c_logreg)?;
        run.log_param("hyperparameter_tuning", config.hyperparameter_tuning)?;
        run.log_param("dataset_link", DATASET_LINK)?;
        run.log_param("dataset_version", DATASET_VERSION)?;

        let info_path = config.output_dir.join("dataset_info.json");
        write_json(
            &info_path,
            &json!({
                "dataset_link": DATASET_LINK,
                "dataset_version": DATASET_VERSION,
            }),
        )?;
        run.log_artifact(&config.data_path)?;
        run.log_artifact(&info_path)?;

        Ok(TrainedModels {
            run_id: run_id.clone(),
            feature_names: train.feature_names.clone(),
            rf: fit_family(run, config, forest_family(config), train)?,
            svc: fit_family(run, config, svm_family(config), train)?,
            logreg: fit_family(run, config, logistic_family(config), train)?,
        })
    })
}

fn fit_family<E>(
    run: &Run,
    config: &TrainConfig,
    family: Family<E>,
    train: &Samples,
) -> Result<E::Model, PipelineError>
where
    E: Estimator + Clone + Debug + Serialize,
    E::Model: Clone + Into<TrainedModel>,
{
    let model = if config.hyperparameter_tuning {
        let result = grid_search(family.grid, config.cv_folds, &train.records, &train.targets)?;
        let best = serde_json::to_string(&result.best_params)?;
        info!(
            "{}: best params {} (cv accuracy {:.4})",
            family.name, best, result.best_score
        );
        run.log_param(&format!("best_{}_params", family.suffix), best)?;
        run.log_metric(&format!("best_cv_score_{}", family.suffix), result.best_score)?;
        result.best_model
    } else {
        let model = family.fixed.fit(&train.records, &train.targets)?;
        info!("{}: fitted with {:?}", family.name, family.fixed);
        run.log_param(&format!("model_{}", family.suffix), family.name)?;
        model
    };

    let artifact = ModelArtifact::new(
        family.artifact,
        train.feature_names.clone(),
        model.clone().into(),
    );
    run.log_model(family.artifact, &artifact)?;
    Ok(model)
}

fn evaluate(
    config: &TrainConfig,
    store: &TrackingStore,
    trained: &TrainedModels,
    test: &Samples,
) -> Result<PipelineReport, PipelineError> {
    let models: [(&'static str, &'static str, &'static str, &dyn Classifier); 3] = [
        ("Random Forest", "rf", "RF", &trained.rf),
        ("SVM", "svc", "SVM", &trained.svc),
        ("Logistic Regression", "logreg", "LogReg", &trained.logreg),
    ];

    let mut reports = Vec::with_capacity(models.len());
    let mut artifacts = Vec::with_capacity(models.len() + 1);
    let mut panels = Vec::with_capacity(models.len());
    for (name, suffix, short, model) in models {
        let predicted = model.predict(&test.records)?;
        let metrics = ClassificationMetrics::compute(&test.targets, &predicted);
        let path = config
            .output_dir
            .join(format!("classification_report_{suffix}.json"));
        write_json(&path, &classification_report(&metrics.confusion))?;
        artifacts.push(path);
        panels.push((format!("Confusion Matrix {short}"), metrics.confusion));
        reports.push(ModelReport {
            name,
            suffix,
            metrics,
        });
    }

    let plot_path = config.output_dir.join("confusion_matrices.png");
    save_confusion_matrices(&panels, &plot_path).map_err(|source| PipelineError::Plot {
        path: plot_path.clone(),
        source,
    })?;
    artifacts.insert(0, plot_path);

    let experiment = store.experiment(&config.experiment)?;
    let run = store.resume_run(&experiment, &trained.run_id)?;
    within_run(run, |run| {
        for report in &reports {
            let m = &report.metrics;
            run.log_metric(&format!("accuracy_{}", report.suffix), m.accuracy)?;
            run.log_metric(&format!("precision_{}", report.suffix), m.precision)?;
            run.log_metric(&format!("recall_{}", report.suffix), m.recall)?;
            run.log_metric(&format!("f1_{}", report.suffix), m.f1)?;
        }
        for path in &artifacts {
            run.log_artifact(path)?;
        }
        Ok(())
    })?;

    for report in &reports {
        let m = &report.metrics;
        info!(
            "{} Accuracy: {}, Precision: {}, Recall: {}, F1: {}",
            report.name, m.accuracy, m.precision, m.recall, m.f1
        );
    }
    Ok(PipelineReport {
        run_id: trained.run_id.clone(),
        models: reports,
    })
}

fn end(config: &TrainConfig, trained: &TrainedModels) -> Result<(), PipelineError> {
    if let Some(path) = &config.export_model {
        let artifact = ModelArtifact::new(
            FOREST_ARTIFACT,
            trained.feature_names.clone(),
            trained.rf.clone().into(),
        );
        artifact.save(path)?;
        info!("Exported random forest to {}", path.display());
    }
    info!("Pipeline complete.");
    Ok(())
}

/// Runs `body` against an open run and closes the run as finished, or as
/// failed when `body` errors.
fn within_run<T>(
    run: Run,
    body: impl FnOnce(&Run) -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    match body(&run) {
        Ok(value) => {
            run.end(RunStatus::Finished)?;
            Ok(value)
        }
        Err(e) => {
            let id = run.id().to_string();
            if let Err(end_err) = run.end(RunStatus::Failed) {
                warn!("could not mark run {} as failed: {}", id, end_err);
            }
            Err(e)
        }
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), PipelineError> {
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    /// 120 rows, 30 features, classes separable with some overlap.
    fn write_dataset(dir: &Path) -> PathBuf {
        let mut csv = String::from("id,diagnosis");
        for j in 0..30 {
            write!(csv, ",f{j}").unwrap();
        }
        csv.push_str(",\n");
        for i in 0..120usize {
            let malignant = i % 3 == 0;
            write!(csv, "{},{}", 1000 + i, if malignant { "M" } else { "B" }).unwrap();
            for j in 0..30usize {
                let noise = ((i * 31 + j * 17) % 23) as f64 / 10.0;
                let shift = if malignant { 1.5 } else { 0.0 };
                write!(csv, ",{:.3}", noise + shift).unwrap();
            }
            csv.push_str(",\n");
        }
        let path = dir.join("breast-cancer.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn config(dir: &TempDir, extra: &[&str]) -> TrainConfig {
        let data = write_dataset(dir.path());
        let root = dir.path().to_string_lossy().into_owned();
        let mut args: Vec<String> = vec![
            "train".into(),
            "--data-path".into(),
            data.to_string_lossy().into_owned(),
            "--tracking-dir".into(),
            format!("{root}/mlruns"),
            "--output-dir".into(),
            format!("{root}/artifacts"),
            "--n-estimators".into(),
            "10".into(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        TrainConfig::parse_from(args)
    }

    #[test]
    fn untuned_run_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, &["--hyperparameter-tuning", "false"]);

        let first = run(&config).unwrap();
        let second = run(&config).unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.models, second.models);
        assert_eq!(first.models.len(), 3);
        for report in &first.models {
            assert!((0.0..=1.0).contains(&report.metrics.accuracy));
            assert_eq!(report.metrics.confusion.total(), 24);
        }
    }

    #[test]
    fn run_logs_params_metrics_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir, &["--hyperparameter-tuning", "false"]);
        config.export_model = Some(dir.path().join("model_rf.json"));
        let report = run(&config).unwrap();

        let store = TrackingStore::open(&config.tracking_dir).unwrap();
        let experiment = store.experiment("breast_cancer_experiment").unwrap();
        let logged = store.resume_run(&experiment, &report.run_id).unwrap();
        assert_eq!(logged.status(), RunStatus::Finished);

        let params = logged.params().unwrap();
        assert_eq!(params["n_estimators"], "10");
        assert_eq!(params["model_rf"], "RandomForest");
        assert_eq!(params["dataset_version"], DATASET_VERSION);

        let rf = report.model("rf").unwrap();
        assert_eq!(
            logged.latest_metric("accuracy_rf").unwrap(),
            Some(rf.metrics.accuracy)
        );
        for name in [
            "confusion_matrices.png",
            "classification_report_rf.json",
            "classification_report_svc.json",
            "classification_report_logreg.json",
            "dataset_info.json",
            "breast-cancer.csv",
            "random_forest_model/model.json",
            "svc_model/model.json",
            "logreg_model/model.json",
        ] {
            assert!(logged.artifact_dir().join(name).is_file(), "{name}");
        }

        let exported = ModelArtifact::load(&dir.path().join("model_rf.json")).unwrap();
        assert_eq!(exported.n_features, 30);
        assert_eq!(exported.feature_names[0], "f0");
    }

    #[test]
    fn tuned_run_records_best_params() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, &["--cv-folds", "3"]);
        let report = run(&config).unwrap();

        let store = TrackingStore::open(&config.tracking_dir).unwrap();
        let experiment = store.experiment(&config.experiment).unwrap();
        let logged = store.resume_run(&experiment, &report.run_id).unwrap();
        let params = logged.params().unwrap();
        for key in ["best_rf_params", "best_svc_params", "best_logreg_params"] {
            assert!(params[key].starts_with('{'), "{key}");
        }
        assert!(logged.latest_metric("best_cv_score_svc").unwrap().is_some());
    }

    #[test]
    fn missing_dataset_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir, &[]);
        config.data_path = dir.path().join("missing.csv");
        assert!(matches!(
            run(&config),
            Err(PipelineError::Dataset(DatasetError::NotFound(_)))
        ));
    }

    fn only_run(config: &TrainConfig) -> Run {
        let store = TrackingStore::open(&config.tracking_dir).unwrap();
        let experiment = store.experiment(&config.experiment).unwrap();
        let experiment_dir = config.tracking_dir.join(&experiment.experiment_id);
        let runs: Vec<_> = std::fs::read_dir(&experiment_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_dir())
            .collect();
        assert_eq!(runs.len(), 1);
        let run_id = runs[0].file_name().unwrap().to_string_lossy().into_owned();
        store.resume_run(&experiment, &run_id).unwrap()
    }

    #[test]
    fn failed_plot_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, &["--hyperparameter-tuning", "false"]);
        std::fs::create_dir_all(config.output_dir.join("confusion_matrices.png")).unwrap();

        let err = run(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Plot { .. }), "{err}");
        assert_eq!(only_run(&config).status(), RunStatus::Failed);
    }

    #[test]
    fn failed_export_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir, &["--hyperparameter-tuning", "false"]);
        let blocked = dir.path().join("export");
        std::fs::create_dir_all(&blocked).unwrap();
        config.export_model = Some(blocked);

        assert!(matches!(run(&config), Err(PipelineError::Model(_))));
        let logged = only_run(&config);
        assert_eq!(logged.status(), RunStatus::Failed);
        assert!(logged.latest_metric("accuracy_rf").unwrap().is_some());
    }

    #[test]
    fn svm_grid_deduplicates_kernels() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, &["--svc-kernel", "linear"]);
        let family = svm_family(&config);
        assert_eq!(family.grid.len(), 6);
        assert_eq!(forest_family(&config).grid.len(), 9);
    }
}
