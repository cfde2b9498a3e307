//! File-system experiment tracker.
//!
//! Layout under the store root:
//!
//! ```text
//! <experiment_id>/meta.json
//! <experiment_id>/<run_id>/meta.json
//! <experiment_id>/<run_id>/params/<key>     one value, immutable
//! <experiment_id>/<run_id>/metrics/<key>    "<unix ms> <value> <step>" per line
//! <experiment_id>/<run_id>/artifacts/...
//! ```

use crate::classifier::{ModelArtifact, ModelError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

const META_FILE: &str = "meta.json";

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("tracking store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt tracking metadata at {path}: {source}")]
    Meta {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid key `{0}`")]
    InvalidKey(String),
    #[error("param `{key}` already logged as `{existing}`, refusing to change it to `{new}`")]
    ParamConflict {
        key: String,
        existing: String,
        new: String,
    },
    #[error("run {0} not found")]
    RunNotFound(String),
    #[error("artifact {0} has no file name")]
    ArtifactName(PathBuf),
    #[error(transparent)]
    Model(#[from] ModelError),
}

type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub creation_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    start_time: i64,
    end_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TrackingStore {
    root: PathBuf,
}

impl TrackingStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        create_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the experiment called `name`, creating it with the next free
    /// numeric id if it does not exist yet.
    pub fn experiment(&self, name: &str) -> Result<Experiment> {
        let mut next_id = 0u64;
        for entry in read_dir(&self.root)? {
            let meta_path = entry.join(META_FILE);
            if !meta_path.is_file() {
                continue;
            }
            let experiment: Experiment = read_json(&meta_path)?;
            if experiment.name == name {
                return Ok(experiment);
            }
            if let Ok(id) = experiment.experiment_id.parse::<u64>() {
                next_id = next_id.max(id + 1);
            }
        }

        let experiment = Experiment {
            experiment_id: next_id.to_string(),
            name: name.to_string(),
            creation_time: now_millis(),
        };
        let dir = self.root.join(&experiment.experiment_id);
        create_dir(&dir)?;
        write_json(&dir.join(META_FILE), &experiment)?;
        debug!("created experiment {} ({})", name, experiment.experiment_id);
        Ok(experiment)
    }

    pub fn start_run(&self, experiment: &Experiment) -> Result<Run> {
        let meta = RunMeta {
            run_id: Uuid::new_v4().simple().to_string(),
            experiment_id: experiment.experiment_id.clone(),
            status: RunStatus::Running,
            start_time: now_millis(),
            end_time: None,
        };
        let dir = self.root.join(&experiment.experiment_id).join(&meta.run_id);
        for sub in ["params", "metrics", "artifacts"] {
            create_dir(&dir.join(sub))?;
        }
        let run = Run { dir, meta };
        run.write_meta()?;
        Ok(run)
    }

    /// Reopens a run created earlier, e.g. by a previous pipeline step.
    pub fn resume_run(&self, experiment: &Experiment, run_id: &str) -> Result<Run> {
        validate_key(run_id).map_err(|_| TrackingError::RunNotFound(run_id.to_string()))?;
        let dir = self.root.join(&experiment.experiment_id).join(run_id);
        let meta_path = dir.join(META_FILE);
        if !meta_path.is_file() {
            return Err(TrackingError::RunNotFound(run_id.to_string()));
        }
        let meta = read_json(&meta_path)?;
        Ok(Run { dir, meta })
    }
}

#[derive(Debug)]
pub struct Run {
    dir: PathBuf,
    meta: RunMeta,
}

impl Run {
    pub fn id(&self) -> &str {
        &self.meta.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.meta.status
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    pub fn log_param(&self, key: &str, value: impl Display) -> Result<()> {
        validate_key(key)?;
        let value = value.to_string();
        let path = self.dir.join("params").join(key);
        if path.is_file() {
            let existing = read_string(&path)?;
            if existing == value {
                return Ok(());
            }
            return Err(TrackingError::ParamConflict {
                key: key.to_string(),
                existing,
                new: value,
            });
        }
        write_file(&path, value.as_bytes())
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.log_metric_step(key, value, 0)
    }

    pub fn log_metric_step(&self, key: &str, value: f64, step: u64) -> Result<()> {
        validate_key(key)?;
        let path = self.dir.join("metrics").join(key);
        ensure_parent(&path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_at(&path))?;
        writeln!(file, "{} {} {}", now_millis(), value, step).map_err(io_at(&path))
    }

    /// Copies a local file into the run's artifact directory.
    pub fn log_artifact(&self, local: &Path) -> Result<()> {
        let name = local
            .file_name()
            .ok_or_else(|| TrackingError::ArtifactName(local.to_path_buf()))?;
        let target = self.artifact_dir().join(name);
        fs::copy(local, &target).map_err(io_at(local))?;
        Ok(())
    }

    /// Stores a fitted model as `artifacts/<name>/model.json`.
    pub fn log_model(&self, name: &str, artifact: &ModelArtifact) -> Result<PathBuf> {
        validate_key(name)?;
        let path = self.artifact_dir().join(name).join("model.json");
        artifact.save(&path)?;
        Ok(path)
    }

    /// Every logged param; keys containing `/` are read back from their
    /// nested directories.
    pub fn params(&self) -> Result<BTreeMap<String, String>> {
        let root = self.dir.join("params");
        let mut params = BTreeMap::new();
        for path in files_under(&root)? {
            let key = path
                .strip_prefix(&root)
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            params.insert(key, read_string(&path)?);
        }
        Ok(params)
    }

    /// Most recent value of a metric.
    pub fn latest_metric(&self, key: &str) -> Result<Option<f64>> {
        validate_key(key)?;
        let path = self.dir.join("metrics").join(key);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(read_string(&path)?
            .lines()
            .last()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok()))
    }

    pub fn end(mut self, status: RunStatus) -> Result<()> {
        self.meta.status = status;
        self.meta.end_time = Some(now_millis());
        self.write_meta()
    }

    fn write_meta(&self) -> Result<()> {
        write_json(&self.dir.join(META_FILE), &self.meta)
    }
}

/// Keys become file names: word characters plus `- . /` and space, no
/// parent-directory hops, no absolute paths.
fn validate_key(key: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ' ');
    let valid = !key.is_empty()
        && key.len() <= 250
        && key.chars().all(allowed)
        && !key.starts_with('/')
        && !key.split('/').any(|part| part == ".." || part.is_empty());
    if valid {
        Ok(())
    } else {
        Err(TrackingError::InvalidKey(key.to_string()))
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> TrackingError + '_ {
    move |source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(io_at(path))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => create_dir(parent),
        None => Ok(()),
    }
}

fn read_dir(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(path)
        .map_err(io_at(path))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in read_dir(dir)? {
        if path.is_dir() {
            files.extend(files_under(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(io_at(path))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(io_at(path))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    serde_json::from_str(&read_string(path)?).map_err(|source| TrackingError::Meta {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| TrackingError::Meta {
        path: path.to_path_buf(),
        source,
    })?;
    write_file(path, &body)
}
