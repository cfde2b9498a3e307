//! Command-line and environment configuration for both binaries.

use crate::classifier::Kernel;
use crate::logging::LogConfig;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Length of the feature vector the served model accepts.
pub const EXPECTED_NUM_FEATURES: usize = 30;

#[derive(Debug, Clone, Parser)]
#[command(name = "serve", about = "Serve tumor diagnosis predictions over HTTP")]
pub struct ServeConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Worker threads; defaults to the number of physical cores.
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "MODEL_PATH", default_value = "model_rf.json")]
    pub model_path: PathBuf,

    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, env = "LOG_FILE", default_value = "app_log.log")]
    pub log_file: String,

    /// Also forward log lines to the local syslog socket.
    #[arg(long, env = "SYSLOG", default_value_t = true, action = ArgAction::Set)]
    pub syslog: bool,

    #[arg(long, env = "SYSLOG_PATH", default_value = "/dev/log")]
    pub syslog_path: PathBuf,
}

impl ServeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            dir: self.log_dir.clone(),
            file_name: self.log_file.clone(),
            syslog: self.syslog.then(|| self.syslog_path.clone()),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "train",
    about = "Train and evaluate the tumor diagnosis classifiers"
)]
pub struct TrainConfig {
    #[arg(long, env = "DATA_PATH", default_value = "breast-cancer.csv")]
    pub data_path: PathBuf,

    /// Fraction of rows held out for evaluation.
    #[arg(long, default_value_t = 0.2)]
    pub test_size: f64,

    #[arg(long, default_value_t = 42)]
    pub random_state: u64,

    #[arg(long, default_value_t = 100)]
    pub n_estimators: usize,

    /// Tree depth limit for the untuned forest; 0 means unlimited.
    #[arg(long, default_value_t = 5)]
    pub max_depth: usize,

    #[arg(long, value_enum, default_value_t = Kernel::Rbf)]
    pub svc_kernel: Kernel,

    /// Inverse regularization strength of the untuned logistic regression.
    #[arg(long, default_value_t = 1.0)]
    pub c_logreg: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub hyperparameter_tuning: bool,

    #[arg(long, default_value_t = 5)]
    pub cv_folds: usize,

    #[arg(long, env = "TRACKING_DIR", default_value = "mlruns")]
    pub tracking_dir: PathBuf,

    #[arg(long, default_value = "breast_cancer_experiment")]
    pub experiment: String,

    /// Scratch directory for reports and plots before they are logged.
    #[arg(long, default_value = "artifacts")]
    pub output_dir: PathBuf,

    /// Also write the fitted random forest here for the `serve` binary.
    #[arg(long)]
    pub export_model: Option<PathBuf>,

    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

impl TrainConfig {
    pub fn max_depth(&self) -> Option<usize> {
        (self.max_depth > 0).then_some(self.max_depth)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(format!("test_size must be within (0, 1), got {}", self.test_size));
        }
        if self.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        if !(self.c_logreg > 0.0) {
            return Err(format!("c_logreg must be positive, got {}", self.c_logreg));
        }
        if self.cv_folds < 2 {
            return Err(format!("cv_folds must be at least 2, got {}", self.cv_folds));
        }
        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            dir: self.log_dir.clone(),
            file_name: "train.log".to_string(),
            syslog: None,
        }
    }
}
