//! Offline training: dataset preparation, model selection, evaluation and
//! experiment tracking.

pub mod dataset;
pub mod evaluation;
pub mod grid;
pub mod pipeline;
pub mod plot;
pub mod split;
pub mod tracking;

pub use pipeline::{run, PipelineError, PipelineReport};
