//! Workflow error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a workflow definition.
///
/// Any of these aborts the run before a single step is dispatched; no
/// report is produced.
#[derive(Error, Debug)]
pub enum WorkflowParseError {
    /// Workflow source could not be read
    #[error("Failed to read workflow {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML is malformed or does not match the workflow schema
    #[error("Invalid YAML workflow: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON is malformed or does not match the workflow schema
    #[error("Invalid JSON workflow: {0}")]
    Json(#[from] serde_json::Error),

    /// A step depends on something that is not an earlier step
    #[error("Invalid dependency: step '{step}' depends on '{dependency}', which is not an earlier step")]
    InvalidDependency { step: String, dependency: String },
}
