//! Error types for labtrack-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{OpportunityNumber, SampleId};

/// All errors that can arise from local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse opportunity record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.labtrack/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No record file exists for the requested opportunity.
    #[error("opportunity {number} not found at {path}")]
    OpportunityNotFound {
        number: OpportunityNumber,
        path: PathBuf,
    },

    /// The requested sample does not exist under the opportunity.
    #[error("sample {id} not found under opportunity {number}")]
    SampleNotFound {
        id: SampleId,
        number: OpportunityNumber,
    },

    /// Every id in 1000–9999 is currently assigned.
    #[error("sample id pool exhausted (all 4-digit ids in use)")]
    IdPoolExhausted,
}
