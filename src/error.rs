// PEGASUSQ ERROR TYPES
// CONFIGURATION AND LIFECYCLE ERRORS ARE SURFACED TO THE CALLER.
// DECISION-LAYER FAULTS NEVER REACH HERE: THEY ARE SKIPPED INSIDE THE TICK.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("UNKNOWN TUNABLE: {0}")]
    UnknownTunable(String),

    #[error("TUNABLE {0} IS READ-ONLY")]
    ReadOnly(String),

    #[error("CANNOT PARSE {value:?} FOR {name}")]
    Parse { name: String, value: String },

    #[error("VALUE {value} OUT OF RANGE FOR {name} ({min}..={max})")]
    InvalidValue {
        name: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("HOTPLUG LOCK CONFLICT: {held} CORES ALREADY LOCKED, {requested} REQUESTED")]
    LockConflict { held: usize, requested: usize },

    #[error("CPU {0} IS OFFLINE")]
    CpuOffline(usize),

    #[error("POLICY {0} HAS NO CURRENT FREQUENCY")]
    NoFrequency(usize),

    #[error("GOVERNOR ALREADY RUNNING ON POLICY {0}")]
    AlreadyRunning(usize),

    #[error("GOVERNOR NOT RUNNING ON POLICY {0}")]
    NotRunning(usize),

    #[error("{path}: {source}")]
    Platform {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PLATFORM REFUSED: {0}")]
    Refused(String),
}

impl GovernorError {
    pub fn platform(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Platform {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GovernorError>;
