//! Domain error types.

/// Top-level error type for stocksim.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The run produced no equity history, so there is nothing to report.
    #[error("no data: the simulation produced an empty equity history")]
    NoData,

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid strategy parameters: {reason}")]
    Strategy { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. }
            | SimError::ConfigMissing { .. }
            | SimError::ConfigInvalid { .. } => 2,
            SimError::Data { .. } => 3,
            SimError::Strategy { .. } => 4,
            SimError::NoData => 5,
        };
        std::process::ExitCode::from(code)
    }
}
