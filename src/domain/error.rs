//! Domain error types.

/// Top-level error type for sentinel.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

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

    /// Rejected before any rule evaluation or database write.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SentinelError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SentinelError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        SentinelError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SentinelError::InvalidInput { .. })
    }
}

impl From<&SentinelError> for std::process::ExitCode {
    fn from(err: &SentinelError) -> Self {
        let code: u8 = match err {
            SentinelError::Io(_) => 1,
            SentinelError::ConfigParse { .. }
            | SentinelError::ConfigMissing { .. }
            | SentinelError::ConfigInvalid { .. } => 2,
            SentinelError::Database { .. } | SentinelError::DatabaseQuery { .. } => 3,
            SentinelError::InvalidInput { .. } | SentinelError::NotFound { .. } => 4,
            SentinelError::Unauthorized => 5,
            SentinelError::MarketData { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
