use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("not initialized: run 'fleet init'")]
    NotInitialized,

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("tenant already exists: {0}")]
    TenantExists(String),

    #[error("tenant '{token}' is missing {field}")]
    MissingField { token: String, field: String },

    #[error("invalid role '{0}': expected 'guide' or 'channel-signal'")]
    InvalidRole(String),

    #[error("invalid active hour {0}: must be 0-23")]
    InvalidHour(u32),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
