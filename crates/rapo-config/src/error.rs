#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found at {0}")]
    NotFound(std::path::PathBuf),

    #[error("could not determine a home directory to resolve the default config path")]
    NoHomeDirectory,

    #[error("failed to read configuration file {path}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("required parameter [{section}] {key} is missing")]
    MissingRequired { section: String, key: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
