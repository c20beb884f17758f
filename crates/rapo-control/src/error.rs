#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control {0:?} is not configured in rapo_config")]
    UnknownControl(String),

    #[error("control {control} has no data source configured for {side}")]
    MissingSource { control: String, side: &'static str },

    #[error("malformed JSON in {field} for control {control}")]
    MalformedJson {
        control: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("prerequisite check did not pass, control will not be resumed")]
    PrerequisiteFailed,

    #[error("preparation step failed, control will not be resumed")]
    PreparationFailed,

    #[error("prerun hook evaluated as not OK: {0}")]
    PrerunHookFailed(String),

    #[error(transparent)]
    Gateway(#[from] rapo_db::GatewayError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;
