/// Errors surfaced by the Database Gateway.
///
/// These map to the `ExecutionError` family of §7: every fallible gateway
/// call returns one of these, and callers in `rapo-control` translate them
/// into the control lifecycle's own error path.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to connect to database")]
    Connect(#[source] sqlx::Error),

    #[error("statement execution failed: {statement}")]
    Execute {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("identifier {identifier:?} exceeds the configured maximum length of {max}")]
    IdentifierTooLong { identifier: String, max: usize },

    #[error("table {0:?} does not exist")]
    NoSuchTable(String),

    #[error("one or more parallel statement groups failed")]
    Parallel(#[source] Box<GatewayError>),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
