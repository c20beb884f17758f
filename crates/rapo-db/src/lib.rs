pub mod cleanup;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod pool;
pub mod reflection;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GroupOutcome, RowsAffected, StatementGroup};
pub use pool::{PoolConfig, Vendor};
