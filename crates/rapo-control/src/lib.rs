pub mod case;
pub mod config;
pub mod dates;
pub mod error;
pub mod executor;
pub mod fields;
pub mod lifecycle;
pub mod log;
pub mod parser;
pub mod reconciliation;
pub mod supervisor;

pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use lifecycle::Run;
