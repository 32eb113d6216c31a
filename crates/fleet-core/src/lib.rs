pub mod channel;
pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod types;

pub use error::{FleetError, Result};
