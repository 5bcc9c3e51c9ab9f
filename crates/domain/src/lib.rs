//! Shared primitives for the agency fleet: the common error type,
//! environment configuration, and the component/tier vocabulary every
//! process speaks.

pub mod config;
pub mod error;
pub mod fleet;
pub mod fsio;

pub use config::{AgencyEnv, Mode};
pub use error::{Error, Result};
pub use fleet::{ComponentState, Role, Tier};
