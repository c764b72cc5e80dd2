//! Enrollment bootstrapper for permissioned blockchain networks
//!
//! Registers and enrolls a user with the organization's certificate
//! authority, authenticated by an admin identity already in the wallet, and
//! stores the resulting X.509 identity.

pub mod bootstrap;
pub mod ca;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod test_harness;
pub mod wallet;

pub use bootstrap::{BootstrapError, BootstrapOutcome, BootstrapRequest, Bootstrapper, Stage};
pub use config::Config;
pub use logging::{init_logging, LogLevel};
