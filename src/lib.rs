//! Live preview server library.

pub mod compile;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod reload;
pub mod validator;
pub mod watch;

pub use config::ServerConfig;
pub use lifecycle::{start, LifecycleState, ServerHandle, StartupError};
