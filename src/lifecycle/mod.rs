//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Initialize compiler → First compile → Watchers → Bind listener
//!
//! Shutdown (shutdown.rs + ServerHandle::stop):
//!     Signal or stop() → Stop watchers and trigger → Close reload sockets
//!         → Stop HTTP server → Release compiler
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ServerHandle::stop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: compiler first, listener last
//! - Shutdown happens exactly once; later triggers wait for it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{start, LifecycleState, ServerHandle, StartupError};
