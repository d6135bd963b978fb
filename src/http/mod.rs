//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing layer)
//!     → router.rs (classify path, dispatch)
//!         → websocket.rs  (/ws upgrade → reload client task)
//!         → api.rs        (/api/status, /api/reload, /api/validate)
//!         → static_files.rs (/assets/*, files next to the script)
//!         → current artifact (/ and /index.html)
//! ```

pub mod api;
pub mod router;
pub mod server;
pub mod static_files;
pub mod websocket;

pub use router::{classify, Endpoint};
pub use server::{build_router, AppState, DevState};
