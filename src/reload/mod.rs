//! Live reload subsystem.
//!
//! # Data Flow
//! ```text
//! CompileOrchestrator
//!     → channel.rs (serialize once, enqueue per client)
//!     → client.rs (one task per WebSocket, drains its queue)
//!     → browser (reload / error / ping frames)
//! ```
//!
//! # Design Decisions
//! - The registry stores queue senders, not sockets
//! - A failed enqueue removes the client; the browser reconnects and reloads
//! - Heartbeat pings evict browsers that stopped answering

pub mod channel;
pub mod client;
pub mod message;

pub use channel::{ClientId, Frame, ReloadChannel, Subscription};
pub use client::serve_client;
pub use message::ReloadEvent;
