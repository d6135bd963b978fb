//! Filesystem watch subsystem.
//!
//! # Data Flow
//! ```text
//! script / css / js files, assets dir
//!     → watcher.rs (one OS watcher + loop per target)
//!     → target.rs (is this event structurally relevant?)
//!     → trigger.rs (coalesce bursts, fire once, serialized)
//!     → CompileOrchestrator::recompile
//! ```

pub mod target;
pub mod trigger;
pub mod watcher;

pub use target::{TargetKind, WatchTarget};
pub use trigger::CoalescingTrigger;
pub use watcher::{start, WatchHandle};
