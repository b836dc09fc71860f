//! Development server with live reload for kiln sites.
//!
//! Watches the source tree, runs the smallest rebuild each change needs,
//! and tells connected browsers to reload (or just swap stylesheets).

pub mod coordinator;
pub mod server;
pub mod watcher;
pub mod websocket;

pub use coordinator::{PlanRunner, SlotState, WatchCoordinator, WatchState};
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, FsChange};
pub use websocket::{ReloadHub, ReloadMessage};
