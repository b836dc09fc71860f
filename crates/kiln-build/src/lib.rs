//! Incremental build scheduling for kiln sites.
//!
//! Discovers source files, maintains the generated include index, and
//! composes converter invocations into the full build and the smaller
//! plans run in response to file changes.

pub mod discover;
pub mod error;
pub mod index;
pub mod layout;
pub mod pipeline;
pub mod plan;
pub mod task;

pub use discover::{discover, discover_matching, has_extension};
pub use error::BuildError;
pub use index::{regenerate_index, render_index, IndexReport};
pub use layout::{Category, SiteLayout};
pub use pipeline::{Converters, Pipeline};
pub use plan::{Action, ChangeKind, Plan};
pub use task::{StepReport, Task};
