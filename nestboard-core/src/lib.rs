/// nestboard core: hierarchical card boards with diff-based undo/redo.
pub mod apply;
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod history;
pub mod identity;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod workspace;

pub use error::{BoardError, Result};
pub use workspace::Workspace;
