//! Per-client editing sessions: record resolution, live sync with the
//! stored résumé, progress estimation and saving.

pub mod actor;
pub mod events;
pub mod progress;
pub mod registry;
pub mod resolve;
pub mod save;
pub mod sync;

pub use actor::{SessionHandle, SessionView};
pub use registry::SessionRegistry;
