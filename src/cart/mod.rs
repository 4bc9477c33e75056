//! Client-side cart reconciliation: local lines, server merge on session
//! start, stock clamping and debounced persistence.

pub mod backend;
pub mod scheduler;
pub mod session;
pub mod store;

pub use backend::{CartBackend, CartBackendError, HttpCartBackend};
pub use scheduler::{PersistScheduler, DEFAULT_PERSIST_DELAY};
pub use session::{CartOwner, CartSession};
pub use store::{line_uid, merge_lines, CartError, CartStore, ClientCartLine};
