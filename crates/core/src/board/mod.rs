//! Board management
//!
//! Models, the ordering rules over them, and the store that keeps local
//! state in step with the remote backend.

mod event;
mod model;
mod state;
mod store;

pub use event::BoardEvent;
pub use model::*;
pub use state::{array_move, BoardState, ColumnPlacement, TaskPlacement};
pub use store::BoardStore;
