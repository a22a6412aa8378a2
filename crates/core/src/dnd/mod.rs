//! Drag-and-drop reconciliation

mod reconciler;

pub use reconciler::{DragIntent, DragPhase, DragReconciler, DropTarget};
