//! Drag gesture state machine
//!
//! Turns grab/hover/release events into intents for the board store. Hovering
//! across columns moves the task right away so the card follows the pointer;
//! hovering within a column waits for the release to avoid position thrash.

use serde::Serialize;
use uuid::Uuid;

use crate::board::{array_move, BoardState};

/// What the pointer is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum DropTarget {
    /// A column body, empty or not
    Column(Uuid),
    Task(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging {
        task_id: Uuid,
    },
    Hovering {
        task_id: Uuid,
        target: DropTarget,
    },
}

/// A change the board store should apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DragIntent {
    Move {
        task_id: Uuid,
        column_id: Uuid,
        index: usize,
    },
    Reorder {
        column_id: Uuid,
        task_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Default)]
pub struct DragReconciler {
    phase: DragPhase,
}

impl DragReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    /// The task being dragged, if a gesture is in progress
    pub fn active_task(&self) -> Option<Uuid> {
        match self.phase {
            DragPhase::Idle => None,
            DragPhase::Dragging { task_id } | DragPhase::Hovering { task_id, .. } => Some(task_id),
        }
    }

    /// Start dragging a task
    pub fn grab(&mut self, task_id: Uuid) {
        self.phase = DragPhase::Dragging { task_id };
    }

    /// Pointer moved over `target`
    ///
    /// Returns a move only when the target lies in another column.
    pub fn hover(&mut self, state: &BoardState, target: DropTarget) -> Option<DragIntent> {
        let task_id = self.active_task()?;
        self.phase = DragPhase::Hovering { task_id, target };
        cross_column_move(state, task_id, target)
    }

    /// Pointer released over `target`, or over nothing
    pub fn release(
        &mut self,
        state: &BoardState,
        target: Option<DropTarget>,
    ) -> Option<DragIntent> {
        let task_id = self.active_task()?;
        self.phase = DragPhase::Idle;
        let target = target?;

        if let DropTarget::Task(over_id) = target {
            if over_id == task_id {
                return None;
            }
            let active = state.task(task_id)?;
            let over = state.task(over_id)?;
            if active.column_id == over.column_id {
                return same_column_reorder(state, task_id, over_id, active.column_id);
            }
        }

        // Hover moves may not have been applied yet
        cross_column_move(state, task_id, target)
    }

    /// Abandon the gesture without any change
    pub fn cancel(&mut self) {
        self.phase = DragPhase::Idle;
    }
}

fn cross_column_move(state: &BoardState, task_id: Uuid, target: DropTarget) -> Option<DragIntent> {
    let active = state.task(task_id)?;
    match target {
        DropTarget::Column(column_id) => {
            state.column(column_id)?;
            (active.column_id != column_id).then_some(DragIntent::Move {
                task_id,
                column_id,
                index: 0,
            })
        }
        DropTarget::Task(over_id) => {
            if over_id == task_id {
                return None;
            }
            let over = state.task(over_id)?;
            if over.column_id == active.column_id {
                return None;
            }
            Some(DragIntent::Move {
                task_id,
                column_id: over.column_id,
                index: state.task_index(over_id)?,
            })
        }
    }
}

fn same_column_reorder(
    state: &BoardState,
    task_id: Uuid,
    over_id: Uuid,
    column_id: Uuid,
) -> Option<DragIntent> {
    let mut ids: Vec<Uuid> = state
        .column_tasks(column_id)
        .into_iter()
        .map(|task| task.id)
        .collect();
    let from = ids.iter().position(|id| *id == task_id)?;
    let to = ids.iter().position(|id| *id == over_id)?;
    if from == to {
        return None;
    }
    array_move(&mut ids, from, to);
    Some(DragIntent::Reorder {
        column_id,
        task_ids: ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Column, NewTask, DEFAULT_COLUMN_COLOR};
    use chrono::Utc;

    /// Column A holds T1, T2, T3; column B holds U1
    fn sample() -> (BoardState, Uuid, Uuid, [Uuid; 4]) {
        let board_id = Uuid::new_v4();
        let mut state = BoardState::new();
        for (title, position) in [("A", 0), ("B", 1)] {
            state.columns.push(Column {
                id: Uuid::new_v4(),
                title: title.to_string(),
                board_id,
                position,
                color: DEFAULT_COLUMN_COLOR.to_string(),
                created_at: Utc::now(),
            });
        }
        let (a, b) = (state.columns[0].id, state.columns[1].id);

        let mut ids = [Uuid::nil(); 4];
        for (slot, (column_id, title, position)) in [
            (a, "T1", 0),
            (a, "T2", 1),
            (a, "T3", 2),
            (b, "U1", 0),
        ]
        .into_iter()
        .enumerate()
        {
            let task = NewTask::new(column_id, title).into_task(position).unwrap();
            ids[slot] = task.id;
            state.tasks.push(task);
        }
        (state, a, b, ids)
    }

    #[test]
    fn hover_over_other_column_moves_to_front() {
        let (state, _, b, [t1, ..]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(t1);

        let intent = dnd.hover(&state, DropTarget::Column(b));

        assert_eq!(
            intent,
            Some(DragIntent::Move {
                task_id: t1,
                column_id: b,
                index: 0
            })
        );
        assert_eq!(
            dnd.phase(),
            DragPhase::Hovering {
                task_id: t1,
                target: DropTarget::Column(b)
            }
        );
    }

    #[test]
    fn hover_over_task_in_other_column_uses_its_index() {
        let (state, a, _, [t1, t2, _, u1]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(u1);

        let intent = dnd.hover(&state, DropTarget::Task(t2));

        assert_eq!(
            intent,
            Some(DragIntent::Move {
                task_id: u1,
                column_id: a,
                index: 1
            })
        );
        assert!(dnd.hover(&state, DropTarget::Task(u1)).is_none());
        assert!(dnd.hover(&state, DropTarget::Task(t1)).is_some());
    }

    #[test]
    fn hover_within_same_column_waits_for_release() {
        let (state, a, _, [t1, _, t3, _]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(t3);

        assert!(dnd.hover(&state, DropTarget::Task(t1)).is_none());
        assert!(dnd.hover(&state, DropTarget::Column(a)).is_none());

        let intent = dnd.release(&state, Some(DropTarget::Task(t1)));
        assert_eq!(
            intent,
            Some(DragIntent::Reorder {
                column_id: a,
                task_ids: vec![t3, state.tasks[0].id, state.tasks[1].id],
            })
        );
        assert_eq!(dnd.phase(), DragPhase::Idle);
    }

    #[test]
    fn release_over_other_column_task_moves_without_hover() {
        let (state, _, b, [_, t2, _, u1]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(t2);

        let intent = dnd.release(&state, Some(DropTarget::Task(u1)));

        assert_eq!(
            intent,
            Some(DragIntent::Move {
                task_id: t2,
                column_id: b,
                index: 0
            })
        );
        assert_eq!(dnd.phase(), DragPhase::Idle);
    }

    #[test]
    fn release_on_itself_or_nothing_is_noop() {
        let (state, _, _, [t1, ..]) = sample();
        let mut dnd = DragReconciler::new();

        dnd.grab(t1);
        assert!(dnd.release(&state, Some(DropTarget::Task(t1))).is_none());
        assert_eq!(dnd.phase(), DragPhase::Idle);

        dnd.grab(t1);
        assert!(dnd.release(&state, None).is_none());
        assert_eq!(dnd.phase(), DragPhase::Idle);
    }

    #[test]
    fn events_without_grab_are_ignored() {
        let (state, _, b, [t1, ..]) = sample();
        let mut dnd = DragReconciler::new();

        assert!(dnd.hover(&state, DropTarget::Column(b)).is_none());
        assert!(dnd.release(&state, Some(DropTarget::Task(t1))).is_none());
        assert_eq!(dnd.phase(), DragPhase::Idle);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let (_, _, _, [t1, ..]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(t1);

        dnd.cancel();

        assert_eq!(dnd.active_task(), None);
    }

    #[test]
    fn release_over_unknown_targets_is_noop() {
        let (state, _, _, [t1, ..]) = sample();
        let mut dnd = DragReconciler::new();
        dnd.grab(t1);

        assert!(dnd
            .release(&state, Some(DropTarget::Column(Uuid::new_v4())))
            .is_none());
    }
}
