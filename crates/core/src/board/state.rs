//! In-memory board state and the ordering rules applied to it
//!
//! Every structural change (insert, remove, move, reorder) ends with a
//! renumbering pass so positions stay dense `0..n` within each column and
//! within the board's column list. Each operation returns the placements it
//! changed so the caller knows exactly which rows to persist.

use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Error;
use crate::Result;

use super::model::{Board, Column, Task};

/// The column and position a task ended up at after a structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskPlacement {
    pub task_id: Uuid,
    pub column_id: Uuid,
    pub position: usize,
}

/// The position a column ended up at after a structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnPlacement {
    pub column_id: Uuid,
    pub position: usize,
}

/// Snapshot of everything the front end renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardState {
    pub boards: Vec<Board>,
    pub current_board: Option<Board>,
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl BoardState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(&self, board_id: Uuid) -> Option<&Board> {
        self.boards.iter().find(|board| board.id == board_id)
    }

    pub fn column(&self, column_id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == column_id)
    }

    pub fn task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    /// Columns in display order
    pub fn sorted_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|column| column.position);
        columns
    }

    /// Tasks of one column in display order
    pub fn column_tasks(&self, column_id: Uuid) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.column_id == column_id)
            .collect();
        tasks.sort_by_key(|task| task.position);
        tasks
    }

    /// Index of a task within its column's display order
    pub fn task_index(&self, task_id: Uuid) -> Option<usize> {
        let task = self.task(task_id)?;
        self.column_tasks(task.column_id)
            .iter()
            .position(|candidate| candidate.id == task_id)
    }

    fn ordered_task_ids(&self, column_id: Uuid) -> Vec<Uuid> {
        self.column_tasks(column_id)
            .into_iter()
            .map(|task| task.id)
            .collect()
    }

    fn ordered_column_ids(&self) -> Vec<Uuid> {
        self.sorted_columns()
            .into_iter()
            .map(|column| column.id)
            .collect()
    }

    /// Replace the task collection with freshly fetched rows
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    /// Replace the column collection; tasks of columns that disappeared go too
    pub fn replace_columns(&mut self, columns: Vec<Column>) {
        let ids: HashSet<Uuid> = columns.iter().map(|column| column.id).collect();
        self.tasks.retain(|task| ids.contains(&task.column_id));
        self.columns = columns;
    }

    /// Insert a task at its requested position (clamped to the column length)
    pub fn insert_task(&mut self, task: Task) -> Result<Vec<TaskPlacement>> {
        if self.column(task.column_id).is_none() {
            return Err(Error::NotFound(format!("Column {}", task.column_id)));
        }
        if self.task(task.id).is_some() {
            return Err(Error::Validation(format!(
                "Task with ID {} already exists",
                task.id
            )));
        }

        let column_id = task.column_id;
        let task_id = task.id;
        let mut ids = self.ordered_task_ids(column_id);
        let index = task.position.min(ids.len());
        ids.insert(index, task_id);
        self.tasks.push(task);

        Ok(self
            .assign_tasks(column_id, &ids)
            .into_iter()
            .filter(|placement| placement.task_id != task_id)
            .collect())
    }

    /// Remove a task and close the gap it leaves in its column
    pub fn remove_task(&mut self, task_id: Uuid) -> Option<(Task, Vec<TaskPlacement>)> {
        let index = self.tasks.iter().position(|task| task.id == task_id)?;
        let task = self.tasks.remove(index);
        let ids = self.ordered_task_ids(task.column_id);
        let placements = self.assign_tasks(task.column_id, &ids);
        Some((task, placements))
    }

    /// Relocate a task to `column_id` at `index`
    ///
    /// The task leaves its source column's ordered list, enters the destination
    /// list at `index` (clamped), and both lists are renumbered. An empty result
    /// means nothing moved.
    pub fn move_task(
        &mut self,
        task_id: Uuid,
        column_id: Uuid,
        index: usize,
    ) -> Result<Vec<TaskPlacement>> {
        if self.column(column_id).is_none() {
            return Err(Error::NotFound(format!("Column {}", column_id)));
        }
        let source_id = self
            .task(task_id)
            .map(|task| task.column_id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", task_id)))?;

        let mut source = self.ordered_task_ids(source_id);
        source.retain(|id| *id != task_id);

        if source_id == column_id {
            let index = index.min(source.len());
            source.insert(index, task_id);
            return Ok(self.assign_tasks(column_id, &source));
        }

        let mut destination = self.ordered_task_ids(column_id);
        let index = index.min(destination.len());
        destination.insert(index, task_id);

        let mut placements = self.assign_tasks(column_id, &destination);
        placements.extend(self.assign_tasks(source_id, &source));
        Ok(placements)
    }

    /// Apply a full ordering of one column's tasks
    pub fn reorder_tasks(
        &mut self,
        column_id: Uuid,
        ordered: &[Uuid],
    ) -> Result<Vec<TaskPlacement>> {
        let current: HashSet<Uuid> = self.ordered_task_ids(column_id).into_iter().collect();
        let requested: HashSet<Uuid> = ordered.iter().copied().collect();
        if current != requested || requested.len() != ordered.len() {
            return Err(Error::Validation(format!(
                "Ordering does not match the tasks of column {}",
                column_id
            )));
        }
        Ok(self.assign_tasks(column_id, ordered))
    }

    /// Close any gaps in a column without changing its order
    pub fn renumber_column(&mut self, column_id: Uuid) -> Vec<TaskPlacement> {
        let ids = self.ordered_task_ids(column_id);
        self.assign_tasks(column_id, &ids)
    }

    /// Make every ordering dense without changing relative order; ties keep
    /// their collection order. Local only, nothing is reported for persisting.
    pub fn normalize_positions(&mut self) {
        let ids = self.ordered_column_ids();
        self.assign_columns(&ids);
        let column_ids: Vec<Uuid> = self.columns.iter().map(|column| column.id).collect();
        for column_id in column_ids {
            self.renumber_column(column_id);
        }
    }

    fn assign_tasks(&mut self, column_id: Uuid, ordered: &[Uuid]) -> Vec<TaskPlacement> {
        let mut placements = Vec::new();
        for (position, id) in ordered.iter().enumerate() {
            let Some(task) = self.tasks.iter_mut().find(|task| task.id == *id) else {
                continue;
            };
            if task.column_id != column_id || task.position != position {
                task.column_id = column_id;
                task.position = position;
                placements.push(TaskPlacement {
                    task_id: task.id,
                    column_id,
                    position,
                });
            }
        }
        placements
    }

    /// Append a column after the existing ones
    pub fn push_column(&mut self, mut column: Column) -> ColumnPlacement {
        column.position = self.columns.len();
        let placement = ColumnPlacement {
            column_id: column.id,
            position: column.position,
        };
        self.columns.push(column);
        placement
    }

    /// Remove a column together with its tasks
    pub fn remove_column(&mut self, column_id: Uuid) -> Option<(Column, Vec<ColumnPlacement>)> {
        let index = self.columns.iter().position(|column| column.id == column_id)?;
        let column = self.columns.remove(index);
        self.tasks.retain(|task| task.column_id != column_id);
        let ids = self.ordered_column_ids();
        let placements = self.assign_columns(&ids);
        Some((column, placements))
    }

    /// Apply a full ordering of the board's columns
    pub fn reorder_columns(&mut self, ordered: &[Uuid]) -> Result<Vec<ColumnPlacement>> {
        let current: HashSet<Uuid> = self.columns.iter().map(|column| column.id).collect();
        let requested: HashSet<Uuid> = ordered.iter().copied().collect();
        if current != requested || requested.len() != ordered.len() {
            return Err(Error::Validation(
                "Ordering does not match the columns of the board".to_string(),
            ));
        }
        Ok(self.assign_columns(ordered))
    }

    fn assign_columns(&mut self, ordered: &[Uuid]) -> Vec<ColumnPlacement> {
        let mut placements = Vec::new();
        for (position, id) in ordered.iter().enumerate() {
            let Some(column) = self.columns.iter_mut().find(|column| column.id == *id) else {
                continue;
            };
            if column.position != position {
                column.position = position;
                placements.push(ColumnPlacement {
                    column_id: column.id,
                    position,
                });
            }
        }
        placements
    }
}

/// Move the element at `from` to `to`, shifting the ones in between
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
}
