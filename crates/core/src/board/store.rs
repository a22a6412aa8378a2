//! Board store
//!
//! Owns the in-memory copy of the user's boards and of the selected board's
//! columns and tasks. Mutations run in two phases: the change is applied to
//! local state (and subscribers are notified) before the remote write is
//! issued; if the write fails, the error is recorded in state and the affected
//! collection is re-fetched so local state converges on the remote store.

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthProvider, User};
use crate::dnd::DragIntent;
use crate::error::Error;
use crate::remote::{decode, decode_all, encode, Query, RemoteStore, Table};
use crate::Result;

use super::event::BoardEvent;
use super::model::{
    required, Board, BoardPatch, Column, ColumnPatch, NewBoard, NewColumn, NewTask, Task,
    TaskPatch, DEFAULT_BOARD_COLOR,
};
use super::state::{BoardState, ColumnPlacement, TaskPlacement};

const EVENT_CAPACITY: usize = 256;

/// Which collection to re-fetch after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resync {
    Boards,
    Columns,
    Tasks,
}

/// Cheaply clonable handle to the board state and its collaborators
#[derive(Clone)]
pub struct BoardStore {
    state: Arc<RwLock<BoardState>>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    events: broadcast::Sender<BoardEvent>,
    default_color: String,
}

impl BoardStore {
    /// Create an empty store over the given collaborators
    pub fn new(remote: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(BoardState::new())),
            remote,
            auth,
            events,
            default_color: DEFAULT_BOARD_COLOR.to_string(),
        }
    }

    /// Color used for new boards and columns that don't name one
    pub fn with_default_color(mut self, color: impl Into<String>) -> Self {
        self.default_color = color.into();
        self
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Get a copy of the current state
    pub async fn snapshot(&self) -> BoardState {
        self.state.read().await.clone()
    }

    /// The last recorded error message
    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Drop everything, e.g. after sign-out
    pub async fn reset(&self) {
        *self.state.write().await = BoardState::new();
        self.emit(BoardEvent::Reset);
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn record_error(&self, message: String) {
        {
            let mut state = self.state.write().await;
            state.error = Some(message.clone());
            state.is_loading = false;
        }
        self.emit(BoardEvent::ErrorRaised(message));
    }

    /// Record a failure that happened before any remote write
    async fn fail<T>(&self, err: Error) -> Result<T> {
        warn!(error = %err, "board operation rejected");
        self.record_error(err.to_string()).await;
        Err(err)
    }

    async fn require_user(&self) -> Result<User> {
        self.auth.current_user().await.ok_or(Error::NotAuthenticated)
    }

    /// Await the remote phase of a mutation; on failure record the error and
    /// re-fetch the affected collection instead of rolling back locally
    async fn confirm<T>(&self, write: impl Future<Output = Result<T>>, scope: Resync) -> Result<T> {
        match write.await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, ?scope, "remote write failed, resynchronizing");
                self.record_error(err.to_string()).await;
                match self.resync(scope).await {
                    Ok(()) => self.emit(BoardEvent::Resynced),
                    Err(resync_err) => {
                        warn!(error = %resync_err, "resynchronization failed");
                        self.record_error(format!(
                            "{} (reload also failed: {})",
                            err, resync_err
                        ))
                        .await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn resync(&self, scope: Resync) -> Result<()> {
        match scope {
            Resync::Boards => {
                self.load_boards().await?;
                Ok(())
            }
            Resync::Columns => {
                let board_id = self.state.read().await.current_board.as_ref().map(|b| b.id);
                match board_id {
                    Some(board_id) => self.load_columns(board_id).await,
                    None => Ok(()),
                }
            }
            Resync::Tasks => self.load_tasks().await,
        }
    }

    // ------------------------------------------------------------------
    // Boards
    // ------------------------------------------------------------------

    async fn load_boards(&self) -> Result<Vec<Board>> {
        let rows = self
            .remote
            .select(Table::Boards, &Query::new().order_by("created_at", false))
            .await?;
        let boards: Vec<Board> = decode_all(rows)?;

        {
            let mut state = self.state.write().await;
            if let Some(current) = state.current_board.as_ref().map(|board| board.id) {
                state.current_board = boards.iter().find(|board| board.id == current).cloned();
                if state.current_board.is_none() {
                    state.columns.clear();
                    state.tasks.clear();
                }
            }
            state.boards = boards.clone();
            state.is_loading = false;
        }
        self.emit(BoardEvent::BoardsChanged);
        Ok(boards)
    }

    /// Replace the board list from the remote store, newest first
    pub async fn fetch_boards(&self) -> Result<Vec<Board>> {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        match self.load_boards().await {
            Ok(boards) => {
                debug!(count = boards.len(), "boards fetched");
                Ok(boards)
            }
            Err(err) => self.fail(err).await,
        }
    }

    /// Make a board current and load its columns and tasks; `None` unloads
    pub async fn select_board(&self, board_id: Option<Uuid>) -> Result<()> {
        let Some(board_id) = board_id else {
            {
                let mut state = self.state.write().await;
                state.current_board = None;
                state.columns.clear();
                state.tasks.clear();
            }
            self.emit(BoardEvent::ColumnsChanged);
            self.emit(BoardEvent::TasksChanged);
            return Ok(());
        };

        {
            let mut state = self.state.write().await;
            let Some(board) = state.board(board_id).cloned() else {
                drop(state);
                return self.fail(Error::NotFound(format!("Board {}", board_id))).await;
            };
            state.current_board = Some(board);
        }
        self.fetch_columns(board_id).await
    }

    /// Create a board with the default columns and put it first in the list
    pub async fn create_board(&self, draft: NewBoard) -> Result<Board> {
        let draft = match draft.normalized() {
            Ok(draft) => draft,
            Err(err) => return self.fail(err).await,
        };
        let user = match self.require_user().await {
            Ok(user) => user,
            Err(err) => return self.fail(err).await,
        };

        let color = draft
            .color
            .clone()
            .unwrap_or_else(|| self.default_color.clone());
        let created = async {
            let board_id = self
                .remote
                .create_board_with_columns(
                    user.id,
                    &draft.name,
                    draft.description.as_deref(),
                    &color,
                )
                .await?;
            let rows = self
                .remote
                .select(Table::Boards, &Query::new().eq("id", board_id))
                .await?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound(format!("Board {}", board_id)))?;
            decode::<Board>(row)
        }
        .await;

        match created {
            Ok(board) => {
                self.state.write().await.boards.insert(0, board.clone());
                self.emit(BoardEvent::BoardsChanged);
                info!(board_id = %board.id, name = %board.name, "board created");
                Ok(board)
            }
            Err(err) => self.fail(err).await,
        }
    }

    pub async fn update_board(&self, board_id: Uuid, mut patch: BoardPatch) -> Result<()> {
        if let Err(err) = patch.validate() {
            return self.fail(err).await;
        }
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }
        if let Some(name) = &patch.name {
            patch.name = Some(name.trim().to_string());
        }
        patch.updated_at = Some(chrono::Utc::now());

        {
            let mut state = self.state.write().await;
            let Some(board) = state.boards.iter_mut().find(|board| board.id == board_id) else {
                drop(state);
                return self.fail(Error::NotFound(format!("Board {}", board_id))).await;
            };
            board.apply(&patch);
            if let Some(current) = state.current_board.as_mut().filter(|b| b.id == board_id) {
                current.apply(&patch);
            }
        }
        self.emit(BoardEvent::BoardsChanged);

        self.confirm(
            async {
                self.remote
                    .update(Table::Boards, board_id, encode(&patch)?)
                    .await
            },
            Resync::Boards,
        )
        .await
    }

    /// Delete a board; its columns and tasks go with it
    pub async fn delete_board(&self, board_id: Uuid) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let unloaded = {
            let mut state = self.state.write().await;
            let before = state.boards.len();
            state.boards.retain(|board| board.id != board_id);
            if state.boards.len() == before {
                drop(state);
                return self.fail(Error::NotFound(format!("Board {}", board_id))).await;
            }
            let is_current = state
                .current_board
                .as_ref()
                .is_some_and(|board| board.id == board_id);
            if is_current {
                state.current_board = None;
                state.columns.clear();
                state.tasks.clear();
            }
            is_current
        };
        self.emit(BoardEvent::BoardsChanged);
        if unloaded {
            self.emit(BoardEvent::ColumnsChanged);
            self.emit(BoardEvent::TasksChanged);
        }
        info!(%board_id, "board deleted");

        self.confirm(self.remote.delete(Table::Boards, board_id), Resync::Boards)
            .await
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    async fn load_columns(&self, board_id: Uuid) -> Result<()> {
        let rows = self
            .remote
            .select(
                Table::Columns,
                &Query::new()
                    .eq("board_id", board_id)
                    .order_by("position", true),
            )
            .await?;
        let columns: Vec<Column> = decode_all(rows)?;

        {
            let mut state = self.state.write().await;
            state.replace_columns(columns);
            state.normalize_positions();
        }
        self.emit(BoardEvent::ColumnsChanged);
        self.load_tasks().await
    }

    /// Replace the columns of a board, then their tasks
    pub async fn fetch_columns(&self, board_id: Uuid) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }
        match self.load_columns(board_id).await {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err).await,
        }
    }

    /// Append a column to the current board
    pub async fn create_column(&self, draft: NewColumn) -> Result<Column> {
        let title = match required(&draft.title, "Column title") {
            Ok(title) => title,
            Err(err) => return self.fail(err).await,
        };
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let column = {
            let mut state = self.state.write().await;
            if state.current_board.as_ref().map(|board| board.id) != Some(draft.board_id) {
                drop(state);
                return self
                    .fail(Error::NotFound(format!("Board {} is not loaded", draft.board_id)))
                    .await;
            }
            let column = Column {
                id: Uuid::new_v4(),
                title,
                board_id: draft.board_id,
                position: 0,
                color: draft.color.unwrap_or_else(|| self.default_color.clone()),
                created_at: chrono::Utc::now(),
            };
            let placement = state.push_column(column.clone());
            Column {
                position: placement.position,
                ..column
            }
        };
        self.emit(BoardEvent::ColumnsChanged);

        let confirmed = self
            .confirm(
                async {
                    let row = self.remote.insert(Table::Columns, encode(&column)?).await?;
                    decode::<Column>(row)
                },
                Resync::Columns,
            )
            .await?;

        let mut state = self.state.write().await;
        let Some(local) = state.columns.iter_mut().find(|c| c.id == column.id) else {
            return Ok(confirmed);
        };
        *local = Column {
            position: local.position,
            ..confirmed
        };
        Ok(local.clone())
    }

    pub async fn update_column(&self, column_id: Uuid, mut patch: ColumnPatch) -> Result<()> {
        if let Some(title) = &patch.title {
            match required(title, "Column title") {
                Ok(title) => patch.title = Some(title),
                Err(err) => return self.fail(err).await,
            }
        }
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        {
            let mut state = self.state.write().await;
            let Some(column) = state.columns.iter_mut().find(|c| c.id == column_id) else {
                drop(state);
                return self.fail(Error::NotFound(format!("Column {}", column_id))).await;
            };
            column.apply(&patch);
        }
        self.emit(BoardEvent::ColumnsChanged);

        self.confirm(
            async {
                self.remote
                    .update(Table::Columns, column_id, encode(&patch)?)
                    .await
            },
            Resync::Columns,
        )
        .await
    }

    /// Delete a column together with its tasks and close the gap it leaves
    pub async fn delete_column(&self, column_id: Uuid) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let removed = self.state.write().await.remove_column(column_id);
        let Some((_, placements)) = removed else {
            return self.fail(Error::NotFound(format!("Column {}", column_id))).await;
        };
        self.emit(BoardEvent::ColumnsChanged);
        self.emit(BoardEvent::TasksChanged);

        self.confirm(
            async {
                self.remote.delete(Table::Columns, column_id).await?;
                self.persist_columns(&placements).await
            },
            Resync::Columns,
        )
        .await
    }

    /// Apply a full ordering of the current board's columns
    pub async fn reorder_columns(&self, ordered: &[Uuid]) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let reordered = self.state.write().await.reorder_columns(ordered);
        let placements = match reordered {
            Ok(placements) => placements,
            Err(err) => return self.fail(err).await,
        };
        if placements.is_empty() {
            return Ok(());
        }
        self.emit(BoardEvent::ColumnsChanged);

        self.confirm(self.persist_columns(&placements), Resync::Columns)
            .await
    }

    async fn persist_columns(&self, placements: &[ColumnPlacement]) -> Result<()> {
        for placement in placements {
            self.remote
                .update(
                    Table::Columns,
                    placement.column_id,
                    json!({ "position": placement.position }),
                )
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    async fn load_tasks(&self) -> Result<()> {
        let column_ids: Vec<Uuid> = {
            let state = self.state.read().await;
            state.columns.iter().map(|column| column.id).collect()
        };

        let tasks: Vec<Task> = if column_ids.is_empty() {
            Vec::new()
        } else {
            let rows = self
                .remote
                .select(
                    Table::Tasks,
                    &Query::new()
                        .any_of("column_id", &column_ids)
                        .order_by("position", true),
                )
                .await?;
            decode_all(rows)?
        };

        debug!(count = tasks.len(), "tasks loaded");
        {
            // A partly applied move can leave ties or gaps behind
            let mut state = self.state.write().await;
            state.replace_tasks(tasks);
            state.normalize_positions();
        }
        self.emit(BoardEvent::TasksChanged);
        Ok(())
    }

    /// Replace the tasks of the loaded columns from the remote store
    pub async fn fetch_tasks(&self) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }
        match self.load_tasks().await {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err).await,
        }
    }

    /// Append a task to the end of its column
    pub async fn create_task(&self, draft: NewTask) -> Result<Task> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let task = {
            let mut state = self.state.write().await;
            let position = state.column_tasks(draft.column_id).len();
            let inserted = draft
                .into_task(position)
                .and_then(|task| state.insert_task(task.clone()).map(|_| task));
            match inserted {
                Ok(task) => task,
                Err(err) => {
                    drop(state);
                    return self.fail(err).await;
                }
            }
        };
        self.emit(BoardEvent::TasksChanged);

        let confirmed = self
            .confirm(
                async {
                    let row = self.remote.insert(Table::Tasks, encode(&task)?).await?;
                    decode::<Task>(row)
                },
                Resync::Tasks,
            )
            .await?;

        let mut state = self.state.write().await;
        let Some(local) = state.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Ok(confirmed);
        };
        *local = Task {
            column_id: local.column_id,
            position: local.position,
            ..confirmed
        };
        Ok(local.clone())
    }

    /// Update task fields; a column or position in the patch is handled as a move
    pub async fn update_task(&self, task_id: Uuid, patch: TaskPatch) -> Result<()> {
        if let Err(err) = patch.validate() {
            return self.fail(err).await;
        }

        if patch.has_placement() {
            let target = {
                let state = self.state.read().await;
                state.task(task_id).map(|task| {
                    let column_id = patch.column_id.unwrap_or(task.column_id);
                    let index = patch.position.unwrap_or_else(|| {
                        if column_id == task.column_id {
                            task.position
                        } else {
                            usize::MAX
                        }
                    });
                    (column_id, index)
                })
            };
            let Some((column_id, index)) = target else {
                return self.fail(Error::NotFound(format!("Task {}", task_id))).await;
            };
            self.move_task(task_id, column_id, index).await?;
        }

        let mut patch = patch.without_placement();
        if !patch.has_fields() {
            return Ok(());
        }
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }
        if let Some(title) = &patch.title {
            patch.title = Some(title.trim().to_string());
        }
        patch.updated_at = Some(chrono::Utc::now());

        {
            let mut state = self.state.write().await;
            let Some(task) = state.tasks.iter_mut().find(|task| task.id == task_id) else {
                drop(state);
                return self.fail(Error::NotFound(format!("Task {}", task_id))).await;
            };
            task.apply(&patch);
        }
        self.emit(BoardEvent::TasksChanged);

        self.confirm(
            async {
                self.remote
                    .update(Table::Tasks, task_id, encode(&patch)?)
                    .await
            },
            Resync::Tasks,
        )
        .await
    }

    /// Delete a task and close the gap it leaves in its column
    pub async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let removed = self.state.write().await.remove_task(task_id);
        let Some((_, placements)) = removed else {
            return self.fail(Error::NotFound(format!("Task {}", task_id))).await;
        };
        self.emit(BoardEvent::TasksChanged);

        self.confirm(
            async {
                self.remote.delete(Table::Tasks, task_id).await?;
                self.persist_tasks(&placements).await
            },
            Resync::Tasks,
        )
        .await
    }

    /// Relocate a task to `column_id` at `index`
    ///
    /// Moving a task to where it already is changes nothing and writes nothing.
    pub async fn move_task(&self, task_id: Uuid, column_id: Uuid, index: usize) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let moved = self.state.write().await.move_task(task_id, column_id, index);
        let placements = match moved {
            Ok(placements) => placements,
            Err(err) => return self.fail(err).await,
        };
        if placements.is_empty() {
            return Ok(());
        }
        self.emit(BoardEvent::TasksChanged);
        debug!(%task_id, %column_id, index, changed = placements.len(), "task moved");

        self.confirm(self.persist_tasks(&placements), Resync::Tasks)
            .await
    }

    /// Apply a full ordering of one column's tasks
    pub async fn reorder_tasks(&self, column_id: Uuid, ordered: &[Uuid]) -> Result<()> {
        if let Err(err) = self.require_user().await {
            return self.fail(err).await;
        }

        let reordered = self.state.write().await.reorder_tasks(column_id, ordered);
        let placements = match reordered {
            Ok(placements) => placements,
            Err(err) => return self.fail(err).await,
        };
        if placements.is_empty() {
            return Ok(());
        }
        self.emit(BoardEvent::TasksChanged);

        self.confirm(self.persist_tasks(&placements), Resync::Tasks)
            .await
    }

    /// Carry out what the drag reconciler decided
    pub async fn apply_intent(&self, intent: DragIntent) -> Result<()> {
        match intent {
            DragIntent::Move {
                task_id,
                column_id,
                index,
            } => self.move_task(task_id, column_id, index).await,
            DragIntent::Reorder { column_id, task_ids } => {
                self.reorder_tasks(column_id, &task_ids).await
            }
        }
    }

    async fn persist_tasks(&self, placements: &[TaskPlacement]) -> Result<()> {
        for placement in placements {
            self.remote
                .update(
                    Table::Tasks,
                    placement.task_id,
                    json!({
                        "column_id": placement.column_id,
                        "position": placement.position,
                    }),
                )
                .await?;
        }
        Ok(())
    }
}
