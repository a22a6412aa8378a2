//! Board, column and task model definitions
//!
//! Field names match the rows of the remote `boards`, `columns` and `tasks`
//! tables so rows decode directly into these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::Result;

pub const DEFAULT_BOARD_COLOR: &str = "#6366f1";
pub const DEFAULT_COLUMN_COLOR: &str = "#6366f1";

/// Columns created together with every new board, in order
pub const DEFAULT_COLUMNS: [(&str, &str); 3] = [
    ("To Do", "#94a3b8"),
    ("In Progress", "#fbbf24"),
    ("Done", "#22c55e"),
];

/// Task priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(Error::Validation(format!(
                "Unsupported priority '{}'",
                value
            ))),
        }
    }
}

/// A board owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub fn apply(&mut self, patch: &BoardPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// An ordered bucket of tasks within a board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub title: String,
    pub board_id: Uuid,
    pub position: usize,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Column {
    pub fn apply(&mut self, patch: &ColumnPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
    }
}

/// A unit of work belonging to exactly one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub column_id: Uuid,
    pub position: usize,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Apply the field part of a patch. Column and position are placement
    /// and are handled by the board state.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(assigned_to) = patch.assigned_to {
            self.assigned_to = assigned_to;
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Input for a new board
#[derive(Debug, Clone, Default)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl NewBoard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Trim the fields and reject an empty name
    pub fn normalized(self) -> Result<Self> {
        Ok(Self {
            name: required(&self.name, "Board name")?,
            description: sanitize_optional_string(self.description),
            color: sanitize_optional_string(self.color),
        })
    }
}

/// Input for a new column; it is appended after the existing ones
#[derive(Debug, Clone)]
pub struct NewColumn {
    pub board_id: Uuid,
    pub title: String,
    pub color: Option<String>,
}

impl NewColumn {
    pub fn new(board_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            board_id,
            title: title.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Input for a new task; it is appended at the end of its column
#[derive(Debug, Clone)]
pub struct NewTask {
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub assigned_to: Option<Uuid>,
}

impl NewTask {
    pub fn new(column_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            column_id,
            title: title.into(),
            description: None,
            priority: Priority::default(),
            due_date: None,
            labels: Vec::new(),
            assigned_to: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_assignee(mut self, user_id: Uuid) -> Self {
        self.assigned_to = Some(user_id);
        self
    }

    /// Build the tentative task placed at `position`
    pub fn into_task(self, position: usize) -> Result<Task> {
        let now = Utc::now();
        Ok(Task {
            id: Uuid::new_v4(),
            title: required(&self.title, "Task title")?,
            description: sanitize_optional_string(self.description),
            column_id: self.column_id,
            position,
            priority: self.priority,
            due_date: self.due_date,
            labels: self.labels,
            assigned_to: self.assigned_to,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial board update
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BoardPatch {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            required(name, "Board name")?;
        }
        Ok(())
    }
}

/// Partial column update
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Partial task update
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            required(title, "Task title")?;
        }
        Ok(())
    }

    pub(crate) fn has_placement(&self) -> bool {
        self.column_id.is_some() || self.position.is_some()
    }

    /// The same patch without its placement fields
    pub(crate) fn without_placement(&self) -> Self {
        Self {
            column_id: None,
            position: None,
            ..self.clone()
        }
    }

    pub(crate) fn has_fields(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.priority.is_some()
            || self.due_date.is_some()
            || self.labels.is_some()
            || self.assigned_to.is_some()
    }
}

/// Split comma separated label input into trimmed, non-empty labels
pub fn parse_labels(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn sanitize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let column_id = Uuid::new_v4();
        let task = NewTask::new(column_id, "  Write docs ").into_task(0).unwrap();

        assert_eq!(task.title, "Write docs");
        assert_eq!(task.column_id, column_id);
        assert_eq!(task.position, 0);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.labels.is_empty());
        assert!(task.description.is_none());
    }

    #[test]
    fn test_new_task_builders() {
        let due = "2024-06-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let assignee = Uuid::new_v4();
        let task = NewTask::new(Uuid::new_v4(), "Review")
            .with_due_date(due)
            .with_assignee(assignee)
            .into_task(3)
            .unwrap();

        assert_eq!(task.due_date, Some(due));
        assert_eq!(task.assigned_to, Some(assignee));
        assert_eq!(task.position, 3);
    }

    #[test]
    fn test_empty_title_is_rejected() {
        let result = NewTask::new(Uuid::new_v4(), "   ").into_task(0);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_board_name_is_rejected() {
        let result = NewBoard::new("").normalized();
        assert!(matches!(result, Err(Error::Validation(_))));

        let board = NewBoard::new(" Roadmap ")
            .with_description("  ")
            .normalized()
            .unwrap();
        assert_eq!(board.name, "Roadmap");
        assert!(board.description.is_none());
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            parse_labels("bug, ui ,, backend"),
            vec!["bug".to_string(), "ui".to_string(), "backend".to_string()]
        );
        assert!(parse_labels(" , ").is_empty());
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("Urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_task_patch_serializes_only_set_fields() {
        let patch = TaskPatch {
            description: Some(None),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();

        assert_eq!(
            value,
            serde_json::json!({ "description": null, "priority": "high" })
        );
    }

    #[test]
    fn test_task_row_decodes_with_backend_defaults_missing() {
        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "title": "Row",
            "column_id": Uuid::new_v4(),
            "position": 2,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        });
        let task: Task = serde_json::from_value(row).unwrap();

        assert_eq!(task.position, 2);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.labels.is_empty());
    }
}
