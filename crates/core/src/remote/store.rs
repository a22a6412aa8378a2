//! Remote store trait
//!
//! Defines the row-level interface of the hosted backend. Rows travel as JSON
//! objects; the board store decodes them into the typed models.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::Result;

/// Tables of the remote schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Boards,
    Columns,
    Tasks,
    Profiles,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boards => "boards",
            Self::Columns => "columns",
            Self::Tasks => "tasks",
            Self::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter; values are compared in their textual form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filters and ordering for a select
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn any_of<T: ToString>(mut self, column: impl Into<String>, values: &[T]) -> Self {
        self.filters.push(Filter::In {
            column: column.into(),
            values: values.iter().map(ToString::to_string).collect(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }
}

/// Row-level access to the hosted backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the rows of `table` matching every filter, in the requested order
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>>;

    /// Insert a row and return it as stored, with generated id and timestamps
    async fn insert(&self, table: Table, row: Value) -> Result<Value>;

    /// Merge `patch` into the row with the given id
    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<()>;

    /// Delete the row with the given id
    async fn delete(&self, table: Table, id: Uuid) -> Result<()>;

    /// Create a board owned by `owner` together with the default columns as
    /// one atomic unit, returning the new board id
    async fn create_board_with_columns(
        &self,
        owner: Uuid,
        name: &str,
        description: Option<&str>,
        color: &str,
    ) -> Result<Uuid>;
}

pub fn decode<T: DeserializeOwned>(row: Value) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}

pub fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
