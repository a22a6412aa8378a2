//! Core library for Taskboard
//!
//! This crate contains the client-side board logic, including:
//! - Board, column and task models
//! - The board state container with optimistic writes
//! - Drag-and-drop reconciliation
//! - Remote store and authentication collaborators

pub mod auth;
pub mod board;
pub mod config;
pub mod dnd;
pub mod error;
pub mod remote;

pub use config::Config;
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
