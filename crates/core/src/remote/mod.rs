//! Remote store collaborators
//!
//! The hosted backend is the durable source of truth. This module defines the
//! row-level contract the board store relies on and ships two implementations.

mod memory;
mod rest;
mod store;

pub use memory::MemoryStore;
pub use rest::{query_string, RestClient, RestStore};
pub(crate) use rest::ensure_success;
pub use store::{decode, decode_all, encode, Filter, Order, Query, RemoteStore, Table};
