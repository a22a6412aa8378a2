//! Authentication collaborators
//!
//! Session handling is delegated to the backend; the board store only asks
//! who is signed in.

mod memory;
mod model;
mod provider;
mod rest;

pub use memory::{MemoryAuth, DEFAULT_AUTH_SECRET, DEFAULT_SESSION_TTL_SECONDS};
pub use model::{Profile, ProfilePatch, Session, User};
pub use provider::AuthProvider;
pub use rest::RestAuth;
