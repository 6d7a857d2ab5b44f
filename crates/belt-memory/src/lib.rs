//! # belt-memory
//!
//! Conversation state and user data for Belt: a process-local
//! [`InMemorySessions`] and a SQLite-backed [`Store`].

pub mod sessions;
pub mod store;

pub use sessions::InMemorySessions;
pub use store::Store;
