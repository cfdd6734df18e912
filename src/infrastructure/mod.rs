//! In-memory implementations of the collaborator ports.

pub mod in_memory;
