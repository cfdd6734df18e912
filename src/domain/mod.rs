//! Domain types and collaborator ports.
//!
//! Everything here is free of scheduling concerns: snapshots, dirty-field
//! tracking, payloads and observer responses are plain values.

pub mod address;
pub mod cart;
pub mod checkout;
pub mod dirty;
pub mod observer;
pub mod payload;
pub mod ports;
