//! CSV adapters.

pub mod script_reader;
