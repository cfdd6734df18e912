//! Input adapters used by the command-line replay tool.

pub mod csv;
