//! Run shell command batches on many SSH hosts at once.
//!
//! The engine lives in [`fanout`]; `src/main.rs` wires it to the command line.

pub mod fanout;
