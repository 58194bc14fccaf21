//! The `parley` terminal client.
//!
//! The binary in `bin/parley.rs` is a thin wrapper around this library:
//! configuration, the console front-end, the demo tools and audio file I/O.

pub mod audio;
pub mod cli;
pub mod config;
pub mod console;
pub mod tools;
