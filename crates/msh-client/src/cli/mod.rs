//! Command-line interface.

mod types;


pub use types::*;
