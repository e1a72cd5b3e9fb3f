//! Shared utilities for the meshanim CLI

pub mod format;
pub mod logging;
pub mod table;
pub mod tree;

pub use format::*;
pub use table::*;
pub use tree::*;
