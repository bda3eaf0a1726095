// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface.
//!
//! Argument parsing plus the `image` and `video` command implementations.

// Modules
/// CLI arguments.
pub mod args;

/// Command runners.
pub mod run;
