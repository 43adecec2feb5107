//! # CLI Command Implementations
//!
//! Each subcommand of the `stratum` tool lives in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `stratum` library.
//!
//! Library errors are reported through `stratum::suggestions::explain` so
//! every failure carries a fix hint where one is known.

pub mod build;
pub mod tree;
pub mod validate;
