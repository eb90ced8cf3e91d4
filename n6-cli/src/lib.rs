//! n6ctl library.
//!
//! This library exposes the command handlers for integration testing.
//! In production, `n6ctl` is used as a binary (main.rs).

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
