//! Command-line interface.

pub mod commands;
mod helpers;
