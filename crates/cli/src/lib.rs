//! relcheck CLI
//!
//! Command-line interface for listing and running the related best-sellers
//! scenarios, checking the local browser toolchain and managing the suite
//! configuration.

pub mod commands;
pub mod output;
