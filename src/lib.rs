// ABOUTME: Library module for pg-upgrade-verifier
// ABOUTME: Exports the snapshot, diff, and command layers for use in binary and tests

pub mod backup;
pub mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod postgres;
pub mod report;
pub mod snapshot;
pub mod utils;
