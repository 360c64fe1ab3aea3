//! ODDSEDGE — sports odds republisher with consensus edge scoring.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod data;
pub mod strategy;
pub mod storage;
pub mod api;
