//! Core shared library for the statusline services.
//!
//! This crate exposes the primitives every other statusline crate depends
//! on: the canonical error type, environment configuration, the Postgres
//! pool wrapper and logging setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;

pub use errors::{Result as CoreResult, StatusLineError};
