//! Core domain + application logic for the moose IRC bot.
//!
//! This crate is intentionally protocol-agnostic. The IRC connection and the
//! moose2 HTTP API live behind ports (traits) implemented in adapter crates.

pub mod command;
pub mod config;
pub mod cooldown;
pub mod errors;
pub mod formatting;
pub mod invites;
pub mod logging;
pub mod ports;
pub mod router;

pub use errors::{Error, Result};
