//! Core domain + application logic for the wall-to-chat forwarder.
//!
//! This crate is framework-agnostic. The VK API and Telegram live behind ports
//! (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod normalize;
pub mod poller;
pub mod registry;
pub mod seen;
pub mod store;

pub use errors::{Error, Result};
