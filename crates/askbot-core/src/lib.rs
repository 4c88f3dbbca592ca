//! Core domain + application logic for the askbot usage tracker.
//!
//! This crate is intentionally framework-agnostic. The chat transport and the
//! response generator live behind ports (traits) implemented by the host; the
//! only entry point for request handling is [`activity::ActivityService`].

pub mod activity;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod ports;
pub mod store;

pub use errors::{Error, Result};
