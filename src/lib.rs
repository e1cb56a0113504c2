//! mau - a chat companion with persistent sessions.
//!
//! Conversations live in a key-value store, replies come from a remote chat
//! endpoint and are revealed one character at a time.

pub mod chat;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod logging;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
