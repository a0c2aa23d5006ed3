//! Core application infrastructure

pub mod banner;
pub mod cli;
pub mod config;
pub mod constants;
pub mod secret;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands, HistoryCommands};
pub use config::AppConfig;
pub use secret::Secret;
