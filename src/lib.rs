pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod explore;

pub use error::{Result, WayfarerError};
