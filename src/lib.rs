#![forbid(unsafe_code)]

//! Supervision of a single headless agent process over a line-delimited
//! JSON protocol on its stdin/stdout.

pub mod agent;
pub mod config;
pub mod errors;
pub mod exit_codes;
pub mod protocol;
pub mod supervisor;

pub use config::{GlobalConfig, SupervisorConfig};
pub use errors::{AppError, Result};
pub use supervisor::{Supervisor, TaskRequest};
