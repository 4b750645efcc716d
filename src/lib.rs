pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{BugzillaClient, GithubClient, LocalStorage};
pub use config::ReportConfig;
pub use core::engine::ReportEngine;
pub use core::report::ReportPipeline;
pub use utils::error::{ReportError, Result};
