//! Worker library: CLI, configuration, logging, and report plumbing around
//! the dubbing pipeline core.

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;

pub use cli::{Cli, Command, RunArgs};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use report::StdoutSink;
