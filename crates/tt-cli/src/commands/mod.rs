//! CLI subcommand implementations.

pub mod entries;
pub mod log;
pub mod period;
pub mod project;
pub mod report;
pub mod task;
pub mod timer;
pub mod util;
