pub mod config;
pub mod logging;
pub mod mirror_log;
