//! Scheduler process: fires queue submissions on cron triggers.

pub mod config;
pub mod dispatch;
pub mod jobs;
pub mod state;
