pub mod config;
pub mod logging;

pub mod aggregate;
pub mod classify;
pub mod control;
pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod supervisor;
