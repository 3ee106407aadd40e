// Git layer: command execution and mirror synchronization.

pub mod mirror;
pub mod runner;
