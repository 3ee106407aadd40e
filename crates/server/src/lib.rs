// gitmirror-server library entry point.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod git;
pub mod runtime;
pub mod startup;
