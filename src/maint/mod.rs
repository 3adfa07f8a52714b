pub mod backup;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod procs;
pub mod prompt;
pub mod restore;
pub mod service;
pub mod state;
pub mod terminator;

#[cfg(test)]
pub(crate) mod testutil;
