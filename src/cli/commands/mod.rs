//! CLI command implementations

pub mod utils;

pub mod completions;
pub mod config;
pub mod include;
pub mod index;
pub mod init;
pub mod list;
pub mod report;
pub mod reset;
pub mod search;
pub mod select;
pub mod set;
pub mod show;
pub mod status;
pub mod tag;
