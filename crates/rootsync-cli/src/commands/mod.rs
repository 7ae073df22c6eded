//! CLI command implementations

pub mod changes;
pub mod config;
pub mod doc;
pub mod items;
pub mod roots;
