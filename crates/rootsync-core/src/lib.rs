//! rootsync Core - Domain types and ports for the change-feed engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Document`, `LogEntry`, `FileSystemItem`,
//!   `FileSystemItemChange`, `ChangeSummary`, `RootSet`
//! - **Port definitions** - `IRepository`, the boundary to the external
//!   document repository and its audit trail
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data and invariants with no I/O.
//! Ports define the trait interfaces that adapter crates implement
//! (`rootsync-cache` ships a SQLite implementation). The engine crates
//! (`rootsync-adapter`, `rootsync-sync`) only talk to the repository
//! through these ports.

pub mod config;
pub mod domain;
pub mod ports;
