//! rootsync Audit - Journaling into the repository audit trail
//!
//! Provides:
//! - `JournalLogger`: records root registration changes and sync tombstones
//!   through `IRepository::append_log`
//! - `SkipReason`: structured codes explaining why a log entry produced no
//!   change for a poll

pub mod journal;
pub mod reason;

pub use journal::JournalLogger;
pub use reason::SkipReason;
