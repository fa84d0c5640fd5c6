//! Historify Scan - change classification over category trees.
//!
//! A scan walks a category's data root, compares what it finds against the
//! state reconstructed from the change logs, and emits a totally ordered
//! batch of change events: `new`, `changed`, `move`, `deleted`, plus
//! `comment` rows for skipped non-regular files. The batch is buffered by
//! the caller and flushed to the open log in one append.
//!
//! Duplicate detection is a separate read-only query over the
//! reconstructed state.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod duplicates;
mod error;
mod scanner;

pub use duplicates::{DuplicateGroup, find_duplicates};
pub use error::{ScanError, ScanResult};
pub use scanner::{ScanConfig, scan_category};
