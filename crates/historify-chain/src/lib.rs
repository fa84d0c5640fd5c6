//! Historify Chain - change logs bound into a signed hash chain.
//!
//! The chain is the tool's correctness contract:
//!
//! - every change is a row in a dated, append-only CSV changelog
//! - the first row of every log is a `closing` event carrying the digests
//!   of the previous chain element (the seed for the first log)
//! - closing a log means signing it; exactly one unsigned ("open") log
//!   exists at any time
//!
//! This crate provides the event model and CSV codec ([`ChangeEvent`]),
//! the append-only [`LogStore`], prior-state reconstruction ([`reconstruct`]),
//! the open/close lifecycle ([`ChainManager`]), chain verification
//! ([`Verifier`]) and the derived integrity index.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod chain;
mod error;
mod event;
mod index;
mod replay;
mod store;
mod verify;

pub use chain::{ChainManager, CloseOutcome};
pub use error::{ChainError, ChainResult};
pub use event::{ChangeEvent, EventKind, EventPayload, FileMeta, VerifyOutcome};
pub use index::{load_index, rebuild_index, write_index};
pub use replay::{ClosingLink, ReplayOutcome, StateMap, TrackedFile, reconstruct};
pub use store::{LogFile, LogStore};
pub use verify::{FailureKind, Verifier, VerifyFailure, VerifyOptions, VerifyReport};
