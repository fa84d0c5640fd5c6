//! Historify Crypto - file digests and signing keys.
//!
//! Two concerns live here:
//! - [`FileDigests`]: the `(sha256, blake3)` digest pair computed for every
//!   tracked file and every chain element, streamed in a single pass
//! - [`KeyPair`]: an Ed25519 keypair with zeroized secret material, backing
//!   the built-in signer

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod digest;
mod error;
mod keypair;

pub use digest::{FileDigests, digest_file, digest_reader};
pub use error::{CryptoError, CryptoResult};
pub use keypair::{KeyPair, PublicKey};
