//! Prefixed, checksummed key/seed text codec and the Ed25519 signature
//! engine built on top of it.

mod codec;
mod sig;

pub use codec::{KeyPair, Prefix};
pub use sig::verify;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unrecognized prefix byte")]
    UnknownPrefix,
    #[error("seed's embedded public key type is not a recognized public prefix")]
    InvalidSeedPublicType,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("expected prefix {expected:?}, got {actual:?}")]
    PrefixMismatch { expected: Prefix, actual: Prefix },
    #[error("base32 decode error: {0}")]
    Base32(String),
    #[error("decoded key has the wrong length")]
    BadLength,
}
