use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Common behaviour of the numeric identifier spaces.
///
/// `DocId` and `TermId` are distinct types so that passing one where the
/// other is expected fails to compile. Generic code (postings rows, the
/// cache, the postings store) is written against this trait instead.
pub trait Ident:
    Copy
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Label used in error messages, e.g. `doc_id`.
    const NAME: &'static str;

    fn from_u64(value: u64) -> Self;
    fn as_u64(self) -> u64;

    fn index(self) -> usize {
        self.as_u64() as usize
    }

    /// Big-endian key bytes, so byte order matches numeric order in the store.
    fn to_key(self) -> [u8; 8] {
        self.as_u64().to_be_bytes()
    }

    fn from_key(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(Self::from_u64(u64::from_be_bytes(arr)))
    }
}

macro_rules! ident {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl Ident for $name {
            const NAME: &'static str = $label;

            fn from_u64(value: u64) -> Self {
                Self(value)
            }

            fn as_u64(self) -> u64 {
                self.0
            }
        }
    };
}

ident!(
    /// Zero-based document identifier, contiguous in `[0, num_docs)`.
    DocId,
    "doc_id"
);
ident!(
    /// Zero-based term identifier, contiguous in `[0, unique_terms)`.
    TermId,
    "term_id"
);
