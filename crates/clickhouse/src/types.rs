//! Fixed-size byte columns.

use alloy_primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

macro_rules! fixed_bytes_column {
    ($(#[$meta:meta])* $name:ident, $len:literal, $alloy:ty) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Default, Deref,
        )]
        pub struct $name(pub [u8; $len]);

        impl From<$alloy> for $name {
            fn from(value: $alloy) -> Self {
                Self(<[u8; $len]>::from(value.0))
            }
        }

        impl From<$name> for $alloy {
            fn from(value: $name) -> Self {
                Self::from(value.0)
            }
        }

        impl $name {
            /// Hex encoding without `0x` prefix, as expected by `unhex()` in queries.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }
    };
}

fixed_bytes_column!(
    /// `FixedString(20)` column holding an address.
    AddressBytes,
    20,
    Address
);

fixed_bytes_column!(
    /// `FixedString(32)` column holding a transaction hash.
    HashBytes,
    32,
    B256
);
