use std::{
    fmt::{Debug, Display, LowerHex},
    ops::Deref,
    str::FromStr,
};

use hex::FromHexError;
use sha1::{Digest as _, Sha1};

use crate::storable::ObjectKind;

/// A SHA-1 object id.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Digest(pub [u8; 20]);

impl Digest {
    /// All zeroes. Stands in for the missing side of an added or deleted file.
    pub const NULL: Self = Digest([0; 20]);

    /// Length of a digest in hex form.
    pub const HEX_LEN: usize = 40;

    /// Length of the abbreviated form returned by [`Digest::short`].
    pub const SHORT_LEN: usize = 7;

    /// SHA-1 of `bytes`, as is.
    pub fn new(bytes: &[u8]) -> Self {
        Digest(Sha1::digest(bytes).into())
    }

    /// The id an object of `kind` with `payload` is stored under: the hash of
    /// `"{kind} {len}\0{payload}"`. The payload is fed to the hasher without being copied.
    pub fn for_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let hasher = Sha1::new()
            .chain_update(kind.header(payload.len()))
            .chain_update(payload);
        Digest(hasher.finalize().into())
    }

    /// Read a digest from its raw 20 byte form, as found in trees and the index.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Digest)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The first few hex digits, for display. Not guaranteed to be unique.
    pub fn short(&self) -> String {
        format!("{:.*x}", Self::SHORT_LEN, self)
    }
}

impl Deref for Digest {
    type Target = [u8; 20];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Honours a precision as a number of hex digits, so `{:.7x}` gives the short form.
impl LowerHex for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.to_hex();
        let len = f.precision().unwrap_or(Self::HEX_LEN).min(Self::HEX_LEN);
        f.write_str(&hex[..len])
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Parses exactly 40 hex digits, in either case. Abbreviations are resolved elsewhere, since
/// that needs the object database.
impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(FromHexError::InvalidStringLength);
        }
        let mut bytes = [0; 20];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Digest(bytes))
    }
}
