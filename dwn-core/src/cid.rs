// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content identifiers over canonical CBOR.
//!
//! All identifiers are CIDv1 with a SHA-256 multihash. Messages hash their
//! deterministic CBOR encoding under the `dag-cbor` multicodec, data blobs
//! hash their bytes under the `raw` multicodec. The text form is the
//! multibase prefix `b` followed by the lower-case base32 encoding of the
//! byte form.
//!
//! ## Example
//!
//! ```
//! use dwn_core::Cid;
//!
//! let cid = Cid::of_raw(b"A very important message.");
//! assert!(cid.to_string().starts_with('b'));
//! ```
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cbor::{self, EncodeError};

/// The length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// The length of the CID byte form: version, codec, multihash code, digest
/// size, digest.
pub const CID_LEN: usize = 4 + DIGEST_LEN;

/// The length of the CID text form: multibase prefix plus base32 characters.
pub const CID_STR_LEN: usize = 1 + (CID_LEN * 8).div_ceil(5);

const VERSION: u8 = 0x01;
const SHA2_256: u8 = 0x12;
const MULTIBASE_BASE32: u8 = b'b';

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Multicodec of the content a CID addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Codec {
    /// Deterministically encoded CBOR.
    DagCbor = 0x71,

    /// Opaque bytes.
    Raw = 0x55,
}

impl TryFrom<u8> for Codec {
    type Error = CidError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x71 => Ok(Codec::DagCbor),
            0x55 => Ok(Codec::Raw),
            other => Err(CidError::UnsupportedCodec(other)),
        }
    }
}

/// CIDv1 content identifier with a SHA-256 multihash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid {
    codec: Codec,
    digest: [u8; DIGEST_LEN],
}

impl Cid {
    /// Identify a value by the SHA-256 of its canonical CBOR encoding.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, EncodeError> {
        let bytes = cbor::to_canonical_vec(value)?;
        Ok(Self::of_cbor_bytes(&bytes))
    }

    /// Identify already canonically encoded CBOR bytes.
    pub fn of_cbor_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            codec: Codec::DagCbor,
            digest: Sha256::digest(bytes.as_ref()).into(),
        }
    }

    /// Identify an opaque data blob by its bytes.
    pub fn of_raw(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            codec: Codec::Raw,
            digest: Sha256::digest(bytes.as_ref()).into(),
        }
    }

    /// The multicodec of the addressed content.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The SHA-256 digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// The CID byte form.
    pub fn to_bytes(&self) -> [u8; CID_LEN] {
        let mut bytes = [0; CID_LEN];
        bytes[0] = VERSION;
        bytes[1] = self.codec as u8;
        bytes[2] = SHA2_256;
        bytes[3] = DIGEST_LEN as u8;
        bytes[4..].copy_from_slice(&self.digest);
        bytes
    }

    /// The CID text form as ASCII bytes.
    fn text(&self) -> [u8; CID_STR_LEN] {
        let mut text = [0; CID_STR_LEN];
        text[0] = MULTIBASE_BASE32;
        base32_encode(&self.to_bytes(), &mut text[1..]);
        text
    }

    /// Reconstruct a `Cid` from its byte form.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, CidError> {
        let checked: &[u8; CID_LEN] = bytes
            .try_into()
            .map_err(|_| CidError::InvalidLength(bytes.len(), CID_LEN))?;

        if checked[0] != VERSION {
            return Err(CidError::UnsupportedVersion(checked[0]));
        }
        if checked[2] != SHA2_256 || checked[3] != DIGEST_LEN as u8 {
            return Err(CidError::UnsupportedMultihash(checked[2]));
        }

        let mut digest = [0; DIGEST_LEN];
        digest.copy_from_slice(&checked[4..]);

        Ok(Self {
            codec: Codec::try_from(checked[1])?,
            digest,
        })
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some(encoded) = value.strip_prefix(MULTIBASE_BASE32 as char) else {
            return Err(CidError::InvalidMultibasePrefix);
        };

        let bytes = base32_decode(encoded.as_bytes())?;
        Self::try_from_bytes(&bytes)
    }
}

// The engine's total order over messages ties break on the string CID, so
// `Ord` compares the text form. Base32 digits sort after letters in the
// alphabet but before them in ASCII, which makes byte-form and text-form
// orderings disagree.
impl PartialOrd for Cid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text().cmp(&other.text())
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text();
        // The text form only ever holds multibase and base32 characters.
        f.write_str(std::str::from_utf8(&text).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cid").field(&self.to_string()).finish()
    }
}

impl Serialize for Cid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|err: CidError| serde::de::Error::custom(err.to_string()))
    }
}

/// RFC 4648 base32, lower-case, unpadded. `out` must hold exactly
/// `ceil(input.len() * 8 / 5)` bytes.
fn base32_encode(input: &[u8], out: &mut [u8]) {
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut pos = 0;

    for byte in input {
        acc = (acc << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out[pos] = BASE32_ALPHABET[((acc >> bits) & 0x1f) as usize];
            pos += 1;
        }
    }
    if bits > 0 {
        out[pos] = BASE32_ALPHABET[((acc << (5 - bits)) & 0x1f) as usize];
    }
}

fn base32_decode(input: &[u8]) -> Result<Vec<u8>, CidError> {
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut out = Vec::with_capacity(input.len() * 5 / 8);

    for char in input {
        let value = match char {
            b'a'..=b'z' => char - b'a',
            b'2'..=b'7' => char - b'2' + 26,
            other => return Err(CidError::InvalidBase32Character(*other as char)),
        };
        acc = (acc << 5) | u32::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }

    Ok(out)
}

/// Error types for the `Cid` struct.
#[derive(Debug, Error)]
pub enum CidError {
    /// CID byte form has an invalid length.
    #[error("invalid cid length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// CID text form does not start with the base32 multibase prefix.
    #[error("cid text form must start with multibase prefix 'b'")]
    InvalidMultibasePrefix,

    /// CID text form contains characters outside the base32 alphabet.
    #[error("invalid base32 character '{0}' in cid text form")]
    InvalidBase32Character(char),

    /// Only CIDv1 is supported.
    #[error("unsupported cid version {0}")]
    UnsupportedVersion(u8),

    /// Only dag-cbor and raw content is addressed.
    #[error("unsupported multicodec {0:#04x}")]
    UnsupportedCodec(u8),

    /// Only SHA-256 multihashes are supported.
    #[error("unsupported multihash {0:#04x}")]
    UnsupportedMultihash(u8),
}
