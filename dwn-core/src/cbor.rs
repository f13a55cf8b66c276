// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic CBOR encoding.
//!
//! Message identity in a DWN is the hash of a canonical encoding: map keys
//! are sorted bytewise by their own encoded form and no indefinite-length
//! items are emitted. Two values which are equal under serde therefore
//! always produce the same bytes, regardless of the field or insertion
//! order they were built with.
use ciborium::Value;
use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Encode any serializable value into canonical CBOR bytes.
pub fn to_canonical_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut value = Value::serialized(value).map_err(|err| EncodeError::Value(err.to_string()))?;
    canonicalize(&mut value)?;

    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&value, &mut bytes).map_err(Into::<EncodeError>::into)?;
    Ok(bytes)
}

/// Decode a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let value = ciborium::from_reader::<T, _>(bytes).map_err(Into::<DecodeError>::into)?;
    Ok(value)
}

/// Recursively sort all map entries by the encoded form of their keys.
fn canonicalize(value: &mut Value) -> Result<(), EncodeError> {
    match value {
        Value::Map(entries) => {
            let mut tagged = Vec::with_capacity(entries.len());
            for (mut key, mut entry) in entries.drain(..) {
                canonicalize(&mut key)?;
                canonicalize(&mut entry)?;

                let mut key_bytes = Vec::new();
                ciborium::ser::into_writer(&key, &mut key_bytes)
                    .map_err(Into::<EncodeError>::into)?;
                tagged.push((key_bytes, key, entry));
            }
            tagged.sort_by(|(a, _, _), (b, _, _)| a.cmp(b));
            entries.extend(tagged.into_iter().map(|(_, key, entry)| (key, entry)));
        }
        Value::Array(entries) => {
            for entry in entries.iter_mut() {
                canonicalize(entry)?;
            }
        }
        Value::Tag(_, inner) => canonicalize(inner.as_mut())?,
        _ => (),
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum EncodeError {
    /// An error occurred while writing bytes.
    ///
    /// Contains the underlying error returned while writing.
    #[error("an error occurred while writing bytes: {0}")]
    Io(std::io::Error),

    /// An error indicating a value that cannot be serialized.
    ///
    /// Contains a description of the problem delivered from serde.
    #[error("an error occurred while serializing value: {0}")]
    Value(String),
}

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => EncodeError::Io(err),
            SerializeError::Value(err) => EncodeError::Value(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// An error occurred while reading bytes.
    ///
    /// Contains the underlying error returned while reading.
    #[error("an error occurred while reading bytes: {0}")]
    Io(std::io::Error),

    /// An error occurred while parsing bytes.
    ///
    /// Contains the offset into the stream where the syntax error occurred.
    #[error("an error occurred while parsing bytes at position {0}")]
    Syntax(usize),

    /// An error occurred while processing a parsed value.
    ///
    /// Contains a description of the error that occurred and (optionally) the
    /// offset into the stream indicating the start of the item being
    /// processed when the error occurred.
    #[error("an error occurred while processing a parsed value at position {0:?}: {1}")]
    Semantic(Option<usize>, String),

    /// The input caused serde to recurse too much.
    ///
    /// This error prevents a stack overflow.
    #[error("recursion limit exceeded while decoding")]
    RecursionLimitExceeded,
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) => DecodeError::Io(err),
            DeserializeError::Syntax(offset) => DecodeError::Syntax(offset),
            DeserializeError::Semantic(offset, description) => {
                DecodeError::Semantic(offset, description)
            }
            DeserializeError::RecursionLimitExceeded => DecodeError::RecursionLimitExceeded,
        }
    }
}
