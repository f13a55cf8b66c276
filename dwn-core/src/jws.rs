// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message authorization blocks.
//!
//! The authorization of a DWN message is a general JWS: a base64url payload
//! carrying the CIDs the signer commits to, plus one signature entry per
//! signer. The signing input follows RFC 7515, `<protected>.<payload>` in
//! ASCII, with an ed25519 signature and a `kid` pointing into the signer's
//! DID document.
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cid::Cid;
use crate::did::{Did, DidResolver, ResolverError};
use crate::identity::{PrivateKey, Signature};

/// The claims a signature commits to.
///
/// `descriptor_cid` is always present. Records messages additionally commit
/// to their record identity; permission messages to the grant they cite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
    pub descriptor_cid: Cid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_cid: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_cid: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions_grant_id: Option<Cid>,
}

impl AuthorizationPayload {
    pub fn new(descriptor_cid: Cid) -> Self {
        Self {
            descriptor_cid,
            record_id: None,
            context_id: None,
            attestation_cid: None,
            encryption_cid: None,
            permissions_grant_id: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    kid: String,
}

/// One signer's entry in a general JWS.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JwsSignature {
    /// base64url-encoded JSON of `{alg, kid}`.
    pub protected: String,

    /// base64url-encoded ed25519 signature over `<protected>.<payload>`.
    pub signature: String,
}

/// General JWS over an [`AuthorizationPayload`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jws {
    /// base64url-encoded JSON of the payload.
    pub payload: String,

    pub signatures: Vec<JwsSignature>,
}

impl Jws {
    /// Sign a payload with a single key.
    pub fn sign(
        payload: &AuthorizationPayload,
        kid: &str,
        key: &PrivateKey,
    ) -> Result<Self, JwsError> {
        let payload_json =
            serde_json::to_vec(payload).map_err(|err| JwsError::Encoding(err.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(payload_json);

        let header = ProtectedHeader {
            alg: "EdDSA".to_string(),
            kid: kid.to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|err| JwsError::Encoding(err.to_string()))?;
        let protected = URL_SAFE_NO_PAD.encode(header_json);

        let signing_input = format!("{protected}.{payload}");
        let signature = key.sign(signing_input.as_bytes());

        Ok(Self {
            payload,
            signatures: vec![JwsSignature {
                protected,
                signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
            }],
        })
    }

    /// Decode the payload without verifying any signature.
    pub fn decode_payload(&self) -> Result<AuthorizationPayload, JwsError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.payload)
            .map_err(|err| JwsError::Encoding(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| JwsError::Encoding(err.to_string()))
    }

    /// The DIDs referenced by the signature entries, without verification.
    ///
    /// The first entry is the claimed author of the message.
    pub fn signer_dids(&self) -> Result<Vec<Did>, JwsError> {
        if self.signatures.is_empty() {
            return Err(JwsError::MissingSignature);
        }

        self.signatures
            .iter()
            .map(|entry| Ok(did_of_kid(&decode_protected(entry)?.kid)?))
            .collect()
    }

    /// Verify every signature entry against the resolved DID documents and
    /// return the signer DIDs in entry order.
    pub async fn verify<R: DidResolver>(&self, resolver: &R) -> Result<Vec<Did>, JwsError> {
        if self.signatures.is_empty() {
            return Err(JwsError::MissingSignature);
        }

        let mut signers = Vec::with_capacity(self.signatures.len());
        for entry in &self.signatures {
            let header = decode_protected(entry)?;
            if header.alg != "EdDSA" {
                return Err(JwsError::UnsupportedAlgorithm(header.alg));
            }

            let did = did_of_kid(&header.kid)?;
            let document = resolver.resolve(&did).await?;
            let method = document
                .verification_method(&header.kid)
                .ok_or_else(|| JwsError::UnknownKeyId(header.kid.clone()))?;

            let signature_bytes = URL_SAFE_NO_PAD
                .decode(&entry.signature)
                .map_err(|err| JwsError::Encoding(err.to_string()))?;
            let signature = Signature::from_bytes(&signature_bytes)
                .map_err(|err| JwsError::Encoding(err.to_string()))?;

            let signing_input = format!("{}.{}", entry.protected, self.payload);
            if !method
                .public_key
                .verify(signing_input.as_bytes(), &signature)
            {
                return Err(JwsError::InvalidSignature(header.kid));
            }

            signers.push(did);
        }

        Ok(signers)
    }
}

fn decode_protected(entry: &JwsSignature) -> Result<ProtectedHeader, JwsError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(&entry.protected)
        .map_err(|err| JwsError::Encoding(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| JwsError::Encoding(err.to_string()))
}

fn did_of_kid(kid: &str) -> Result<Did, JwsError> {
    let (did, fragment) = kid
        .split_once('#')
        .ok_or_else(|| JwsError::MalformedKeyId(kid.to_string()))?;
    if did.is_empty() || fragment.is_empty() {
        return Err(JwsError::MalformedKeyId(kid.to_string()));
    }
    Ok(Did::new(did))
}

/// Error types for JWS construction and verification.
#[derive(Debug, Error)]
pub enum JwsError {
    /// The JWS carries no signature entries.
    #[error("GeneralJwsVerifierMissingSignature: authorization carries no signature entries")]
    MissingSignature,

    /// A signature does not verify against the resolved key.
    #[error("GeneralJwsVerifierInvalidSignature: signature of {0} does not verify")]
    InvalidSignature(String),

    /// Only EdDSA signatures are supported.
    #[error("unsupported signature algorithm \"{0}\"")]
    UnsupportedAlgorithm(String),

    /// The `kid` is not of the form `<did>#<fragment>`.
    #[error("malformed key id \"{0}\"")]
    MalformedKeyId(String),

    /// The resolved DID document carries no matching verification method.
    #[error("no verification method \"{0}\" in resolved did document")]
    UnknownKeyId(String),

    /// The signer's DID could not be resolved.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// A segment is not valid base64url or JSON.
    #[error("malformed jws segment: {0}")]
    Encoding(String),
}
