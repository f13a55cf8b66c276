// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signature-chain verification.
use dwn_core::{Did, DidResolver, JwsError, Message};
use serde::Serialize;

use crate::error::ProcessError;

/// Verify every signature of a message and check that the signed payload
/// commits to the envelope it travels in. Returns the author, the DID
/// behind the first signature.
pub(crate) async fn authenticate<D: Serialize, R: DidResolver>(
    message: &Message<D>,
    resolver: &R,
) -> Result<Did, ProcessError> {
    let signers = message
        .authorization
        .verify(resolver)
        .await
        .map_err(jws_error)?;

    let payload = message.authorization.decode_payload().map_err(jws_error)?;

    let descriptor_cid = message
        .descriptor_cid()
        .map_err(|err| ProcessError::bad_request("AuthenticateDescriptorCidFailed", err.to_string()))?;
    if payload.descriptor_cid != descriptor_cid {
        return Err(ProcessError::bad_request(
            "AuthenticateDescriptorCidMismatch",
            "signed payload does not commit to the carried descriptor",
        ));
    }

    if payload.record_id != message.record_id {
        return Err(ProcessError::bad_request(
            "AuthenticateRecordIdMismatch",
            "signed payload does not commit to the carried recordId",
        ));
    }

    if payload.context_id != message.context_id {
        return Err(ProcessError::bad_request(
            "AuthenticateContextIdMismatch",
            "signed payload does not commit to the carried contextId",
        ));
    }

    Ok(signers
        .into_iter()
        .next()
        .expect("verify errors on empty signatures"))
}

fn jws_error(err: JwsError) -> ProcessError {
    match err {
        JwsError::MissingSignature
        | JwsError::InvalidSignature(_)
        | JwsError::UnsupportedAlgorithm(_)
        | JwsError::UnknownKeyId(_)
        | JwsError::Resolver(_) => {
            ProcessError::unauthorized("AuthenticateSignatureInvalid", err.to_string())
        }
        JwsError::MalformedKeyId(_) | JwsError::Encoding(_) => {
            ProcessError::bad_request("AuthenticateMalformedAuthorization", err.to_string())
        }
    }
}
