//! JOSE data shapes shared by the providers and the signing adapters.
//!
//! Only the parts needed at the custody boundary are modelled here: JWS
//! algorithm names, public JWKs, and the compact serialization used for
//! attestations, proof-of-possession JWTs and key-binding JWTs.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::{CustodyError, CustodyResult, KeyType};

/// JWS `alg` values (RFC 7518 and RFC 8037).
///
/// Only the ECDSA and RSA-PSS families can be produced by this crate; the other
/// values exist so that foreign algorithm names parse and are rejected with a
/// precise error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[allow(clippy::upper_case_acronyms)]
pub enum JwsAlgorithm {
    /// HMAC using SHA-256.
    HS256,
    /// HMAC using SHA-384.
    HS384,
    /// HMAC using SHA-512.
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256.
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512.
    RS512,
    /// ECDSA using P-256 and SHA-256.
    ES256,
    /// ECDSA using P-384 and SHA-384.
    ES384,
    /// ECDSA using P-521 and SHA-512.
    ES512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256.
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384.
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512.
    PS512,
    /// ECDSA using secp256k1 and SHA-256.
    ES256K,
    /// Edwards-curve signatures.
    EdDSA,
}

/// A public JSON Web Key. Unknown members (`kid`, `use`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum PublicJwk {
    /// Elliptic curve public key.
    #[serde(rename = "EC")]
    Ec {
        /// Curve name, `P-256` for keys produced here.
        crv: String,
        /// Base64url x coordinate.
        x: String,
        /// Base64url y coordinate.
        y: String,
    },
    /// RSA public key.
    #[serde(rename = "RSA")]
    Rsa {
        /// Base64url modulus.
        n: String,
        /// Base64url public exponent.
        e: String,
    },
}

impl PublicJwk {
    /// The key family of this JWK.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Ec { .. } => KeyType::Ec,
            Self::Rsa { .. } => KeyType::Rsa,
        }
    }
}

/// Protected header of a JWS produced by the signing adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signing algorithm.
    pub alg: JwsAlgorithm,
    /// Media type of the complete JWS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Public key the JWS is bound to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<PublicJwk>,
}

impl JwsHeader {
    /// A header carrying only the algorithm.
    #[must_use]
    pub const fn new(alg: JwsAlgorithm) -> Self {
        Self {
            alg,
            typ: None,
            kid: None,
            jwk: None,
        }
    }

    /// Sets the `typ` member.
    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    /// Sets the `jwk` member.
    #[must_use]
    pub fn with_jwk(mut self, jwk: PublicJwk) -> Self {
        self.jwk = Some(jwk);
        self
    }
}

/// The three segments of a compact JWS, decoded.
#[derive(Debug, Clone)]
pub struct CompactJws {
    /// Decoded protected header.
    pub header: Value,
    /// Decoded payload (JSON).
    pub payload: Value,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
    signing_input: String,
}

impl CompactJws {
    /// Splits and decodes a compact JWS. The signature is not verified.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidAttestation`] if the token does not have
    /// three base64url segments with JSON header and payload.
    pub fn parse(token: &str) -> CustodyResult<Self> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected three dot-separated segments"));
        };

        let header_json: Value = serde_json::from_slice(&b64_decode(header)?)
            .map_err(|e| invalid(&format!("header is not JSON: {e}")))?;
        let payload_json: Value = serde_json::from_slice(&b64_decode(payload)?)
            .map_err(|e| invalid(&format!("payload is not JSON: {e}")))?;

        Ok(Self {
            header: header_json,
            payload: payload_json,
            signature: b64_decode(signature)?,
            signing_input: format!("{header}.{payload}"),
        })
    }

    /// The bytes covered by the signature (`header.payload`).
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }
}

/// Extracts the public key bound by a key attestation.
///
/// The key is read from the `cnf.jwk` claim, or from the first element of
/// `attested_keys` when the attestation covers a key set.
///
/// # Errors
///
/// Returns [`CustodyError::InvalidAttestation`] if the attestation is not a
/// compact JWS or neither claim holds a supported JWK.
pub fn attested_public_jwk(attestation: &str) -> CustodyResult<PublicJwk> {
    let jws = CompactJws::parse(attestation)?;
    let jwk = jws
        .payload
        .pointer("/cnf/jwk")
        .or_else(|| jws.payload.pointer("/attested_keys/0"))
        .ok_or_else(|| invalid("no cnf.jwk or attested_keys claim"))?;

    serde_json::from_value(jwk.clone())
        .map_err(|e| invalid(&format!("unsupported JWK: {e}")))
}

/// Base64url (no padding) encodes `bytes`.
#[must_use]
pub fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url (no padding).
///
/// # Errors
///
/// Returns [`CustodyError::SerializationError`] on malformed input.
pub fn b64_decode(encoded: &str) -> CustodyResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CustodyError::SerializationError {
            error: format!("invalid base64url: {e}"),
        })
}

/// Serializes `value` as JSON and base64url encodes it, as used for JWS
/// header and payload segments.
///
/// # Errors
///
/// Returns [`CustodyError::SerializationError`] if `value` cannot be
/// serialized.
pub fn encode_segment<T: Serialize + ?Sized>(value: &T) -> CustodyResult<String> {
    Ok(b64_encode(serde_json::to_vec(value)?))
}

fn invalid(reason: &str) -> CustodyError {
    CustodyError::InvalidAttestation {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    fn token(payload: &Value) -> String {
        format!(
            "{}.{}.{}",
            encode_segment(&json!({"alg": "ES256", "typ": "key-attestation+jwt"})).unwrap(),
            encode_segment(payload).unwrap(),
            b64_encode([1u8, 2, 3]),
        )
    }

    #[test]
    fn test_attested_jwk_from_cnf_claim() {
        let attestation = token(&json!({
            "iss": "https://wallet-provider.example",
            "cnf": {"jwk": {"kty": "EC", "crv": "P-256", "x": "eA", "y": "eQ", "kid": "ignored"}}
        }));

        let jwk = attested_public_jwk(&attestation).expect("jwk");
        assert_eq!(
            jwk,
            PublicJwk::Ec {
                crv: "P-256".to_string(),
                x: "eA".to_string(),
                y: "eQ".to_string(),
            }
        );
        assert_eq!(jwk.key_type(), KeyType::Ec);
    }

    #[test]
    fn test_attested_jwk_from_attested_keys_claim() {
        let attestation = token(&json!({
            "attested_keys": [{"kty": "RSA", "n": "bg", "e": "AQAB"}]
        }));

        let jwk = attested_public_jwk(&attestation).expect("jwk");
        assert_eq!(jwk.key_type(), KeyType::Rsa);
    }

    #[test]
    fn test_attestation_without_key_is_rejected() {
        let attestation = token(&json!({"iss": "x"}));
        match attested_public_jwk(&attestation) {
            Err(CustodyError::InvalidAttestation { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_compact_jws_is_rejected() {
        for bad in ["", "a.b", "a.b.c.d", "!!!.e30.AA"] {
            assert!(CompactJws::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_signing_input_is_first_two_segments() {
        let attestation = token(&json!({"iss": "x"}));
        let jws = CompactJws::parse(&attestation).unwrap();
        let expected = attestation.rsplit_once('.').unwrap().0;
        assert_eq!(jws.signing_input(), expected.as_bytes());
        assert_eq!(jws.signature, vec![1, 2, 3]);
    }

    #[test]
    fn test_header_skips_absent_members() {
        let header = JwsHeader::new(JwsAlgorithm::PS256).with_typ("kb+jwt");
        let value = serde_json::to_value(&header).unwrap();
        assert_eq!(value, json!({"alg": "PS256", "typ": "kb+jwt"}));
    }

    #[test]
    fn test_algorithm_names_round_trip_through_strings() {
        assert_eq!(JwsAlgorithm::from_str("ES384").unwrap(), JwsAlgorithm::ES384);
        assert_eq!(JwsAlgorithm::EdDSA.to_string(), "EdDSA");
        assert!(JwsAlgorithm::from_str("none").is_err());
    }
}
