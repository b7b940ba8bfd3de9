use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::{crypto_err, GeneratedKey};
use crate::jose::{b64_decode, b64_encode, PublicJwk};
use crate::CustodyResult;

pub(super) const CURVE: &str = "P-256";
const COORDINATE_LEN: usize = 32;

pub(super) fn generate() -> CustodyResult<GeneratedKey> {
    let secret = SecretKey::random(&mut OsRng);
    let private_pkcs8 = secret.to_pkcs8_der().map_err(crypto_err)?;
    let public_spki = secret
        .public_key()
        .to_public_key_der()
        .map_err(crypto_err)?;

    Ok(GeneratedKey {
        private_pkcs8: Zeroizing::new(private_pkcs8.as_bytes().to_vec()),
        public_spki: public_spki.as_bytes().to_vec(),
    })
}

pub(super) fn public_jwk(public_spki: &[u8]) -> CustodyResult<PublicJwk> {
    let public = PublicKey::from_public_key_der(public_spki).map_err(crypto_err)?;
    let point = public.to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        return Err(crypto_err("public key is the identity point"));
    };

    Ok(PublicJwk::Ec {
        crv: CURVE.to_string(),
        x: b64_encode(x),
        y: b64_encode(y),
    })
}

pub(super) fn sign(private_pkcs8: &[u8], data: &[u8]) -> CustodyResult<Vec<u8>> {
    let key = SigningKey::from_pkcs8_der(private_pkcs8).map_err(crypto_err)?;
    let signature: Signature = key.try_sign(data).map_err(crypto_err)?;
    Ok(signature.to_bytes().to_vec())
}

pub(super) fn verify(
    crv: &str,
    x: &str,
    y: &str,
    data: &[u8],
    signature: &[u8],
) -> CustodyResult<()> {
    if crv != CURVE {
        return Err(crypto_err(format!("unsupported curve {crv}")));
    }
    let x = b64_decode(x)?;
    let y = b64_decode(y)?;
    if x.len() != COORDINATE_LEN || y.len() != COORDINATE_LEN {
        return Err(crypto_err("coordinate length mismatch"));
    }

    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(&x),
        FieldBytes::from_slice(&y),
        false,
    );
    let key = VerifyingKey::from_encoded_point(&point).map_err(crypto_err)?;
    let signature = Signature::from_slice(signature).map_err(crypto_err)?;
    key.verify(data, &signature).map_err(crypto_err)
}
