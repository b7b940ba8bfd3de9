use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{crypto_err, GeneratedKey};
use crate::jose::{b64_decode, b64_encode, PublicJwk};
use crate::{CustodyError, CustodyResult};

const MIN_MODULUS_BITS: u32 = 2048;

pub(super) fn generate(modulus_bits: u32, public_exponent: u64) -> CustodyResult<GeneratedKey> {
    if modulus_bits < MIN_MODULUS_BITS {
        return Err(CustodyError::InvalidInput {
            attribute: "modulus_bits".to_string(),
            reason: format!("must be at least {MIN_MODULUS_BITS}"),
        });
    }
    let bits = usize::try_from(modulus_bits).map_err(crypto_err)?;
    let exponent = BigUint::from(public_exponent);

    let private =
        RsaPrivateKey::new_with_exp(&mut OsRng, bits, &exponent).map_err(crypto_err)?;
    let private_pkcs8 = private.to_pkcs8_der().map_err(crypto_err)?;
    let public_spki = private
        .to_public_key()
        .to_public_key_der()
        .map_err(crypto_err)?;

    Ok(GeneratedKey {
        private_pkcs8: Zeroizing::new(private_pkcs8.as_bytes().to_vec()),
        public_spki: public_spki.as_bytes().to_vec(),
    })
}

pub(super) fn public_jwk(public_spki: &[u8]) -> CustodyResult<PublicJwk> {
    let public = RsaPublicKey::from_public_key_der(public_spki).map_err(crypto_err)?;
    Ok(PublicJwk::Rsa {
        n: b64_encode(public.n().to_bytes_be()),
        e: b64_encode(public.e().to_bytes_be()),
    })
}

pub(super) fn sign(private_pkcs8: &[u8], data: &[u8]) -> CustodyResult<Vec<u8>> {
    let private = RsaPrivateKey::from_pkcs8_der(private_pkcs8).map_err(crypto_err)?;
    let key = SigningKey::<Sha256>::new(private);
    let signature = key
        .try_sign_with_rng(&mut OsRng, data)
        .map_err(crypto_err)?;
    Ok(signature.to_vec())
}

pub(super) fn verify(n: &str, e: &str, data: &[u8], signature: &[u8]) -> CustodyResult<()> {
    let public = RsaPublicKey::new(
        BigUint::from_bytes_be(&b64_decode(n)?),
        BigUint::from_bytes_be(&b64_decode(e)?),
    )
    .map_err(crypto_err)?;
    let key = VerifyingKey::<Sha256>::new(public);
    let signature = Signature::try_from(signature).map_err(crypto_err)?;
    key.verify(data, &signature).map_err(crypto_err)
}
