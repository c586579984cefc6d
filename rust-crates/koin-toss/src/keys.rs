use anyhow::{
    Result,
    anyhow,
};
use fuels::{
    crypto::{
        Message,
        PublicKey,
        SecretKey,
        Signature,
    },
    types::Address,
};
use rand::{
    CryptoRng,
    Rng,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de::Error,
};
use std::fmt;

use crate::encoding::{
    parse_hex32,
    to_hex,
};

/// Raw secp256k1 secret used for owner and session signatures.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn generate<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let bytes: [u8; 32] = rng.r#gen();
            if SecretKey::try_from(bytes.as_slice()).is_ok() {
                return Self(bytes);
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        SecretKey::try_from(bytes.as_slice())
            .map_err(|err| anyhow!("invalid secp256k1 secret key: {err:?}"))?;
        Ok(Self(bytes))
    }

    pub fn from_secret(secret: &SecretKey) -> Self {
        Self(**secret)
    }

    pub fn secret(&self) -> Result<SecretKey> {
        SecretKey::try_from(self.0.as_slice())
            .map_err(|err| anyhow!("invalid secp256k1 secret key: {err:?}"))
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from(&self.secret()?))
    }

    pub fn address(&self) -> Result<Address> {
        Ok(address_of(&self.public_key()?))
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Signature> {
        let message = Message::new(payload);
        Ok(Signature::sign(&self.secret()?, &message))
    }

    pub fn expose_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

pub fn address_of(public_key: &PublicKey) -> Address {
    Address::new(*public_key.hash())
}

pub fn verify(public_key: &PublicKey, payload: &[u8], signature: &Signature) -> bool {
    signature.verify(public_key, &Message::new(payload)).is_ok()
}

pub fn signature_hex(signature: &Signature) -> String {
    to_hex(**signature)
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl Serialize for SigningKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(self.0))
    }
}

impl<'de> Deserialize<'de> for SigningKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = parse_hex32(&raw).map_err(D::Error::custom)?;
        SigningKey::from_bytes(bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn sign__produces_signature_verifiable_with_public_key() {
        // given
        let key = SigningKey::generate(&mut rand::thread_rng());
        let payload = b"koin toss wager";

        // when
        let signature = key.sign(payload).unwrap();

        // then
        let public = key.public_key().unwrap();
        assert!(verify(&public, payload, &signature));
        assert!(!verify(&public, b"another payload", &signature));
    }

    #[test]
    fn debug__does_not_leak_key_material() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let rendered = format!("{key:?}");
        assert_eq!(rendered, "SigningKey(..)");
    }

    #[test]
    fn serde__round_trips_through_hex() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let json = serde_json::to_string(&key).unwrap();
        let decoded: SigningKey = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.address().unwrap(), key.address().unwrap());
    }
}
