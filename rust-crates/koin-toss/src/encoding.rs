//! Hex encodings shared by the persisted session format and the gateway DTOs.
use anyhow::{
    Context,
    Result,
    anyhow,
};
use fuels::{
    crypto::Signature,
    types::{
        Address,
        Bytes32,
        ContractId,
    },
};
use std::ops::Deref;

pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_hex_array<const N: usize>(raw: &str) -> Result<[u8; N]> {
    let trimmed = raw.trim();
    let cleaned = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(cleaned).with_context(|| format!("invalid hex '{raw}'"))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow!("expected {N} bytes, got {}", bytes.len()))
}

pub fn parse_hex32(raw: &str) -> Result<[u8; 32]> {
    parse_hex_array(raw)
}

pub fn parse_signature(raw: &str) -> Result<Signature> {
    Ok(Signature::from_bytes(parse_hex_array::<64>(raw)?))
}

pub fn address_hex(address: &Address) -> String {
    to_hex(**address)
}

pub fn parse_address(raw: &str) -> Result<Address> {
    Ok(Address::new(parse_hex32(raw)?))
}

pub fn parse_bytes32(raw: &str) -> Result<Bytes32> {
    Ok(Bytes32::new(parse_hex32(raw)?))
}

pub fn parse_contract_id(raw: &str) -> Result<ContractId> {
    Ok(ContractId::new(parse_hex32(raw)?))
}

/// Short `0x1234…abcd` form for status lines.
pub fn short_hex(bytes: impl AsRef<[u8]>) -> String {
    let full = hex::encode(bytes);
    if full.len() <= 12 {
        return format!("0x{full}");
    }
    format!("0x{}…{}", &full[..6], &full[full.len() - 4..])
}

/// Serde adapter for 32-byte fuel types (`Address`, `ContractId`, `Bytes32`).
pub mod hex32 {
    use super::*;
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error,
    };

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Deref<Target = [u8; 32]>,
        S: Serializer,
    {
        serializer.serialize_str(&to_hex(**value))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: From<[u8; 32]>,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_hex32(&raw).map(T::from).map_err(D::Error::custom)
    }
}
