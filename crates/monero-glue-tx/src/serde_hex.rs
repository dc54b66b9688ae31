//! Hex string (de)serialization for keys and blobs.

use serde::{Deserialize, Deserializer, Serializer};

use monero_glue_crypto::Key;

fn key_from_hex<E: serde::de::Error>(s: &str) -> Result<Key, E> {
    let bytes = hex::decode(s).map_err(E::custom)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| E::custom(format!("expected 32 bytes, got {}", v.len())))
}

pub mod key {
    use super::*;

    pub fn serialize<S: Serializer>(key: &Key, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Key, D::Error> {
        let s = String::deserialize(d)?;
        key_from_hex(&s)
    }
}

pub mod keys {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(keys: &[Key], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&hex::encode(key))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Key>, D::Error> {
        let strings = Vec::<String>::deserialize(d)?;
        strings.iter().map(|s| key_from_hex(s)).collect()
    }
}

pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
