//! Serde helpers that render binary fields as hex strings in JSON

use serde::{self, Deserialize, Deserializer, Serializer};

/// `#[serde(with = "hex_serde::bytes")]` for `Vec<u8>`
pub mod bytes {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "hex_serde::array32")]` for `[u8; 32]`
pub mod array32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "super::bytes")]
        data: Vec<u8>,
        #[serde(with = "super::array32")]
        key: [u8; 32],
    }

    #[test]
    fn test_hex_rendering() {
        let blob = Blob {
            data: vec![0xde, 0xad],
            key: [0x11; 32],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.contains("\"dead\""));
        assert!(json.contains(&"11".repeat(32)));

        let parsed: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let json = r#"{"data":"00","key":"abcd"}"#;
        assert!(serde_json::from_str::<Blob>(json).is_err());
    }
}
