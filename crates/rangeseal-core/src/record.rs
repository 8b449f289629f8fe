//! Record model: plaintext records, encrypted documents and field names

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Layout of the Time field plaintext (RFC 1123, UTC)
pub const TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Length of a document identifier in bytes (96 bits)
pub const DOCUMENT_ID_LEN: usize = 12;

/// A time- and location-tagged record, as handed to the owner for insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "UserId")]
    pub user_id: String,
    #[serde(rename = "Location")]
    pub location: String,
    /// Access-policy label and index partition name
    #[serde(rename = "Set")]
    pub set: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

impl Record {
    pub fn new(
        user_id: impl Into<String>,
        location: impl Into<String>,
        set: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            location: location.into(),
            set: set.into(),
            time,
        }
    }

    /// Timestamp as unsigned Unix seconds, the coordinate used by the index
    pub fn unix_seconds(&self) -> Result<u64> {
        unix_seconds(&self.time)
    }

    /// Plaintext of one field as it is encrypted
    pub fn field_plaintext(&self, field: Field) -> String {
        match field {
            Field::UserId => self.user_id.clone(),
            Field::Location => self.location.clone(),
            Field::Set => self.set.clone(),
            Field::Time => self.time.format(TIME_FORMAT).to_string(),
        }
    }

    /// Value that keys the index for a dimension
    pub fn dimension_value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::A => &self.user_id,
            Dimension::B => &self.location,
        }
    }
}

/// Unsigned Unix seconds of a timestamp; pre-epoch times are rejected
pub fn unix_seconds(time: &DateTime<Utc>) -> Result<u64> {
    let secs = time.timestamp();
    u64::try_from(secs).map_err(|_| Error::InvalidTimestamp(secs))
}

/// Parse a decrypted Time field back into a timestamp
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| Error::InvalidTime(format!("{:?}: {}", text, e)))
}

/// Encrypted field names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    UserId,
    Location,
    Set,
    Time,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::UserId, Field::Location, Field::Set, Field::Time];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::UserId => "UserId",
            Field::Location => "Location",
            Field::Set => "Set",
            Field::Time => "Time",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

/// Indexed dimension
///
/// The two dimensions are independent 1-D indexes over time:
/// - A: keyed by UserId
/// - B: keyed by Location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    A,
    B,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::A, Dimension::B];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::A => write!(f, "A"),
            Dimension::B => write!(f, "B"),
        }
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(Dimension::A),
            "B" | "b" => Ok(Dimension::B),
            _ => Err(Error::UnknownDimension(s.to_string())),
        }
    }
}

/// Opaque 96-bit document identifier, generated at insert time
///
/// Serialized as 24 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub [u8; DOCUMENT_ID_LEN]);

impl DocumentId {
    pub fn random() -> Self {
        let mut bytes = [0u8; DOCUMENT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DOCUMENT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.to_hex())
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidDocumentId(e.to_string()))?;
        let bytes: [u8; DOCUMENT_ID_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidDocumentId(format!("expected {} bytes", DOCUMENT_ID_LEN)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for DocumentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A stored document: one attribute-based ciphertext per field, all under
/// the same policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDocument {
    pub id: DocumentId,
    pub fields: BTreeMap<Field, Vec<u8>>,
}

impl EncryptedDocument {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: Field, ciphertext: Vec<u8>) {
        self.fields.insert(field, ciphertext);
    }

    pub fn field(&self, field: Field) -> Option<&[u8]> {
        self.fields.get(&field).map(Vec::as_slice)
    }

    /// Copy restricted to the given fields
    pub fn project(&self, fields: &[Field]) -> Self {
        Self {
            id: self.id,
            fields: self
                .fields
                .iter()
                .filter(|(f, _)| fields.contains(f))
                .map(|(f, c)| (*f, c.clone()))
                .collect(),
        }
    }

    /// Opaque ciphertext blob as shipped to the store
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(blob)?)
    }
}

/// Requested fields of one matched document, decrypted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedRecord {
    pub fields: BTreeMap<Field, String>,
}

impl DecryptedRecord {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(Field::UserId)
    }

    pub fn set(&self) -> Option<&str> {
        self.get(Field::Set)
    }
}

/// Opaque token blob: an update tag or a search trapdoor
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(#[serde(with = "crate::hex_serde::bytes")] pub Vec<u8>);

impl Token {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({} bytes)", self.0.len())
    }
}
