//! rangeseal-core: Shared types for range-searchable encrypted records
//!
//! This crate defines what both sides of the protocol agree on:
//! - Range-cover codec: timestamps and time ranges as dyadic trie labels
//! - Record model: plaintext records, encrypted documents, field names
//! - Structured index token formats: update tags and search trapdoors
//! - Remote store wire messages and the [`RemoteStore`] capability
//!
//! No secret key material lives here. The owner crate mints tokens and
//! ciphertexts; the store crate only matches and returns them.
//!
//! # Privacy & Threat Model
//!
//! ## Adversary Model
//!
//! - **Store model**: Single store, honest-but-curious
//! - **Security goal**: Field confidentiality under per-record access
//!   policies, and keyword/range confidentiality of queries
//! - **Non-goals**: Network confidentiality (left to the transport),
//!   multi-dimensional range queries
//!
//! ## What the Store Learns
//!
//! | Information | Store Knowledge |
//! |-------------|-----------------|
//! | Field plaintexts | NO - attribute-based ciphertexts |
//! | Indexed keywords (user, location, time) | NO - keyed HMAC addresses |
//! | Query range endpoints | NO - only the dyadic label set size |
//! | Which documents matched a query | YES - result set |
//! | Repeated queries for the same label | YES - same trapdoor bytes |
//!
//! A range `[a, b]` is sent as at most `2 * 64` trapdoors, one per dyadic
//! node of the minimal cover, so the store sees a logarithmic-size
//! structural commitment to the range rather than its endpoints.

mod error;
pub mod hex_serde;
pub mod index;
mod label;
mod record;
mod store;
pub mod wire;

pub use error::{Error, RemoteError};
pub use index::{IndexOp, IndexToken, SearchTrapdoor, UpdateTag};
pub use label::{insertion_labels, range_cover, IndexLabel, LEVELS};
pub use record::{
    parse_time, unix_seconds, DecryptedRecord, Dimension, DocumentId, EncryptedDocument, Field,
    Record, Token, DOCUMENT_ID_LEN, TIME_FORMAT,
};
pub use store::RemoteStore;

pub type Result<T> = std::result::Result<T, Error>;
