//! rangeseal-owner: Data owner and delegated searcher
//!
//! Holds every secret in the system:
//! - Covercrypt master key pair ([`KeyStore`]) used by [`PolicyCipher`]
//! - Index secret and counters ([`StructuredIndexClient`])
//!
//! [`Owner`] inserts record batches and runs range queries; it can hand a
//! [`DelegatedCredential`] for one partition to a [`Searcher`].
//!
//! ## Example
//!
//! ```ignore
//! use rangeseal_owner::{Owner, OwnerConfig};
//! use rangeseal_core::{Dimension, Record};
//!
//! let owner = Owner::open(OwnerConfig::new("./owner", vec!["grpA".into()]))?;
//! owner.insert(&[Record::new("u1", "loc1", "grpA", now)]).await?;
//! let hits = owner.find_user_ids("grpA", Dimension::B, "loc1", from, to).await?;
//! ```

pub mod abe;
pub mod cipher;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod index;
pub mod keystore;
pub mod owner;
pub mod query;
pub mod searcher;

pub use cipher::{PolicyCipher, MAX_LABEL_LEN, MAX_POLICY_DEPTH};
pub use config::{OwnerConfig, SearcherConfig};
pub use credential::DelegatedCredential;
pub use error::{DocumentError, OwnerError, Result};
pub use http::HttpStore;
pub use index::{PartitionKey, StructuredIndexClient};
pub use keystore::KeyStore;
pub use owner::Owner;
pub use query::{DocumentResult, RangeQuery, TrapdoorSource};
pub use searcher::Searcher;
