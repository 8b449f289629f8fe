//! Delegated searcher

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use rangeseal_core::{Dimension, Field, RemoteStore};

use crate::cipher::PolicyCipher;
use crate::config::SearcherConfig;
use crate::error::{OwnerError, Result};
use crate::http::HttpStore;
use crate::query::{DocumentResult, QueryContext, RangeQuery};

/// A principal holding a [`DelegatedCredential`](crate::DelegatedCredential)
///
/// Runs the owner's range query for its one partition. It cannot insert.
pub struct Searcher<S = HttpStore> {
    config: SearcherConfig,
    cipher: PolicyCipher,
    store: S,
}

impl Searcher<HttpStore> {
    pub fn open(config: SearcherConfig) -> Result<Self> {
        let store = HttpStore::new(config.server_addr.clone());
        Self::with_store(config, store)
    }
}

impl<S: RemoteStore> Searcher<S> {
    pub fn with_store(config: SearcherConfig, store: S) -> Result<Self> {
        if !config.keys.is_consistent() {
            return Err(OwnerError::Config(format!(
                "credential for {:?} is inconsistent",
                config.keys.partition
            )));
        }
        let cipher = PolicyCipher::new(config.keys.public_key.clone());
        Ok(Self {
            config,
            cipher,
            store,
        })
    }

    pub fn partition(&self) -> &str {
        &self.config.keys.partition
    }

    pub async fn find_range(
        &self,
        query: &RangeQuery,
        fields: &[Field],
    ) -> Result<Vec<DocumentResult>> {
        let deadline = Instant::now() + self.config.request_timeout();
        self.find_range_before(query, fields, deadline).await
    }

    /// Range query within the delegated partition
    ///
    /// Any other partition fails with [`OwnerError::PartitionNotDelegated`]
    /// before the store is contacted.
    pub async fn find_range_before(
        &self,
        query: &RangeQuery,
        fields: &[Field],
        deadline: Instant,
    ) -> Result<Vec<DocumentResult>> {
        if query.partition != self.partition() {
            return Err(OwnerError::PartitionNotDelegated {
                requested: query.partition.clone(),
                delegated: self.partition().to_string(),
            });
        }
        QueryContext {
            store: &self.store,
            trapdoors: &self.config.keys.index_key,
            cipher: &self.cipher,
            key: &self.config.keys.attribute_key,
            prefind: false,
        }
        .run(query, fields, deadline)
        .await
    }

    pub async fn find_user_ids(
        &self,
        dimension: Dimension,
        value: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentResult>> {
        let query = RangeQuery::new(self.partition(), dimension, value, start, end);
        self.find_range(&query, &[Field::UserId]).await
    }

    pub async fn find_user_ids_and_sets(
        &self,
        dimension: Dimension,
        value: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentResult>> {
        let query = RangeQuery::new(self.partition(), dimension, value, start, end);
        self.find_range(&query, &[Field::UserId, Field::Set]).await
    }
}
