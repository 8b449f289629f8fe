//! Owner orchestrator
//!
//! Combines the policy cipher and the structured index:
//! - Insert: encrypt every field under the record's Set policy, tag the
//!   record's timestamp at all 64 trie levels under both dimensions, and
//!   ship the whole batch in one request
//! - Find: cover the time range, turn labels into trapdoors, fetch and
//!   decrypt the matches
//! - Delegate: partition-scoped index and attribute keys for a searcher

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use rangeseal_core::wire::{check_status, DocumentBlob, InsertRequest};
use rangeseal_core::{
    insertion_labels, Dimension, DocumentId, EncryptedDocument, Field, Record, RemoteError,
    RemoteStore, Token, LEVELS,
};

use crate::abe::{AttributeKey, PublicKey};
use crate::cipher::PolicyCipher;
use crate::config::{OwnerConfig, SearcherConfig};
use crate::credential::DelegatedCredential;
use crate::error::{OwnerError, Result};
use crate::http::HttpStore;
use crate::index::StructuredIndexClient;
use crate::keystore::KeyStore;
use crate::query::{before_deadline, DocumentResult, QueryContext, RangeQuery};

/// The data owner: sole holder of the master keys and index counters
pub struct Owner<S = HttpStore> {
    config: OwnerConfig,
    keys: KeyStore,
    cipher: PolicyCipher,
    index: StructuredIndexClient,
    store: S,
    insert_gate: Mutex<()>,
}

impl Owner<HttpStore> {
    /// Load or create keys under `store_path` and talk to `server_addr`
    pub fn open(config: OwnerConfig) -> Result<Self> {
        let store = HttpStore::new(config.server_addr.clone());
        Self::with_store(config, store)
    }
}

impl<S: RemoteStore> Owner<S> {
    pub fn with_store(config: OwnerConfig, store: S) -> Result<Self> {
        config.validate()?;
        let keys = KeyStore::load_or_init(
            &config.store_path,
            config.set_list.iter().map(String::as_str),
        )?;
        let cipher = PolicyCipher::new(keys.public_key().clone());
        let index =
            StructuredIndexClient::open(keys.index_secret().clone(), config.index_state_path())?;

        tracing::info!(
            store_path = %config.store_path.display(),
            partitions = config.set_list.len(),
            prefind = config.prefind,
            "Owner ready"
        );

        Ok(Self {
            config,
            keys,
            cipher,
            index,
            store,
            insert_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &OwnerConfig {
        &self.config
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.request_timeout()
    }

    /// Insert a batch of records, returning the new document ids in order
    pub async fn insert(&self, records: &[Record]) -> Result<Vec<DocumentId>> {
        self.insert_before(records, self.deadline()).await
    }

    /// Insert with an explicit deadline for the store round trip
    ///
    /// All-or-nothing on the owner side: any record failing to encrypt or
    /// tag aborts the batch before the store is contacted, and index
    /// counters only advance once the store accepted the batch.
    ///
    /// A batch that timed out or lost its connection after being sent may
    /// or may not be stored. It stays in doubt and is sent again unchanged
    /// at the start of the next insert; the store accepts an identical
    /// replay.
    pub async fn insert_before(
        &self,
        records: &[Record],
        deadline: Instant,
    ) -> Result<Vec<DocumentId>> {
        if records.is_empty() {
            tracing::debug!("Empty insert batch");
            return Ok(Vec::new());
        }

        let _gate = self.insert_gate.lock().await;
        self.settle_in_doubt(deadline).await?;

        let mut batch = self.index.stage();
        let mut documents = Vec::with_capacity(records.len());
        let mut tokens: Vec<Token> =
            Vec::with_capacity(records.len() * LEVELS as usize * Dimension::ALL.len());
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let id = DocumentId::random();
            let policy = self.cipher.compile(&record.set)?;
            let timestamp = record.unix_seconds()?;

            let mut document = EncryptedDocument::new(id);
            for field in Field::ALL {
                let plaintext = record.field_plaintext(field);
                document.insert(field, self.cipher.encrypt_with(plaintext.as_bytes(), &policy)?);
            }

            for label in insertion_labels(timestamp) {
                for dimension in Dimension::ALL {
                    tokens.push(batch.tag_for_insert(
                        &id,
                        &record.set,
                        dimension,
                        record.dimension_value(dimension),
                        &label,
                    )?);
                }
            }

            documents.push(DocumentBlob {
                id,
                binary: document.to_blob()?,
            });
            ids.push(id);
        }

        tracing::info!(
            documents = documents.len(),
            tokens = tokens.len(),
            "Submitting insert batch"
        );

        let request = InsertRequest { documents, tokens };
        if Instant::now() >= deadline {
            return Err(RemoteError::DeadlineExceeded.into());
        }
        self.index.hold(batch, &request)?;
        self.send_held(request, deadline).await?;
        Ok(ids)
    }

    /// Send again a batch whose earlier outcome is unknown
    async fn settle_in_doubt(&self, deadline: Instant) -> Result<()> {
        let Some(request) = self.index.in_doubt()? else {
            return Ok(());
        };
        if Instant::now() >= deadline {
            return Err(RemoteError::DeadlineExceeded.into());
        }
        tracing::info!(
            documents = request.documents.len(),
            tokens = request.tokens.len(),
            "Resending insert batch in doubt"
        );
        match self.send_held(request, deadline).await {
            Err(OwnerError::Remote(RemoteError::Status(_))) => Ok(()),
            other => other,
        }
    }

    /// Send the held batch and resolve it from the store's answer
    async fn send_held(&self, request: InsertRequest, deadline: Instant) -> Result<()> {
        let outcome = before_deadline(deadline, self.store.insert(request))
            .await
            .and_then(|response| check_status(&response.status));
        match outcome {
            Ok(()) => self.index.resolve(true),
            Err(e @ RemoteError::Status(_)) => {
                tracing::warn!(error = %e, "Store rejected insert batch");
                self.index.resolve(false)?;
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Insert batch outcome unknown, kept for resend");
                Err(e.into())
            }
        }
    }

    /// Attribute key for one partition
    fn attribute_key(&self, partition: &str) -> Result<AttributeKey> {
        if !self.keys.public_key().contains(partition) {
            return Err(OwnerError::KeyDerivation(format!(
                "partition {:?} is not published",
                partition
            )));
        }
        PolicyCipher::derive_attribute_key(self.keys.master_secret_key(), [partition])
    }

    /// Range query returning the requested fields of every match
    ///
    /// One entry per matched document; a document that cannot be decrypted
    /// is reported in place rather than dropped.
    pub async fn find_range(
        &self,
        query: &RangeQuery,
        fields: &[Field],
    ) -> Result<Vec<DocumentResult>> {
        self.find_range_before(query, fields, self.deadline()).await
    }

    pub async fn find_range_before(
        &self,
        query: &RangeQuery,
        fields: &[Field],
        deadline: Instant,
    ) -> Result<Vec<DocumentResult>> {
        let key = self.attribute_key(&query.partition)?;
        QueryContext {
            store: &self.store,
            trapdoors: &self.index,
            cipher: &self.cipher,
            key: &key,
            prefind: self.config.prefind,
        }
        .run(query, fields, deadline)
        .await
    }

    pub async fn find_user_ids(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentResult>> {
        let query = RangeQuery::new(partition, dimension, value, start, end);
        self.find_range(&query, &[Field::UserId]).await
    }

    pub async fn find_user_ids_and_sets(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentResult>> {
        let query = RangeQuery::new(partition, dimension, value, start, end);
        self.find_range(&query, &[Field::UserId, Field::Set]).await
    }

    /// Search and decrypt capability for one partition
    pub fn delegate_keys(&self, partition: &str) -> Result<DelegatedCredential> {
        let attribute_key = self.attribute_key(partition)?;
        let credential = DelegatedCredential::new(
            self.index.delegate(partition),
            attribute_key,
            self.keys.public_key().clone(),
        );
        tracing::info!(partition, "Delegated partition keys");
        Ok(credential)
    }

    /// Self-contained searcher configuration for one partition
    pub fn export_searcher_config(&self, partition: &str) -> Result<SearcherConfig> {
        Ok(SearcherConfig {
            set_list: self.config.set_list.clone(),
            keys: self.delegate_keys(partition)?,
            server_addr: self.config.server_addr.clone(),
            request_timeout_ms: self.config.request_timeout_ms,
        })
    }
}
