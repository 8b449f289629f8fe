//! Structured index client
//!
//! Derives update tags and search trapdoors from the owner's index secret.
//! Keys are scoped by partition: `K_p = PRF(secret, p)` and every keyword
//! key is `PRF(K_p, keyword)`, so a holder of `K_p` alone can search `p`
//! and nothing else.
//!
//! The owner keeps one counter per (partition, keyword); entry `c` of a
//! keyword is stored at an address derived from `c`. Counters for an insert
//! batch are staged, then held in doubt together with the request while the
//! store decides. A confirmed batch commits its counters and a refused one
//! releases them. A batch whose outcome never arrived stays in doubt, and is
//! sent again byte for byte before anything else is staged, so an address
//! is never reused for a different entry.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::Zeroize;

use rangeseal_core::index::{prf, KEY_LEN};
use rangeseal_core::wire::InsertRequest;
use rangeseal_core::{
    Dimension, DocumentId, IndexLabel, IndexOp, IndexToken, SearchTrapdoor, Token, UpdateTag,
};

use crate::error::{OwnerError, Result};

/// 32 bytes rendered as hex in JSON
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct KeyBytes(#[serde(with = "rangeseal_core::hex_serde::array32")] pub [u8; KEY_LEN]);

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBytes(..)")
    }
}

/// Owner-held index secret
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexSecret(KeyBytes);

impl IndexSecret {
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(KeyBytes(bytes))
    }

    /// Delegation secret for one partition
    pub fn partition_key(&self, partition: &str) -> PartitionKey {
        PartitionKey {
            partition: partition.to_string(),
            key: KeyBytes(prf(&self.0 .0, b"partition", partition.as_bytes())),
        }
    }

    fn counter_id(&self, partition: &str, keyword: &[u8]) -> String {
        let mut input = Vec::with_capacity(4 + partition.len() + keyword.len());
        input.extend_from_slice(&(partition.len() as u32).to_be_bytes());
        input.extend_from_slice(partition.as_bytes());
        input.extend_from_slice(keyword);
        hex::encode(prf(&self.0 .0, b"counter", &input))
    }
}

impl std::fmt::Debug for IndexSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IndexSecret(..)")
    }
}

/// Search capability for exactly one partition
///
/// Carries no counters and no index secret, so it cannot mint update tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKey {
    partition: String,
    key: KeyBytes,
}

impl PartitionKey {
    pub fn partition(&self) -> &str {
        &self.partition
    }

    fn keyword_key(&self, keyword: &[u8]) -> [u8; KEY_LEN] {
        prf(&self.key.0, b"keyword", keyword)
    }

    /// Trapdoor for `partition`; any other partition is refused
    pub fn trapdoor(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Token> {
        if partition != self.partition {
            return Err(OwnerError::PartitionNotDelegated {
                requested: partition.to_string(),
                delegated: self.partition.clone(),
            });
        }
        let keyword = label.keyword(dimension, value);
        let trapdoor = SearchTrapdoor::new(self.keyword_key(&keyword));
        Ok(IndexToken::from(trapdoor).encode()?)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    counters: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_doubt: Option<InDoubt>,
}

/// A batch sent to the store whose outcome is unknown
///
/// Its counters stay reserved until the store confirms or rejects it;
/// the request is kept so it can be sent again unchanged.
#[derive(Debug, Serialize, Deserialize)]
struct InDoubt {
    counters: HashMap<String, u64>,
    request: InsertRequest,
}

/// Owner-side adapter over the structured index
pub struct StructuredIndexClient {
    secret: IndexSecret,
    state_path: Option<PathBuf>,
    state: Mutex<IndexState>,
}

impl StructuredIndexClient {
    /// Open with counters persisted at `state_path` (created on first commit)
    pub fn open(secret: IndexSecret, state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        let state = if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&content).map_err(|e| {
                OwnerError::Config(format!(
                    "malformed index state {}: {}",
                    state_path.display(),
                    e
                ))
            })?
        } else {
            IndexState::default()
        };

        tracing::debug!(
            keywords = state.counters.len(),
            in_doubt = state.in_doubt.is_some(),
            path = %state_path.display(),
            "Index state loaded"
        );

        Ok(Self {
            secret,
            state_path: Some(state_path),
            state: Mutex::new(state),
        })
    }

    /// Counters kept in memory only
    pub fn in_memory(secret: IndexSecret) -> Self {
        Self {
            secret,
            state_path: None,
            state: Mutex::new(IndexState::default()),
        }
    }

    fn committed(&self, counter_id: &str) -> Result<u64> {
        Ok(self.lock()?.counters.get(counter_id).copied().unwrap_or(0))
    }

    /// Start an insert batch
    pub fn stage(&self) -> IndexBatch<'_> {
        IndexBatch {
            client: self,
            pending: HashMap::new(),
            tagged: HashSet::new(),
            tokens: 0,
        }
    }

    /// Reserve a batch's counters before `request` is sent to the store
    ///
    /// At most one batch may be in doubt; it must be resolved before the
    /// next one is held.
    pub fn hold(&self, batch: IndexBatch<'_>, request: &InsertRequest) -> Result<()> {
        let mut state = self.lock()?;
        if state.in_doubt.is_some() {
            return Err(OwnerError::Index("an insert batch is already in doubt".into()));
        }
        state.in_doubt = Some(InDoubt {
            counters: batch.pending,
            request: request.clone(),
        });
        self.save(&state)
    }

    /// Request of the batch still in doubt, if any
    pub fn in_doubt(&self) -> Result<Option<InsertRequest>> {
        Ok(self.lock()?.in_doubt.as_ref().map(|d| d.request.clone()))
    }

    /// Settle the batch in doubt: apply its counters when the store holds
    /// it, release them when the store refused it
    pub fn resolve(&self, applied: bool) -> Result<()> {
        let mut state = self.lock()?;
        let Some(in_doubt) = state.in_doubt.take() else {
            return Ok(());
        };
        let keywords = in_doubt.counters.len();
        if applied {
            state.counters.extend(in_doubt.counters);
        }
        self.save(&state)?;
        tracing::debug!(
            keywords,
            applied,
            total = state.counters.len(),
            "Index batch resolved"
        );
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexState>> {
        self.state
            .lock()
            .map_err(|_| OwnerError::Index("index state lock poisoned".into()))
    }

    fn save(&self, state: &IndexState) -> Result<()> {
        match &self.state_path {
            Some(path) => persist(path, state),
            None => Ok(()),
        }
    }

    /// Search trapdoor, or `None` when nothing was ever indexed under the
    /// keyword
    pub fn trapdoor_for_query(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Option<Token>> {
        let keyword = label.keyword(dimension, value);
        if self.committed(&self.secret.counter_id(partition, &keyword))? == 0 {
            return Ok(None);
        }
        self.delegate(partition)
            .trapdoor(partition, dimension, value, label)
            .map(Some)
    }

    /// Delegation secret for one partition
    pub fn delegate(&self, partition: &str) -> PartitionKey {
        self.secret.partition_key(partition)
    }
}

fn persist(path: &Path, state: &IndexState) -> Result<()> {
    let content = serde_json::to_string(state)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Update tags of one insert batch, not yet committed
pub struct IndexBatch<'a> {
    client: &'a StructuredIndexClient,
    pending: HashMap<String, u64>,
    tagged: HashSet<(String, DocumentId)>,
    tokens: usize,
}

impl IndexBatch<'_> {
    /// Update tag adding `id` under `dimension:value` at `label`
    pub fn tag_for_insert(
        &mut self,
        id: &DocumentId,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Token> {
        let keyword = label.keyword(dimension, value);
        let counter_id = self.client.secret.counter_id(partition, &keyword);

        if !self.tagged.insert((counter_id.clone(), *id)) {
            return Err(OwnerError::Index(format!(
                "document {} already tagged for this keyword",
                id
            )));
        }

        let counter = match self.pending.get(&counter_id) {
            Some(c) => *c,
            None => self.client.committed(&counter_id)?,
        };
        let keyword_key = self
            .client
            .secret
            .partition_key(partition)
            .keyword_key(&keyword);
        let tag = UpdateTag::seal(&keyword_key, counter, id, IndexOp::Add);
        self.pending.insert(counter_id, counter + 1);
        self.tokens += 1;

        Ok(IndexToken::from(tag).encode()?)
    }

    /// Number of update tags produced so far
    pub fn len(&self) -> usize {
        self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> IndexLabel {
        IndexLabel::new(0, 1_700_000_000)
    }

    fn request(tokens: Vec<Token>) -> InsertRequest {
        InsertRequest {
            documents: Vec::new(),
            tokens,
        }
    }

    fn commit(client: &StructuredIndexClient, batch: IndexBatch<'_>) {
        client.hold(batch, &request(Vec::new())).unwrap();
        client.resolve(true).unwrap();
    }

    #[test]
    fn test_absent_until_committed() {
        let client = StructuredIndexClient::in_memory(IndexSecret::generate());
        let id = DocumentId::random();

        assert!(client
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_none());

        let mut batch = client.stage();
        batch
            .tag_for_insert(&id, "grpA", Dimension::B, "loc1", &label())
            .unwrap();
        assert_eq!(batch.len(), 1);

        // staged but not committed
        assert!(client
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_none());

        commit(&client, batch);
        assert!(client
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_some());
        assert!(client
            .trapdoor_for_query("grpB", Dimension::B, "loc1", &label())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dropped_batch_leaves_no_gap() {
        let client = StructuredIndexClient::in_memory(IndexSecret::generate());
        let id = DocumentId::random();

        let mut dropped = client.stage();
        let first = dropped
            .tag_for_insert(&id, "grpA", Dimension::A, "u1", &label())
            .unwrap();
        drop(dropped);

        let mut batch = client.stage();
        let second = batch
            .tag_for_insert(&id, "grpA", Dimension::A, "u1", &label())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_refused_batch_releases_counters() {
        let client = StructuredIndexClient::in_memory(IndexSecret::generate());
        let id = DocumentId::random();

        let mut batch = client.stage();
        let first = batch
            .tag_for_insert(&id, "grpA", Dimension::A, "u1", &label())
            .unwrap();
        client.hold(batch, &request(vec![first.clone()])).unwrap();
        assert_eq!(client.in_doubt().unwrap().unwrap().tokens, vec![first.clone()]);

        // a second batch cannot be held while the first is unresolved
        assert!(matches!(
            client.hold(client.stage(), &request(Vec::new())),
            Err(OwnerError::Index(_))
        ));

        client.resolve(false).unwrap();
        assert!(client.in_doubt().unwrap().is_none());
        let mut batch = client.stage();
        let again = batch
            .tag_for_insert(&id, "grpA", Dimension::A, "u1", &label())
            .unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_in_doubt_batch_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index-state.json");
        let secret = IndexSecret::generate();

        let client = StructuredIndexClient::open(secret.clone(), &path).unwrap();
        let mut batch = client.stage();
        let first = batch
            .tag_for_insert(&DocumentId::random(), "grpA", Dimension::B, "loc1", &label())
            .unwrap();
        client.hold(batch, &request(vec![first.clone()])).unwrap();
        drop(client);

        let reopened = StructuredIndexClient::open(secret, &path).unwrap();
        assert_eq!(reopened.in_doubt().unwrap().unwrap().tokens, vec![first]);
        assert!(reopened
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_none());

        reopened.resolve(true).unwrap();
        assert!(reopened.in_doubt().unwrap().is_none());
        assert!(reopened
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_counters_advance_within_batch() {
        let client = StructuredIndexClient::in_memory(IndexSecret::generate());
        let mut batch = client.stage();
        let a = batch
            .tag_for_insert(&DocumentId::random(), "grpA", Dimension::A, "u1", &label())
            .unwrap();
        let b = batch
            .tag_for_insert(&DocumentId::random(), "grpA", Dimension::A, "u1", &label())
            .unwrap();

        let addr = |t: &Token| IndexToken::decode(t).unwrap().into_update().unwrap().address;
        assert_ne!(addr(&a), addr(&b));
    }

    #[test]
    fn test_same_document_not_retagged() {
        let client = StructuredIndexClient::in_memory(IndexSecret::generate());
        let id = DocumentId::random();
        let mut batch = client.stage();
        batch
            .tag_for_insert(&id, "grpA", Dimension::A, "u1", &label())
            .unwrap();
        assert!(matches!(
            batch.tag_for_insert(&id, "grpA", Dimension::A, "u1", &label()),
            Err(OwnerError::Index(_))
        ));
    }

    #[test]
    fn test_partition_key_scope() {
        let secret = IndexSecret::generate();
        let key = secret.partition_key("grpA");
        assert!(key.trapdoor("grpA", Dimension::B, "loc1", &label()).is_ok());
        assert!(matches!(
            key.trapdoor("grpB", Dimension::B, "loc1", &label()),
            Err(OwnerError::PartitionNotDelegated { .. })
        ));
        assert_ne!(secret.partition_key("grpA"), secret.partition_key("grpB"));
    }

    #[test]
    fn test_counters_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index-state.json");
        let secret = IndexSecret::generate();

        let client = StructuredIndexClient::open(secret.clone(), &path).unwrap();
        let mut batch = client.stage();
        batch
            .tag_for_insert(&DocumentId::random(), "grpA", Dimension::B, "loc1", &label())
            .unwrap();
        commit(&client, batch);
        assert!(path.exists());

        let reopened = StructuredIndexClient::open(secret, &path).unwrap();
        assert!(reopened
            .trapdoor_for_query("grpA", Dimension::B, "loc1", &label())
            .unwrap()
            .is_some());
        // keywords never appear in the state file
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("loc1"));
    }
}
