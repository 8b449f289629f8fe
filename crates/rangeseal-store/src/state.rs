//! Store state: encrypted documents and index entries
//!
//! The store never sees a key. It keeps documents by id and index entries
//! by address, and resolves a search trapdoor by walking entry addresses
//! `0, 1, ...` until one is missing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rangeseal_core::index::{KEY_LEN, PAYLOAD_LEN};
use rangeseal_core::wire::{DocumentBlob, FindRequest, InsertRequest, PreFindRequest};
use rangeseal_core::{DocumentId, EncryptedDocument, IndexOp, IndexToken, SearchTrapdoor, Token};

use crate::error::{Result, StoreError};

/// Documents and index entries held by the store
#[derive(Default)]
pub struct StoreState {
    documents: HashMap<DocumentId, EncryptedDocument>,
    index: HashMap<[u8; KEY_LEN], [u8; PAYLOAD_LEN]>,
}

/// Sizes of one accepted insert batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertStats {
    pub documents: usize,
    pub entries: usize,
    /// Documents and entries that were already stored byte for byte
    pub replayed: usize,
}

/// Store statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub index_entries: usize,
}

fn decode_trapdoor(token: &Token) -> Result<SearchTrapdoor> {
    IndexToken::decode(token)
        .and_then(IndexToken::into_search)
        .map_err(|e| StoreError::InvalidToken(e.to_string()))
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an insert batch, or nothing at all
    ///
    /// Every document and token is decoded and checked before any state
    /// changes. A document or entry already stored with identical bytes is
    /// a replay of an earlier batch and is skipped, so re-sending a batch
    /// whose response was lost succeeds without applying it twice.
    pub fn insert(&mut self, request: &InsertRequest) -> Result<InsertStats> {
        let mut documents = Vec::with_capacity(request.documents.len());
        let mut seen_ids = HashSet::with_capacity(request.documents.len());
        let mut replayed = 0;
        for blob in &request.documents {
            let document = EncryptedDocument::from_blob(&blob.binary)
                .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
            if document.id != blob.id {
                return Err(StoreError::InvalidDocument(format!(
                    "blob id {} does not match envelope id {}",
                    document.id, blob.id
                )));
            }
            if !seen_ids.insert(blob.id) {
                return Err(StoreError::DuplicateDocument(blob.id));
            }
            match self.documents.get(&blob.id) {
                Some(stored) if *stored == document => replayed += 1,
                Some(_) => return Err(StoreError::DuplicateDocument(blob.id)),
                None => documents.push(document),
            }
        }

        let mut entries = Vec::with_capacity(request.tokens.len());
        let mut seen_addresses = HashSet::with_capacity(request.tokens.len());
        for token in &request.tokens {
            let tag = IndexToken::decode(token)
                .and_then(IndexToken::into_update)
                .map_err(|e| StoreError::InvalidToken(e.to_string()))?;
            if !seen_addresses.insert(tag.address) {
                return Err(StoreError::DuplicateAddress);
            }
            match self.index.get(&tag.address) {
                Some(payload) if *payload == tag.payload => replayed += 1,
                Some(_) => return Err(StoreError::DuplicateAddress),
                None => entries.push(tag),
            }
        }

        let stats = InsertStats {
            documents: documents.len(),
            entries: entries.len(),
            replayed,
        };
        for document in documents {
            self.documents.insert(document.id, document);
        }
        for tag in entries {
            self.index.insert(tag.address, tag.payload);
        }
        Ok(stats)
    }

    /// Live document ids behind one trapdoor, in id order
    fn resolve(&self, trapdoor: &SearchTrapdoor) -> BTreeSet<DocumentId> {
        let mut ids = BTreeSet::new();
        let mut counter = 0u64;
        while let Some(payload) = self.index.get(&trapdoor.address(counter)) {
            match trapdoor.open(counter, payload) {
                Ok((id, IndexOp::Add)) => {
                    ids.insert(id);
                }
                Ok((id, IndexOp::Delete)) => {
                    ids.remove(&id);
                }
                Err(e) => tracing::warn!(counter, error = %e, "Skipping unreadable index entry"),
            }
            counter += 1;
        }
        ids
    }

    /// Documents matching any trapdoor, restricted to the requested fields
    pub fn find(&self, request: &FindRequest) -> Result<Vec<DocumentBlob>> {
        let mut ids = BTreeSet::new();
        for token in &request.tokens {
            ids.extend(self.resolve(&decode_trapdoor(token)?));
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(document) = self.documents.get(&id) else {
                tracing::warn!(%id, "Index entry points at a missing document");
                continue;
            };
            let binary = document
                .project(&request.fields)
                .to_blob()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            out.push(DocumentBlob { id, binary });
        }
        Ok(out)
    }

    /// The trapdoors that match at least one entry
    pub fn pre_find(&self, request: &PreFindRequest) -> Result<Vec<Token>> {
        let mut matching = Vec::new();
        for token in &request.tokens {
            if self.index.contains_key(&decode_trapdoor(token)?.address(0)) {
                matching.push(token.clone());
            }
        }
        Ok(matching)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            documents: self.documents.len(),
            index_entries: self.index.len(),
        }
    }
}

/// Shared store state type
pub type SharedState = Arc<tokio::sync::RwLock<StoreState>>;

pub fn create_shared_state() -> SharedState {
    Arc::new(tokio::sync::RwLock::new(StoreState::new()))
}
