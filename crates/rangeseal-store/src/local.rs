//! In-process store
//!
//! Same state and checks as the HTTP server, without the transport. A
//! rejected request comes back as a non-`Ok` status, exactly as over HTTP.

use async_trait::async_trait;

use rangeseal_core::wire::{
    FindRequest, FindResponse, InsertRequest, InsertResponse, PreFindRequest, PreFindResponse,
};
use rangeseal_core::{RemoteError, RemoteStore};

use crate::state::{create_shared_state, SharedState, StoreStats};

#[derive(Clone)]
pub struct LocalStore {
    state: SharedState,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            state: create_shared_state(),
        }
    }

    /// Share state with a running [`StoreServer`](crate::StoreServer)
    pub fn with_state(state: SharedState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub async fn stats(&self) -> StoreStats {
        self.state.read().await.stats()
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn insert(&self, request: InsertRequest) -> Result<InsertResponse, RemoteError> {
        Ok(match self.state.write().await.insert(&request) {
            Ok(_) => InsertResponse::ok(),
            Err(e) => InsertResponse {
                status: e.to_string(),
            },
        })
    }

    async fn find(&self, request: FindRequest) -> Result<FindResponse, RemoteError> {
        Ok(match self.state.read().await.find(&request) {
            Ok(documents) => FindResponse::ok(documents),
            Err(e) => FindResponse {
                status: e.to_string(),
                documents: Vec::new(),
            },
        })
    }

    async fn pre_find(&self, request: PreFindRequest) -> Result<PreFindResponse, RemoteError> {
        Ok(match self.state.read().await.pre_find(&request) {
            Ok(tokens) => PreFindResponse::ok(tokens),
            Err(e) => PreFindResponse {
                status: e.to_string(),
                tokens: Vec::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangeseal_core::wire::check_status;
    use rangeseal_core::Token;

    #[tokio::test]
    async fn test_rejection_is_status() {
        let store = LocalStore::new();
        let resp = store
            .insert(InsertRequest {
                documents: vec![],
                tokens: vec![Token(vec![1, 2, 3])],
            })
            .await
            .unwrap();
        assert!(matches!(
            check_status(&resp.status),
            Err(RemoteError::Status(ref m)) if m.starts_with("Invalid token")
        ));
        assert_eq!(store.stats().await.index_entries, 0);
    }

    #[tokio::test]
    async fn test_empty_find() {
        let store = LocalStore::new();
        let resp = store
            .find(FindRequest {
                fields: vec![],
                tokens: vec![],
            })
            .await
            .unwrap();
        assert!(check_status(&resp.status).is_ok());
        assert!(resp.documents.is_empty());
    }
}
