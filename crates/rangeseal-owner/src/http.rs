//! HTTP client for the remote store

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rangeseal_core::wire::{
    FindRequest, FindResponse, InsertRequest, InsertResponse, PreFindRequest, PreFindResponse,
};
use rangeseal_core::{RemoteError, RemoteStore};

/// Body of a store-level rejection
#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

/// [`RemoteStore`] over the store's JSON HTTP API
#[derive(Debug, Clone)]
pub struct HttpStore {
    http: Client,
    server_url: String,
}

impl HttpStore {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.server_url, path);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<StatusBody>(&text) {
                Ok(body) => body.status,
                Err(_) => format!("HTTP {}: {}", code, text),
            };
            return Err(RemoteError::Status(message));
        }

        resp.json()
            .await
            .map_err(|e| RemoteError::Transport(format!("invalid response from {}: {}", path, e)))
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn insert(&self, request: InsertRequest) -> Result<InsertResponse, RemoteError> {
        self.post("/insert", &request).await
    }

    async fn find(&self, request: FindRequest) -> Result<FindResponse, RemoteError> {
        self.post("/find", &request).await
    }

    async fn pre_find(&self, request: PreFindRequest) -> Result<PreFindResponse, RemoteError> {
        self.post("/prefind", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let store = HttpStore::new("http://localhost:3000/");
        assert_eq!(store.server_url(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        // port 9 (discard) is closed on test hosts
        let store = HttpStore::new("http://127.0.0.1:9");
        let err = store
            .pre_find(PreFindRequest { tokens: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
