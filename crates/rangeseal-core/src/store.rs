//! Remote store capability

use async_trait::async_trait;

use crate::wire::{
    FindRequest, FindResponse, InsertRequest, InsertResponse, PreFindRequest, PreFindResponse,
};
use crate::RemoteError;

/// The untrusted store that holds documents and index entries
///
/// Implementations return the store's response as-is; mapping a non-`Ok`
/// status to an error is the caller's job (see [`crate::wire::check_status`]).
/// Transport failures are reported as [`RemoteError::Transport`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn insert(&self, request: InsertRequest) -> Result<InsertResponse, RemoteError>;

    async fn find(&self, request: FindRequest) -> Result<FindResponse, RemoteError>;

    async fn pre_find(&self, request: PreFindRequest) -> Result<PreFindResponse, RemoteError>;
}
