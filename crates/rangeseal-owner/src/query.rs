//! Range query driver shared by the owner and delegated searchers

use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::time::Instant;

use rangeseal_core::wire::{check_status, FindRequest, PreFindRequest};
use rangeseal_core::{
    range_cover, unix_seconds, DecryptedRecord, Dimension, EncryptedDocument, Field, IndexLabel,
    RemoteError, RemoteStore, Token,
};

use crate::abe::AttributeKey;
use crate::cipher::PolicyCipher;
use crate::error::{DocumentError, Result};
use crate::index::{PartitionKey, StructuredIndexClient};

/// Outcome for one matched document
pub type DocumentResult = std::result::Result<DecryptedRecord, DocumentError>;

/// "Records of `partition` whose `dimension` equals `value`, with time in
/// `[start, end]`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub partition: String,
    pub dimension: Dimension,
    pub value: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RangeQuery {
    pub fn new(
        partition: impl Into<String>,
        dimension: Dimension,
        value: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            partition: partition.into(),
            dimension,
            value: value.into(),
            start,
            end,
        }
    }

    /// Dyadic cover of the time interval
    pub fn cover(&self) -> Result<Vec<IndexLabel>> {
        Ok(range_cover(
            unix_seconds(&self.start)?,
            unix_seconds(&self.end)?,
        )?)
    }
}

/// Anything that can turn a label into a search trapdoor
///
/// `Ok(None)` means nothing is indexed under that exact keyword, which is
/// not an error.
pub trait TrapdoorSource {
    fn trapdoor(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Option<Token>>;
}

impl TrapdoorSource for StructuredIndexClient {
    fn trapdoor(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Option<Token>> {
        self.trapdoor_for_query(partition, dimension, value, label)
    }
}

impl TrapdoorSource for PartitionKey {
    fn trapdoor(
        &self,
        partition: &str,
        dimension: Dimension,
        value: &str,
        label: &IndexLabel,
    ) -> Result<Option<Token>> {
        PartitionKey::trapdoor(self, partition, dimension, value, label).map(Some)
    }
}

/// Run `call` unless `deadline` has passed, giving up once it does
pub(crate) async fn before_deadline<T, F>(
    deadline: Instant,
    call: F,
) -> std::result::Result<T, RemoteError>
where
    F: Future<Output = std::result::Result<T, RemoteError>>,
{
    if Instant::now() >= deadline {
        return Err(RemoteError::DeadlineExceeded);
    }
    tokio::time::timeout_at(deadline, call)
        .await
        .map_err(|_| RemoteError::DeadlineExceeded)?
}

/// Everything a range query needs besides the query itself
pub(crate) struct QueryContext<'a, S: ?Sized, T> {
    pub store: &'a S,
    pub trapdoors: &'a T,
    pub cipher: &'a PolicyCipher,
    pub key: &'a AttributeKey,
    pub prefind: bool,
}

impl<S, T> QueryContext<'_, S, T>
where
    S: RemoteStore + ?Sized,
    T: TrapdoorSource,
{
    pub async fn run(
        &self,
        query: &RangeQuery,
        fields: &[Field],
        deadline: Instant,
    ) -> Result<Vec<DocumentResult>> {
        let labels = query.cover()?;

        let mut tokens = Vec::with_capacity(labels.len());
        for label in &labels {
            if let Some(token) =
                self.trapdoors
                    .trapdoor(&query.partition, query.dimension, &query.value, label)?
            {
                tokens.push(token);
            }
        }

        tracing::debug!(
            dimension = %query.dimension,
            labels = labels.len(),
            trapdoors = tokens.len(),
            "Range cover computed"
        );

        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        if self.prefind {
            let request = PreFindRequest { tokens };
            let response = before_deadline(deadline, self.store.pre_find(request)).await?;
            check_status(&response.status)?;
            tracing::debug!(matching = response.tokens.len(), "PreFind");
            if response.tokens.is_empty() {
                return Ok(Vec::new());
            }
            tokens = response.tokens;
        }

        let request = FindRequest {
            fields: fields.to_vec(),
            tokens,
        };
        let response = before_deadline(deadline, self.store.find(request)).await?;
        check_status(&response.status)?;

        let results: Vec<DocumentResult> = response
            .documents
            .iter()
            .map(|doc| decrypt_document(self.cipher, self.key, &doc.binary, fields))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(
            documents = results.len(),
            failed,
            "Range query complete"
        );
        if failed > 0 {
            tracing::warn!(failed, "Some matched documents could not be decrypted");
        }

        Ok(results)
    }
}

/// Decrypt the requested fields of one returned blob
pub fn decrypt_document(
    cipher: &PolicyCipher,
    key: &AttributeKey,
    blob: &[u8],
    fields: &[Field],
) -> DocumentResult {
    let document = EncryptedDocument::from_blob(blob)
        .map_err(|e| DocumentError::Decode(format!("document blob: {}", e)))?;

    let mut record = DecryptedRecord::default();
    for &field in fields {
        let ciphertext = document.field(field).ok_or_else(|| {
            DocumentError::Decode(format!("document {} has no field {}", document.id, field))
        })?;
        let plaintext = cipher.decrypt_field(field, ciphertext, key)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| DocumentError::Decode(format!("field {} is not UTF-8", field)))?;
        record.fields.insert(field, text);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abe;
    use chrono::TimeZone;
    use rangeseal_core::DocumentId;

    #[test]
    fn test_inverted_range_rejected() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let query = RangeQuery::new("grpA", Dimension::B, "loc1", t, t - chrono::Duration::seconds(1));
        assert!(matches!(
            query.cover(),
            Err(crate::OwnerError::Core(rangeseal_core::Error::InvalidRange { .. }))
        ));
    }

    #[test]
    fn test_decrypt_document_reports_per_field_errors() {
        let (pk, msk) = abe::setup(["grpA", "grpB"]).unwrap();
        let cipher = PolicyCipher::new(pk);
        let mut doc = EncryptedDocument::new(DocumentId::random());
        doc.insert(Field::UserId, cipher.encrypt_field(b"u1", "grpA").unwrap());
        let blob = doc.to_blob().unwrap();

        let key_a = abe::keygen(&msk, ["grpA"]).unwrap();
        let key_b = abe::keygen(&msk, ["grpB"]).unwrap();

        let ok = decrypt_document(&cipher, &key_a, &blob, &[Field::UserId]).unwrap();
        assert_eq!(ok.user_id(), Some("u1"));

        assert_eq!(
            decrypt_document(&cipher, &key_b, &blob, &[Field::UserId]),
            Err(DocumentError::AccessDenied(Field::UserId))
        );
        assert!(matches!(
            decrypt_document(&cipher, &key_a, &blob, &[Field::UserId, Field::Set]),
            Err(DocumentError::Decode(_))
        ));
        assert!(matches!(
            decrypt_document(&cipher, &key_a, b"\x01\x02", &[Field::UserId]),
            Err(DocumentError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_deadline_already_passed() {
        let deadline = Instant::now();
        let result = before_deadline(deadline, async { Ok::<_, RemoteError>(()) }).await;
        assert_eq!(result, Err(RemoteError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_deadline_elapses_during_call() {
        let deadline = Instant::now() + std::time::Duration::from_millis(20);
        let result = before_deadline(deadline, async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok::<_, RemoteError>(())
        })
        .await;
        assert_eq!(result, Err(RemoteError::DeadlineExceeded));
    }
}
