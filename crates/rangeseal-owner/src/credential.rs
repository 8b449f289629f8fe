//! Delegated credentials

use serde::{Deserialize, Serialize};

use crate::abe::{AttributeKey, PublicKey};
use crate::index::PartitionKey;

/// Search and decrypt capability for exactly one partition
///
/// Holds a partition-scoped index key and an attribute key for that one
/// partition. It can mint neither update tags nor keys for other partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedCredential {
    pub partition: String,
    pub index_key: PartitionKey,
    pub attribute_key: AttributeKey,
    pub public_key: PublicKey,
}

impl DelegatedCredential {
    pub(crate) fn new(
        index_key: PartitionKey,
        attribute_key: AttributeKey,
        public_key: PublicKey,
    ) -> Self {
        Self {
            partition: index_key.partition().to_string(),
            index_key,
            attribute_key,
            public_key,
        }
    }

    /// Whether the index key and attribute key agree on one partition
    pub fn is_consistent(&self) -> bool {
        self.index_key.partition() == self.partition
            && self.attribute_key.holds(&self.partition)
            && self.attribute_key.attributes().len() == 1
    }
}
