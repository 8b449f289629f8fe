//! Attribute-based encryption backed by Covercrypt
//!
//! Every partition is one attribute of the `Set` dimension (`Set::grpA`).
//! A field is encrypted as a Covercrypt header whose encrypted metadata is
//! the plaintext, so the field body is sealed under the encapsulated secret.
//! User keys are Covercrypt user secret keys for a disjunction of partitions.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use cosmian_cover_crypt::api::Covercrypt;
use cosmian_cover_crypt::{
    AccessPolicy, EncryptedHeader, EncryptionHint, MasterPublicKey, MasterSecretKey as Msk,
    QualifiedAttribute, UserSecretKey,
};
use cosmian_crypto_core::bytes_ser_de::Serializable;
use serde::{Deserialize, Serialize};

use crate::error::{OwnerError, Result};

/// Dimension holding one attribute per partition
pub const SET_DIMENSION: &str = "Set";

/// Qualified attribute of a partition, e.g. `Set::grpA`
pub fn attribute_name(partition: &str) -> String {
    format!("{}::{}", SET_DIMENSION, partition)
}

/// Whether `name` can be published as a partition attribute
pub fn is_partition_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Serde adapter storing Covercrypt objects as hex of their byte encoding
mod serialized {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<T, S>(value: &Arc<T>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: Serializable,
        T::Error: std::fmt::Display,
        S: Serializer,
    {
        let bytes = Serializable::serialize(&**value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex::encode(&bytes[..]))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> std::result::Result<Arc<T>, D::Error>
    where
        T: Serializable,
        T::Error: std::fmt::Display,
        D: Deserializer<'de>,
    {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        <T as Serializable>::deserialize(&bytes)
            .map(Arc::new)
            .map_err(serde::de::Error::custom)
    }
}

fn same_bytes<T>(a: &T, b: &T) -> bool
where
    T: Serializable,
{
    match (Serializable::serialize(a), Serializable::serialize(b)) {
        (Ok(a), Ok(b)) => a[..] == b[..],
        _ => false,
    }
}

/// Master public key plus the partitions it publishes
#[derive(Clone, Serialize, Deserialize)]
pub struct PublicKey {
    partitions: BTreeSet<String>,
    #[serde(with = "serialized")]
    key: Arc<MasterPublicKey>,
}

impl PublicKey {
    /// Publish every partition of `universe` not yet present
    ///
    /// Adds the attributes to the master secret key's access structure and
    /// re-derives the public key. Ciphertexts and user keys issued before
    /// stay valid. Returns how many partitions were added.
    pub fn extend<'a>(
        &mut self,
        msk: &MasterSecretKey,
        universe: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize> {
        let added: BTreeSet<&str> = universe
            .into_iter()
            .filter(|p| !self.partitions.contains(*p))
            .collect();
        if added.is_empty() {
            return Ok(0);
        }

        let mut inner = msk.lock()?;
        for partition in &added {
            if !is_partition_name(partition) {
                return Err(OwnerError::KeyDerivation(format!(
                    "invalid partition name {:?}",
                    partition
                )));
            }
            inner
                .access_structure
                .add_attribute(
                    QualifiedAttribute {
                        dimension: SET_DIMENSION.to_string(),
                        name: partition.to_string(),
                    },
                    EncryptionHint::Classic,
                    None,
                )
                .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;
        }
        let key = Covercrypt::default()
            .update_msk(&mut inner)
            .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;

        self.key = Arc::new(key);
        self.partitions.extend(added.iter().map(|p| p.to_string()));
        Ok(added.len())
    }

    pub fn contains(&self, partition: &str) -> bool {
        self.partitions.contains(partition)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(String::as_str)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.partitions == other.partitions && same_bytes(&*self.key, &*other.key)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

/// Covercrypt master secret key
///
/// Issuing a user key updates the key's internal state, hence the lock.
pub struct MasterSecretKey {
    inner: Mutex<Msk>,
}

impl MasterSecretKey {
    fn lock(&self) -> Result<MutexGuard<'_, Msk>> {
        self.inner
            .lock()
            .map_err(|_| OwnerError::KeyDerivation("master key lock poisoned".into()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let inner = self.lock()?;
        let bytes = Serializable::serialize(&*inner)
            .map_err(|e| OwnerError::Config(format!("cannot encode master key: {}", e)))?;
        Ok(bytes[..].to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = <Msk as Serializable>::deserialize(bytes)
            .map_err(|e| OwnerError::Config(format!("cannot decode master key: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

impl std::fmt::Debug for MasterSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecretKey(..)")
    }
}

/// Decryption key restricted to a set of partitions
#[derive(Clone, Serialize, Deserialize)]
pub struct AttributeKey {
    attributes: BTreeSet<String>,
    #[serde(with = "serialized")]
    key: Arc<UserSecretKey>,
}

impl AttributeKey {
    pub fn attributes(&self) -> BTreeSet<&str> {
        self.attributes.iter().map(String::as_str).collect()
    }

    pub fn holds(&self, partition: &str) -> bool {
        self.attributes.contains(partition)
    }
}

impl PartialEq for AttributeKey {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes && same_bytes(&*self.key, &*other.key)
    }
}

impl std::fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeKey")
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh key pair publishing every partition of `universe`
pub fn setup<'a>(
    universe: impl IntoIterator<Item = &'a str>,
) -> Result<(PublicKey, MasterSecretKey)> {
    let (mut inner, key) = Covercrypt::default()
        .setup()
        .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;
    inner
        .access_structure
        .add_anarchy(SET_DIMENSION.to_string())
        .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;

    let msk = MasterSecretKey {
        inner: Mutex::new(inner),
    };
    let mut pk = PublicKey {
        partitions: BTreeSet::new(),
        key: Arc::new(key),
    };
    pk.extend(&msk, universe)?;
    Ok((pk, msk))
}

/// Encrypt `plaintext` so that only keys satisfying `policy` can open it
pub fn encrypt(pk: &PublicKey, policy: &AccessPolicy, plaintext: &[u8]) -> Result<Vec<u8>> {
    let (_, header) =
        EncryptedHeader::generate(&Covercrypt::default(), &pk.key, policy, Some(plaintext), None)
            .map_err(|e| OwnerError::Encrypt(e.to_string()))?;
    let bytes =
        Serializable::serialize(&header).map_err(|e| OwnerError::Encrypt(e.to_string()))?;
    Ok(bytes[..].to_vec())
}

/// Derive a key for exactly `partitions`
///
/// No policy is checked here; authorization happens at decrypt time.
pub fn keygen<'a>(
    msk: &MasterSecretKey,
    partitions: impl IntoIterator<Item = &'a str>,
) -> Result<AttributeKey> {
    let attributes: BTreeSet<String> = partitions.into_iter().map(str::to_string).collect();
    if attributes.is_empty() {
        return Err(OwnerError::KeyDerivation("empty attribute set".into()));
    }
    if let Some(bad) = attributes.iter().find(|p| !is_partition_name(p)) {
        return Err(OwnerError::KeyDerivation(format!(
            "invalid partition name {:?}",
            bad
        )));
    }

    let expression = attributes
        .iter()
        .map(|p| attribute_name(p))
        .collect::<Vec<_>>()
        .join(" || ");
    let policy = AccessPolicy::parse(&expression)
        .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;

    let mut inner = msk.lock()?;
    let key = Covercrypt::default()
        .generate_user_secret_key(&mut inner, &policy)
        .map_err(|e| OwnerError::KeyDerivation(e.to_string()))?;

    Ok(AttributeKey {
        attributes,
        key: Arc::new(key),
    })
}

/// Decrypt a ciphertext
///
/// Returns `Ok(None)` when the key is not authorized for the ciphertext's
/// policy. Malformed and tampered ciphertexts are `Err` with a reason.
pub fn decrypt(ciphertext: &[u8], key: &AttributeKey) -> std::result::Result<Option<Vec<u8>>, String> {
    let header =
        <EncryptedHeader as Serializable>::deserialize(ciphertext).map_err(|e| e.to_string())?;
    match header
        .decrypt(&Covercrypt::default(), &key.key, None)
        .map_err(|e| e.to_string())?
    {
        Some(cleartext) => cleartext
            .metadata
            .map(Some)
            .ok_or_else(|| "ciphertext carries no body".to_string()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(partition: &str) -> AccessPolicy {
        AccessPolicy::parse(&attribute_name(partition)).unwrap()
    }

    #[test]
    fn test_round_trip_single_attribute() {
        let (pk, msk) = setup(["grpA", "grpB"]).unwrap();
        let ct = encrypt(&pk, &policy("grpA"), b"hello").unwrap();
        let key = keygen(&msk, ["grpA"]).unwrap();
        assert_eq!(decrypt(&ct, &key).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_wrong_attribute_is_unauthorized() {
        let (pk, msk) = setup(["grpA", "grpB"]).unwrap();
        let ct = encrypt(&pk, &policy("grpA"), b"secret").unwrap();
        let key = keygen(&msk, ["grpB"]).unwrap();
        assert_eq!(decrypt(&ct, &key).unwrap(), None);
    }

    #[test]
    fn test_disjunction() {
        let (pk, msk) = setup(["a", "b", "c"]).unwrap();
        let either = AccessPolicy::parse("Set::a || Set::b").unwrap();
        let ct = encrypt(&pk, &either, b"data").unwrap();

        let a = keygen(&msk, ["a"]).unwrap();
        let b = keygen(&msk, ["b"]).unwrap();
        let c = keygen(&msk, ["c"]).unwrap();
        assert_eq!(decrypt(&ct, &a).unwrap(), Some(b"data".to_vec()));
        assert_eq!(decrypt(&ct, &b).unwrap(), Some(b"data".to_vec()));
        assert_eq!(decrypt(&ct, &c).unwrap(), None);
    }

    #[test]
    fn test_key_from_other_authority_is_unauthorized() {
        let (pk, _) = setup(["grpA"]).unwrap();
        let (_, other_msk) = setup(["grpA"]).unwrap();
        let ct = encrypt(&pk, &policy("grpA"), b"x").unwrap();
        let foreign = keygen(&other_msk, ["grpA"]).unwrap();
        assert!(!matches!(decrypt(&ct, &foreign), Ok(Some(_))));
    }

    #[test]
    fn test_malformed_ciphertext_is_error() {
        let (_, msk) = setup(["grpA"]).unwrap();
        let key = keygen(&msk, ["grpA"]).unwrap();
        assert!(decrypt(&[1, 2, 3], &key).is_err());
    }

    #[test]
    fn test_extend_publishes_new_partitions() {
        let (mut pk, msk) = setup(["grpA"]).unwrap();
        let before = pk.clone();
        let old = encrypt(&pk, &policy("grpA"), b"old").unwrap();

        assert_eq!(pk.extend(&msk, ["grpA", "grpB"]).unwrap(), 1);
        assert!(pk.contains("grpB"));
        assert_eq!(pk.extend(&msk, ["grpB"]).unwrap(), 0);
        assert_ne!(pk, before);

        let key = keygen(&msk, ["grpA"]).unwrap();
        assert_eq!(decrypt(&old, &key).unwrap(), Some(b"old".to_vec()));
        let ct = encrypt(&pk, &policy("grpB"), b"new").unwrap();
        let key = keygen(&msk, ["grpB"]).unwrap();
        assert_eq!(decrypt(&ct, &key).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_keygen_rejects_empty_and_invalid() {
        let (_, msk) = setup(["grpA"]).unwrap();
        let none: [&str; 0] = [];
        assert!(matches!(keygen(&msk, none), Err(OwnerError::KeyDerivation(_))));
        assert!(matches!(keygen(&msk, ["bad name"]), Err(OwnerError::KeyDerivation(_))));
        assert!(matches!(keygen(&msk, ["grpZ"]), Err(OwnerError::KeyDerivation(_))));
    }

    #[test]
    fn test_keys_survive_json() {
        let (pk, msk) = setup(["grpA"]).unwrap();
        let key = keygen(&msk, ["grpA"]).unwrap();
        let pk2: PublicKey = serde_json::from_str(&serde_json::to_string(&pk).unwrap()).unwrap();
        let key2: AttributeKey =
            serde_json::from_str(&serde_json::to_string(&key).unwrap()).unwrap();
        assert_eq!(pk, pk2);
        assert_eq!(key, key2);

        let msk2 = MasterSecretKey::from_bytes(&msk.to_bytes().unwrap()).unwrap();
        let ct = encrypt(&pk2, &policy("grpA"), b"x").unwrap();
        let key3 = keygen(&msk2, ["grpA"]).unwrap();
        assert_eq!(decrypt(&ct, &key3).unwrap(), Some(b"x".to_vec()));
    }
}
