//! Field encryption under access policies

use cosmian_cover_crypt::AccessPolicy;
use rangeseal_core::Field;

use crate::abe::{self, AttributeKey, MasterSecretKey, PublicKey, SET_DIMENSION};
use crate::error::{DocumentError, OwnerError, Result};

/// Longest Set label accepted by the policy compiler, in bytes
pub const MAX_LABEL_LEN: usize = 1024;

/// Deepest parenthesis nesting accepted in a Set label
pub const MAX_POLICY_DEPTH: usize = 16;

/// Encrypts record fields under a compiled policy label and decrypts them
/// with attribute keys
#[derive(Debug, Clone)]
pub struct PolicyCipher {
    pk: PublicKey,
}

impl PolicyCipher {
    pub fn new(pk: PublicKey) -> Self {
        Self { pk }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.pk
    }

    /// Compile a Set label into an access policy
    ///
    /// A bare partition name (`grpA`) is the single-attribute policy
    /// `Set::grpA`. Anything else is a boolean expression over qualified
    /// attributes (`Set::grpA || Set::grpB`). Every attribute must be
    /// published in the public key.
    pub fn compile(&self, label: &str) -> Result<AccessPolicy> {
        let fail = |reason: String| OwnerError::PolicyCompile {
            label: label.chars().take(64).collect(),
            reason,
        };

        if label.len() > MAX_LABEL_LEN {
            return Err(fail(format!("label longer than {} bytes", MAX_LABEL_LEN)));
        }
        check_nesting(label).map_err(fail)?;

        let expression = if abe::is_partition_name(label) {
            abe::attribute_name(label)
        } else {
            label.to_string()
        };

        let mut attributes = 0;
        for token in expression
            .split(|c: char| matches!(c, '(' | ')' | '&' | '|') || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let partition = token
                .strip_prefix(SET_DIMENSION)
                .and_then(|t| t.strip_prefix("::"))
                .ok_or_else(|| fail(format!("{:?} is not a partition attribute", token)))?;
            if !self.pk.contains(partition) {
                return Err(fail(format!("unknown attribute {:?}", partition)));
            }
            attributes += 1;
        }
        if attributes == 0 {
            return Err(fail("policy names no attribute".into()));
        }

        AccessPolicy::parse(&expression).map_err(|e| fail(e.to_string()))
    }

    pub fn encrypt_field(&self, plaintext: &[u8], label: &str) -> Result<Vec<u8>> {
        let policy = self.compile(label)?;
        self.encrypt_with(plaintext, &policy)
    }

    pub fn encrypt_with(&self, plaintext: &[u8], policy: &AccessPolicy) -> Result<Vec<u8>> {
        abe::encrypt(&self.pk, policy, plaintext)
    }

    /// Key for exactly `attributes`; authorization is checked at decrypt time
    pub fn derive_attribute_key<'a>(
        msk: &MasterSecretKey,
        attributes: impl IntoIterator<Item = &'a str>,
    ) -> Result<AttributeKey> {
        abe::keygen(msk, attributes)
    }

    /// Decrypt one field of a document
    ///
    /// A key whose attributes do not satisfy the policy yields
    /// [`DocumentError::AccessDenied`]; never an empty plaintext.
    pub fn decrypt_field(
        &self,
        field: Field,
        ciphertext: &[u8],
        key: &AttributeKey,
    ) -> std::result::Result<Vec<u8>, DocumentError> {
        match abe::decrypt(ciphertext, key) {
            Ok(Some(plaintext)) => Ok(plaintext),
            Ok(None) => Err(DocumentError::AccessDenied(field)),
            Err(reason) => Err(DocumentError::Decode(format!("field {}: {}", field, reason))),
        }
    }
}

fn check_nesting(label: &str) -> std::result::Result<(), String> {
    let mut depth = 0usize;
    for c in label.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_POLICY_DEPTH {
                    return Err(format!("nesting deeper than {}", MAX_POLICY_DEPTH));
                }
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced parentheses".to_string())?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err("unbalanced parentheses".into())
    }
}
