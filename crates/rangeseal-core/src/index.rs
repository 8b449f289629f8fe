//! Structured index token formats
//!
//! The owner mints tokens from a keyword key `K_w` (derived from its index
//! secret, the partition and the keyword); the store matches them without
//! learning the keyword.
//!
//! Entry number `c` of a keyword lives at address `HMAC(K_w, "addr" || c)`
//! and carries `(document id || op) XOR HMAC(K_w, "mask" || c)`. A search
//! trapdoor is `K_w` itself: the store walks `c = 0, 1, ...` until an
//! address is missing.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::record::{DocumentId, Token, DOCUMENT_ID_LEN};
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of an index address / keyword key
pub const KEY_LEN: usize = 32;

/// Length of a masked entry payload (document id and op byte)
pub const PAYLOAD_LEN: usize = DOCUMENT_ID_LEN + 1;

/// Index update operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOp {
    Add,
    Delete,
}

impl IndexOp {
    fn to_byte(self) -> u8 {
        match self {
            IndexOp::Add => 0,
            IndexOp::Delete => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(IndexOp::Add),
            1 => Some(IndexOp::Delete),
            _ => None,
        }
    }
}

/// Keyed PRF used for every index derivation
pub fn prf(key: &[u8], domain: &[u8], input: &[u8]) -> [u8; KEY_LEN] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&(domain.len() as u32).to_be_bytes());
    mac.update(domain);
    mac.update(input);
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn entry_address(keyword_key: &[u8; KEY_LEN], counter: u64) -> [u8; KEY_LEN] {
    prf(keyword_key, b"addr", &counter.to_be_bytes())
}

fn entry_mask(keyword_key: &[u8; KEY_LEN], counter: u64) -> [u8; PAYLOAD_LEN] {
    let full = prf(keyword_key, b"mask", &counter.to_be_bytes());
    let mut mask = [0u8; PAYLOAD_LEN];
    mask.copy_from_slice(&full[..PAYLOAD_LEN]);
    mask
}

/// One index entry to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTag {
    pub address: [u8; KEY_LEN],
    pub payload: [u8; PAYLOAD_LEN],
}

impl UpdateTag {
    /// Seal entry number `counter` for a keyword
    pub fn seal(keyword_key: &[u8; KEY_LEN], counter: u64, id: &DocumentId, op: IndexOp) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..DOCUMENT_ID_LEN].copy_from_slice(id.as_bytes());
        payload[DOCUMENT_ID_LEN] = op.to_byte();
        for (p, m) in payload.iter_mut().zip(entry_mask(keyword_key, counter)) {
            *p ^= m;
        }
        Self {
            address: entry_address(keyword_key, counter),
            payload,
        }
    }
}

/// Capability to enumerate every entry of one keyword
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTrapdoor {
    pub keyword_key: [u8; KEY_LEN],
}

impl SearchTrapdoor {
    pub fn new(keyword_key: [u8; KEY_LEN]) -> Self {
        Self { keyword_key }
    }

    /// Address of entry number `counter`
    pub fn address(&self, counter: u64) -> [u8; KEY_LEN] {
        entry_address(&self.keyword_key, counter)
    }

    /// Unmask entry number `counter`
    pub fn open(&self, counter: u64, payload: &[u8; PAYLOAD_LEN]) -> Result<(DocumentId, IndexOp)> {
        let mut plain = *payload;
        for (p, m) in plain.iter_mut().zip(entry_mask(&self.keyword_key, counter)) {
            *p ^= m;
        }
        let op = IndexOp::from_byte(plain[DOCUMENT_ID_LEN])
            .ok_or_else(|| Error::MalformedToken("unknown index operation".into()))?;
        let mut id = [0u8; DOCUMENT_ID_LEN];
        id.copy_from_slice(&plain[..DOCUMENT_ID_LEN]);
        Ok((DocumentId(id), op))
    }
}

impl std::fmt::Debug for SearchTrapdoor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SearchTrapdoor(..)")
    }
}

/// Decoded form of an opaque [`Token`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexToken {
    Update(UpdateTag),
    Search(SearchTrapdoor),
}

impl IndexToken {
    pub fn encode(&self) -> Result<Token> {
        Ok(Token(bincode::serialize(self)?))
    }

    pub fn decode(token: &Token) -> Result<Self> {
        bincode::deserialize(token.as_bytes()).map_err(|e| Error::MalformedToken(e.to_string()))
    }

    pub fn into_update(self) -> Result<UpdateTag> {
        match self {
            IndexToken::Update(tag) => Ok(tag),
            IndexToken::Search(_) => Err(Error::MalformedToken("expected an update tag".into())),
        }
    }

    pub fn into_search(self) -> Result<SearchTrapdoor> {
        match self {
            IndexToken::Search(trapdoor) => Ok(trapdoor),
            IndexToken::Update(_) => Err(Error::MalformedToken("expected a search trapdoor".into())),
        }
    }
}

impl From<UpdateTag> for IndexToken {
    fn from(tag: UpdateTag) -> Self {
        IndexToken::Update(tag)
    }
}

impl From<SearchTrapdoor> for IndexToken {
    fn from(trapdoor: SearchTrapdoor) -> Self {
        IndexToken::Search(trapdoor)
    }
}
