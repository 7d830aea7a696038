//! Merkle inclusion proofs anchoring one memory word to a tree root.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest.
pub type Hash = [u8; 32];

/// Hash of two concatenated child digests.
#[must_use]
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Leaf hash of a single memory word (little-endian bytes).
#[must_use]
pub fn leaf_hash(word: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(word.to_le_bytes());
    hasher.finalize().into()
}

/// Render a digest as a `0x`-prefixed lowercase hex string.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut out = String::with_capacity(2 + hash.len() * 2);
    out.push_str("0x");
    for byte in hash {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Inclusion proof for one word-sized leaf of the memory Merkle tree.
///
/// `sibling_hashes` are ordered from the leaf level toward the root.
/// Verification folds `target_hash` with each sibling, taking left/right
/// placement from the leaf index bits (`address >> log2_size`), and
/// compares the result against `root_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MerkleProof {
    /// Byte address of the proved word.
    pub address: u64,
    /// Alignment/granularity of the proved word, as a power of two.
    pub log2_size: u8,
    /// Leaf hash of the proved word.
    #[serde(with = "serde_hash")]
    pub target_hash: Hash,
    /// Tree root after the access this proof belongs to.
    #[serde(with = "serde_hash")]
    pub root_hash: Hash,
    /// Sibling digests from the leaf level toward the root.
    #[serde(with = "serde_hash_vec")]
    pub sibling_hashes: Vec<Hash>,
}

impl MerkleProof {
    /// Recompute the root from the target leaf and sibling chain and
    /// compare it against `root_hash`.
    #[must_use]
    pub fn verify(&self) -> bool {
        let mut index = self.address >> self.log2_size;
        let mut current = self.target_hash;
        for sibling in &self.sibling_hashes {
            current = if index & 1 == 1 {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
            index >>= 1;
        }
        current == self.root_hash
    }
}

/// Serde adapter rendering a [`Hash`] as a `0x…` hex string on the wire.
mod serde_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Hash;

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::hash_to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for a vector of hashes.
mod serde_hash_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Hash;

    pub fn serialize<S: Serializer>(hashes: &[Hash], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(hashes.iter().map(super::hash_to_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Hash>, D::Error> {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        raw.iter()
            .map(|s| super::parse_hex(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Parse a `0x`-prefixed hex digest string.
fn parse_hex(raw: &str) -> std::result::Result<Hash, String> {
    let body = raw
        .strip_prefix("0x")
        .ok_or_else(|| format!("hash '{raw}' missing 0x prefix"))?;
    if body.len() != 64 {
        return Err(format!("hash '{raw}' is not 32 bytes"));
    }
    let mut out = [0u8; 32];
    for (i, chunk) in body.as_bytes().chunks(2).enumerate() {
        let text = std::str::from_utf8(chunk).map_err(|_| format!("hash '{raw}' is not ascii"))?;
        out[i] = u8::from_str_radix(text, 16).map_err(|_| format!("hash '{raw}' is not hex"))?;
    }
    Ok(out)
}
