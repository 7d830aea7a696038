//! Word-granular Merkle tree over the machine memory.
//!
//! Leaves are SHA-256 hashes of individual memory words; the leaf count
//! is always a power of two, so every level pairs cleanly. Updates
//! recompute only the path from the touched leaf to the root.

use crate::models::proof::{hash_pair, leaf_hash, Hash, MerkleProof};

/// Incremental Merkle tree with one leaf per memory word.
#[derive(Debug, Clone)]
pub struct WordMerkleTree {
    /// `levels[0]` holds the leaf digests; the last level is the root.
    levels: Vec<Vec<Hash>>,
    /// Granularity of the proved words, as a power of two.
    word_log2_size: u8,
}

impl WordMerkleTree {
    /// Build a tree over the given memory words.
    ///
    /// The word count must be a power of two greater than one.
    #[must_use]
    pub fn new(words: &[u64], word_log2_size: u8) -> Self {
        debug_assert!(words.len().is_power_of_two() && words.len() > 1);
        let mut levels = Vec::new();
        let mut current: Vec<Hash> = words.iter().map(|w| leaf_hash(*w)).collect();
        while current.len() > 1 {
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(current);
            current = next;
        }
        levels.push(current);
        Self {
            levels,
            word_log2_size,
        }
    }

    /// Current root digest.
    #[must_use]
    pub fn root(&self) -> Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Replace the word at `index` and recompute the path to the root.
    pub fn update_word(&mut self, index: usize, word: u64) {
        self.levels[0][index] = leaf_hash(word);
        let mut current = index;
        for level in 1..self.levels.len() {
            current /= 2;
            let below = &self.levels[level - 1];
            let digest = hash_pair(&below[current * 2], &below[current * 2 + 1]);
            self.levels[level][current] = digest;
        }
    }

    /// Build an inclusion proof for the word at `index`, anchored at the
    /// current root.
    #[must_use]
    pub fn proof(&self, index: usize) -> MerkleProof {
        let mut sibling_hashes = Vec::with_capacity(self.levels.len() - 1);
        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if current % 2 == 0 {
                current + 1
            } else {
                current - 1
            };
            sibling_hashes.push(level[sibling]);
            current /= 2;
        }
        MerkleProof {
            address: (index as u64) << self.word_log2_size,
            log2_size: self.word_log2_size,
            target_hash: self.levels[0][index],
            root_hash: self.root(),
            sibling_hashes,
        }
    }
}
