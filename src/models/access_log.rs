//! Access log emitted by one verified machine step.
//!
//! The log is a pure record: an ordered sequence of word accesses, each
//! carrying a Merkle proof, plus advisory bracket notes delimiting
//! sub-ranges of the access sequence and free-form notes. It is produced
//! atomically by one `step` call and immutable once returned; identical
//! pre-step machine state yields a byte-identical log.

use serde::{Deserialize, Serialize};

use super::proof::MerkleProof;

/// Kind of memory operation a [`WordAccess`] records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessOperation {
    /// Word observed without mutation.
    Read,
    /// Word mutated; `written` holds the new value.
    Write,
}

/// One memory word observed or mutated during a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WordAccess {
    /// Whether the word was read or written.
    pub operation: AccessOperation,
    /// Word value observed before the operation.
    pub read: u64,
    /// Word value present after the operation; equals `read` for reads.
    pub written: u64,
    /// Inclusion proof anchored at the word, root taken after the access.
    pub proof: MerkleProof,
}

/// Kind of a bracket annotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BracketKind {
    /// Opens an annotated sub-range.
    Begin,
    /// Closes an annotated sub-range.
    End,
    /// Placeholder for a malformed or unmatched bracket.
    Invalid,
}

/// Advisory annotation marking a sub-range of the access sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BracketNote {
    /// Bracket kind.
    pub kind: BracketKind,
    /// Index into the access sequence the bracket annotates.
    #[serde(rename = "where")]
    pub where_: usize,
    /// Human-readable label, e.g. `fetch` or `execute`.
    pub text: String,
}

/// Ordered record of everything one verified step touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AccessLog {
    /// Word accesses in occurrence order.
    pub accesses: Vec<WordAccess>,
    /// Bracket annotations in emission order.
    pub brackets: Vec<BracketNote>,
    /// Free-form notes.
    pub notes: Vec<String>,
}

impl AccessLog {
    /// Open a bracket at the current access position.
    pub fn begin(&mut self, text: impl Into<String>) {
        self.brackets.push(BracketNote {
            kind: BracketKind::Begin,
            where_: self.accesses.len(),
            text: text.into(),
        });
    }

    /// Close a bracket at the current access position.
    pub fn end(&mut self, text: impl Into<String>) {
        self.brackets.push(BracketNote {
            kind: BracketKind::End,
            where_: self.accesses.len(),
            text: text.into(),
        });
    }

    /// Append a free-form note.
    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }
}
