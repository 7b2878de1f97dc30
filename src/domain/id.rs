//! Node identifiers and id allocation.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::error::{StructuralRule, TreeError, TreeResult};

pub const ID_LENGTH: usize = 5;
pub const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Id of the tree root.
pub const ROOT_ID: &str = "00000";

/// Five character `[A-Za-z0-9]` node id, unique within one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn parse(raw: &str) -> TreeResult<Self> {
        let raw = raw.strip_prefix('#').unwrap_or(raw);
        if Self::is_valid(raw) {
            Ok(NodeId(raw.to_string()))
        } else {
            Err(TreeError::structural(
                format!("#{raw}"),
                StructuralRule::InvalidId { id: raw.into() },
            ))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        raw.len() == ID_LENGTH && raw.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    pub fn root() -> Self {
        NodeId(ROOT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate ids. The tree checks uniqueness and retries.
pub trait IdSource: fmt::Debug {
    fn candidate(&mut self) -> NodeId;
}

/// Draws ids uniformly from the id alphabet.
#[derive(Debug)]
pub struct RandomIdSource {
    rng: StdRng,
}

impl RandomIdSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIdSource {
    fn candidate(&mut self) -> NodeId {
        let id: String = (0..ID_LENGTH)
            .map(|_| ID_ALPHABET[self.rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        NodeId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_hash_prefix_when_parsing_then_strips_it() {
        let id = NodeId::parse("#abc12").unwrap();
        assert_eq!(id.as_str(), "abc12");
    }

    #[test]
    fn given_wrong_length_or_symbols_when_parsing_then_rejects() {
        assert!(NodeId::parse("abcd").is_err());
        assert!(NodeId::parse("abcdef").is_err());
        assert!(NodeId::parse("ab-de").is_err());
    }

    #[test]
    fn given_seeded_source_when_drawing_then_ids_are_valid_and_repeatable() {
        let mut a = RandomIdSource::seeded(7);
        let mut b = RandomIdSource::seeded(7);
        for _ in 0..20 {
            let id = a.candidate();
            assert!(NodeId::is_valid(id.as_str()));
            assert_eq!(id, b.candidate());
        }
    }
}
