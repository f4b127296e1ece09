//! Content normalization and hashing
//!
//! Two candidates are duplicates when their canonical forms hash equal:
//! - tests: `normalize(stem)` (option order and wording don't matter)
//! - flashcards: `normalize(front)` + U+001F + `normalize(back)`

use sha2::{Digest, Sha256};

use crate::models::{Candidate, HashAlgorithm};

/// Separates flashcard sides in the canonical form
const UNIT_SEPARATOR: char = '\u{1f}';

/// Lowercase, collapse whitespace runs to one space, trim
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical form of a test stem
pub fn canonical_test(stem: &str) -> String {
    normalize(stem)
}

/// Canonical form of a flashcard
pub fn canonical_flashcard(front: &str, back: &str) -> String {
    let mut canonical = normalize(front);
    canonical.push(UNIT_SEPARATOR);
    canonical.push_str(&normalize(back));
    canonical
}

/// Canonical form of any candidate
pub fn canonical_form(candidate: &Candidate) -> String {
    match candidate {
        Candidate::Test(test) => canonical_test(&test.stem),
        Candidate::Flashcard(card) => canonical_flashcard(&card.front, &card.back),
    }
}

/// Deterministic content fingerprinting
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Hash an already-canonical string
    pub fn hash_canonical(&self, canonical: &str) -> String {
        match self.algorithm {
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(canonical.as_bytes())),
            HashAlgorithm::Rolling32 => {
                let hash = canonical
                    .bytes()
                    .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
                format!("{:08x}", hash)
            }
        }
    }

    /// Content hash of a candidate
    pub fn hash_candidate(&self, candidate: &Candidate) -> String {
        self.hash_canonical(&canonical_form(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerLetter, Difficulty, FlashcardCandidate, TestCandidate};

    fn test_with(stem: &str, options: [&str; 4]) -> Candidate {
        Candidate::Test(TestCandidate {
            stem: stem.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer: AnswerLetter::A,
            rationale: "rationale text".to_string(),
            section: String::new(),
            difficulty: Difficulty::Medium,
        })
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  What IS\tthe\n\nanswer?  "), "what is the answer?");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_sha256_known_value() {
        let hasher = ContentHasher::new(HashAlgorithm::Sha256);
        assert_eq!(
            hasher.hash_canonical(&normalize("  ABC ")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_rolling32_known_value() {
        let hasher = ContentHasher::new(HashAlgorithm::Rolling32);
        assert_eq!(hasher.hash_canonical("abc"), "00017862");
        assert_eq!(hasher.hash_canonical("").len(), 8);
    }

    #[test]
    fn test_reordered_options_hash_equal() {
        let hasher = ContentHasher::default();
        let a = test_with("Which gas do plants absorb?", ["CO2", "O2", "N2", "H2"]);
        let b = test_with("which  gas do plants ABSORB?", ["H2", "N2", "O2", "CO2"]);
        assert_eq!(hasher.hash_candidate(&a), hasher.hash_candidate(&b));
    }

    #[test]
    fn test_flashcard_sides_are_separated() {
        let hasher = ContentHasher::default();
        let card = |front: &str, back: &str| {
            Candidate::Flashcard(FlashcardCandidate {
                front: front.to_string(),
                back: back.to_string(),
                tags: vec![],
            })
        };

        // Moving a word across the boundary changes the hash
        assert_ne!(
            hasher.hash_candidate(&card("cell wall", "made of cellulose")),
            hasher.hash_candidate(&card("cell", "wall made of cellulose"))
        );
        assert_eq!(
            hasher.hash_candidate(&card("Cell Wall", "made of  cellulose")),
            hasher.hash_candidate(&card("cell wall", "made of cellulose"))
        );
    }
}
