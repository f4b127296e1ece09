//! Structural validation of single candidates
//!
//! Pure and synchronous: no storage access, same input gives the same verdict.
//! Rules are checked in order and the first failure is reported.

use std::collections::HashSet;

use super::content_hasher::normalize;
use crate::models::{Candidate, FlashcardCandidate, TestCandidate};

pub const MIN_STEM_CHARS: usize = 20;
pub const REQUIRED_OPTIONS: usize = 4;
pub const MIN_RATIONALE_CHARS: usize = 10;
pub const MIN_FLASHCARD_SIDE_CHARS: usize = 5;

/// Catch-all options that make a question guessable
const BANNED_PHRASES: [&str; 4] = [
    "all of the above",
    "none of the above",
    "both of the above",
    "neither of the above",
];

const BANNED_EXACT_OPTIONS: [&str; 2] = ["all", "none"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Validate one candidate
pub fn validate(candidate: &Candidate) -> Verdict {
    let result = match candidate {
        Candidate::Test(test) => validate_test(test),
        Candidate::Flashcard(card) => validate_flashcard(card),
    };

    match result {
        Ok(()) => Verdict::Valid,
        Err(reason) => {
            tracing::debug!(candidate = %candidate.label(), reason = %reason, "Candidate rejected");
            Verdict::Invalid(reason)
        }
    }
}

fn validate_test(test: &TestCandidate) -> Result<(), String> {
    let stem_chars = normalize(&test.stem).chars().count();
    if stem_chars < MIN_STEM_CHARS {
        return Err(format!(
            "stem too short ({} chars, minimum {})",
            stem_chars, MIN_STEM_CHARS
        ));
    }

    if test.options.len() != REQUIRED_OPTIONS {
        return Err(format!(
            "expected {} options, got {}",
            REQUIRED_OPTIONS,
            test.options.len()
        ));
    }

    if test.answer.index() >= test.options.len() {
        return Err(format!("answer {} has no matching option", test.answer.as_str()));
    }

    let rationale_chars = test.rationale.trim().chars().count();
    if rationale_chars < MIN_RATIONALE_CHARS {
        return Err(format!(
            "rationale too short ({} chars, minimum {})",
            rationale_chars, MIN_RATIONALE_CHARS
        ));
    }

    let normalized: Vec<String> = test.options.iter().map(|o| normalize(o)).collect();

    for option in &normalized {
        if let Some(phrase) = BANNED_PHRASES.iter().find(|p| option.contains(*p)) {
            return Err(format!("option uses banned phrase \"{}\"", phrase));
        }
        if BANNED_EXACT_OPTIONS.contains(&option.as_str()) {
            return Err(format!("option \"{}\" is a catch-all", option));
        }
    }

    if normalized.iter().any(|o| o.is_empty()) {
        return Err("option is empty".to_string());
    }

    let distinct: HashSet<&str> = normalized.iter().map(String::as_str).collect();
    if distinct.len() != normalized.len() {
        return Err("options are not distinct".to_string());
    }

    Ok(())
}

fn validate_flashcard(card: &FlashcardCandidate) -> Result<(), String> {
    for (side, text) in [("front", card.front.trim()), ("back", card.back.trim())] {
        if text.is_empty() {
            return Err(format!("{} is empty", side));
        }
        let chars = text.chars().count();
        if chars < MIN_FLASHCARD_SIDE_CHARS {
            return Err(format!(
                "{} too short ({} chars, minimum {})",
                side, chars, MIN_FLASHCARD_SIDE_CHARS
            ));
        }
    }

    for (side, text) in [("front", card.front.trim()), ("back", card.back.trim())] {
        if text.contains('\n') || text.contains('\r') {
            return Err(format!("{} spans multiple lines", side));
        }
    }

    if !card.tags.iter().any(|t| !t.trim().is_empty()) {
        return Err("no tags".to_string());
    }

    Ok(())
}
