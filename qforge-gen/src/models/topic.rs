//! Topic content as provided by the topic source

use serde::{Deserialize, Serialize};

/// Target profile of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTier {
    /// Exam topics: the tests count must hit the target exactly
    Core,
    /// Extra material: the tests target is a minimum
    Supplementary,
}

impl ContentTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentTier::Core => "core",
            ContentTier::Supplementary => "supplementary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "core" => Some(ContentTier::Core),
            "supplementary" => Some(ContentTier::Supplementary),
            _ => None,
        }
    }

    /// Whether any tests shortfall is a critical audit failure
    pub fn requires_exact_tests(&self) -> bool {
        matches!(self, ContentTier::Core)
    }
}

/// Narrative content a topic's candidates are grounded in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicContent {
    pub topic_id: String,
    pub title: String,
    pub body: String,
    /// Section headings, passed to the generator as hints
    pub sections: Vec<String>,
    pub tier: ContentTier,
}
