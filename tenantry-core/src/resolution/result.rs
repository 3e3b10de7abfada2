//! Resolution outcome types.

use serde::{Deserialize, Serialize};

/// Where a resolution result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Route,
    Host,
    Header,
    QueryString,
    Claim,
    /// Statically configured fallback tenant
    Default,
    /// Host-supplied delegate
    Custom,
    /// Aggregated by the composite strategy
    Composite,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Route => write!(f, "route"),
            Self::Host => write!(f, "host"),
            Self::Header => write!(f, "header"),
            Self::QueryString => write!(f, "query_string"),
            Self::Claim => write!(f, "claim"),
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// How trustworthy a resolved id is. Ordered `None < Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// Outcome of one resolution attempt.
///
/// Exactly one of [`is_resolved`](Self::is_resolved),
/// [`is_ambiguous`](Self::is_ambiguous) and [`is_not_found`](Self::is_not_found)
/// holds, determined by the number of unique candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    source: ResolutionSource,
    confidence: Confidence,
    candidates: Vec<String>,
}

impl ResolutionResult {
    /// Zero-candidate result
    pub fn not_found(source: ResolutionSource) -> Self {
        Self {
            source,
            confidence: Confidence::None,
            candidates: Vec::new(),
        }
    }

    /// Single-candidate result
    pub fn resolved(
        source: ResolutionSource,
        tenant_id: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self::from_candidates(source, [tenant_id.into()], confidence)
    }

    /// Build a result from raw candidates.
    ///
    /// Candidates are trimmed, empty ones dropped and duplicates removed
    /// case-insensitively (first spelling wins). More than one remaining
    /// candidate downgrades the confidence to [`Confidence::Low`]; none
    /// yields a not-found result.
    pub fn from_candidates<I, S>(source: ResolutionSource, candidates: I, confidence: Confidence) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique = CandidateSet::new();
        for candidate in candidates {
            unique.insert(candidate.as_ref());
        }
        Self::from_set(source, unique, confidence)
    }

    pub(crate) fn from_set(
        source: ResolutionSource,
        set: CandidateSet,
        confidence: Confidence,
    ) -> Self {
        let candidates = set.into_vec();
        let confidence = match candidates.len() {
            0 => Confidence::None,
            1 => confidence,
            _ => Confidence::Low,
        };
        Self {
            source,
            confidence,
            candidates,
        }
    }

    pub fn source(&self) -> ResolutionSource {
        self.source
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Unique candidates in discovery order
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Exactly one candidate
    pub fn is_resolved(&self) -> bool {
        self.candidates.len() == 1
    }

    /// More than one candidate
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }

    /// No candidates
    pub fn is_not_found(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The usable tenant id, present only when resolved
    pub fn tenant_id(&self) -> Option<&str> {
        if self.is_resolved() {
            self.candidates.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// Ordered, case-insensitively unique candidate ids.
#[derive(Debug, Default, Clone)]
pub(crate) struct CandidateSet {
    items: Vec<String>,
}

impl CandidateSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty()
            || self
                .items
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(candidate))
        {
            return false;
        }
        self.items.push(candidate.to_string());
        true
    }

    pub(crate) fn extend<'a>(&mut self, candidates: impl IntoIterator<Item = &'a String>) {
        for candidate in candidates {
            self.insert(candidate);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.items
    }
}
