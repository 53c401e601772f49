//! Invalidations and their lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::StateError;

/// Error type for parsing an invalidation kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError(String);

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported invalidation kind: {}", self.0)
    }
}

impl std::error::Error for ParseKindError {}

/// Declared category of an invalidation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    /// Cache tag, e.g. `node:1`
    Tag,
    /// Absolute URL, e.g. `https://example.com/node/1`
    Url,
    /// Absolute URL with `*` wildcards
    WildcardUrl,
    /// Path without leading slash or hostname, e.g. `news/article-1`
    Path,
    /// Path with `*` wildcards, e.g. `news/*`
    WildcardPath,
    /// Bare hostname
    Domain,
    /// Proxy-native regular expression over `req.url`
    Regex,
    /// Complete ban expression passed through untouched
    Raw,
    /// Every cached object
    Everything,
}

impl InvalidationKind {
    /// Every kind, in the order the purger advertises them
    pub const ALL: [InvalidationKind; 9] = [
        InvalidationKind::Url,
        InvalidationKind::WildcardUrl,
        InvalidationKind::Tag,
        InvalidationKind::Everything,
        InvalidationKind::WildcardPath,
        InvalidationKind::Regex,
        InvalidationKind::Path,
        InvalidationKind::Domain,
        InvalidationKind::Raw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationKind::Tag => "tag",
            InvalidationKind::Url => "url",
            InvalidationKind::WildcardUrl => "wildcardurl",
            InvalidationKind::Path => "path",
            InvalidationKind::WildcardPath => "wildcardpath",
            InvalidationKind::Domain => "domain",
            InvalidationKind::Regex => "regex",
            InvalidationKind::Raw => "raw",
            InvalidationKind::Everything => "everything",
        }
    }
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvalidationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Processing state of an invalidation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvalidationState {
    #[default]
    Fresh,
    Processing,
    Succeeded,
    Failed,
}

impl InvalidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationState::Fresh => "FRESH",
            InvalidationState::Processing => "PROCESSING",
            InvalidationState::Succeeded => "SUCCEEDED",
            InvalidationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvalidationState::Succeeded | InvalidationState::Failed)
    }
}

impl fmt::Display for InvalidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of "purge this" work.
///
/// Owned by the orchestrator and lent to the purger for the duration of a
/// batch. The purger only moves it forward: Fresh/Processing to Processing,
/// then Processing to exactly one of Succeeded or Failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invalidation {
    id: u64,
    kind: InvalidationKind,
    expression: String,
    #[serde(default)]
    state: InvalidationState,
}

impl Invalidation {
    pub fn new(id: u64, kind: InvalidationKind, expression: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            expression: expression.into(),
            state: InvalidationState::Fresh,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> InvalidationKind {
        self.kind
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn state(&self) -> InvalidationState {
        self.state
    }

    /// Claim the invalidation for processing
    pub fn start_processing(&mut self) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::AlreadyFinished {
                id: self.id,
                state: self.state,
            });
        }
        self.state = InvalidationState::Processing;
        Ok(())
    }

    /// Mark a processing invalidation as succeeded
    pub fn succeed(&mut self) {
        self.finish(InvalidationState::Succeeded);
    }

    /// Mark a processing invalidation as failed
    pub fn fail(&mut self) {
        self.finish(InvalidationState::Failed);
    }

    fn finish(&mut self, state: InvalidationState) {
        if self.state != InvalidationState::Processing {
            warn!(
                "Ignoring {} transition for invalidation {} in state {}",
                state, self.id, self.state
            );
            return;
        }
        self.state = state;
    }

    /// Return a failed invalidation to the queue.
    ///
    /// Used by the orchestrator when it re-offers work on a later cycle;
    /// the purger itself never calls this.
    pub fn retry(&mut self) {
        if self.state == InvalidationState::Failed {
            self.state = InvalidationState::Fresh;
        }
    }
}
