//! Triggers: a match kind, a pattern and the service to run on a match.

use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceExt};

use crate::session::Bot;

/// Type-erased handler stored inside a trigger.
pub type BoxedTriggerService = BoxCloneSyncService<Bot, (), BoxError>;

// ============================================================================
// TriggerKind
// ============================================================================

/// How a trigger's pattern is compared against message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Text starts with the pattern; the pattern is stripped.
    Prefix,
    /// Text ends with the pattern; the pattern is stripped.
    Suffix,
    /// Pattern occurs anywhere; text is passed unchanged.
    Keyword,
    /// Text equals the pattern.
    #[serde(rename = "fullmatch")]
    FullMatch,
}

impl TriggerKind {
    /// Returns the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Keyword => "keyword",
            Self::FullMatch => "fullmatch",
        }
    }

    /// Matches `text` against `pattern`, returning the text the handler sees.
    pub fn apply(self, pattern: &str, text: &str) -> Option<String> {
        match self {
            Self::Prefix => text.strip_prefix(pattern).map(str::to_owned),
            Self::Suffix => text.strip_suffix(pattern).map(str::to_owned),
            Self::Keyword => text.contains(pattern).then(|| text.to_owned()),
            Self::FullMatch => (text == pattern).then(|| text.to_owned()),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Trigger
// ============================================================================

/// An immutable `(kind, pattern, handler)` binding inside a module.
#[derive(Clone)]
pub struct Trigger {
    kind: TriggerKind,
    pattern: String,
    service: BoxedTriggerService,
}

impl Trigger {
    /// Creates a trigger around any `tower` service handling a [`Bot`].
    pub fn new<S>(kind: TriggerKind, pattern: impl Into<String>, service: S) -> Self
    where
        S: Service<Bot, Response = ()> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        Self {
            kind,
            pattern: pattern.into(),
            service: BoxCloneSyncService::new(service.map_err(Into::into)),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the handler's view of `text` if this trigger matches it.
    pub fn matches(&self, text: &str) -> Option<String> {
        self.kind.apply(&self.pattern, text)
    }

    /// Runs the handler to completion.
    pub fn call(&self, bot: Bot) -> BoxFuture<'static, Result<(), BoxError>> {
        self.service.clone().oneshot(bot).boxed()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern)
            .finish()
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// One pattern or several, as accepted by the `on_*` registration calls.
pub trait IntoPatterns {
    fn into_patterns(self) -> Vec<String>;
}

impl IntoPatterns for &str {
    fn into_patterns(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoPatterns for String {
    fn into_patterns(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoPatterns for &[&str] {
    fn into_patterns(self) -> Vec<String> {
        self.iter().map(|p| (*p).to_owned()).collect()
    }
}

impl<const N: usize> IntoPatterns for [&str; N] {
    fn into_patterns(self) -> Vec<String> {
        self.iter().map(|p| (*p).to_owned()).collect()
    }
}

impl IntoPatterns for Vec<&str> {
    fn into_patterns(self) -> Vec<String> {
        self.into_iter().map(str::to_owned).collect()
    }
}

impl IntoPatterns for Vec<String> {
    fn into_patterns(self) -> Vec<String> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_strips_exactly() {
        assert_eq!(
            TriggerKind::Prefix.apply("!roll ", "!roll 20").as_deref(),
            Some("20")
        );
        assert_eq!(TriggerKind::Prefix.apply("!roll ", "!rol 20"), None);
    }

    #[test]
    fn test_suffix_strips_exactly() {
        assert_eq!(
            TriggerKind::Suffix.apply(" pls", "help pls").as_deref(),
            Some("help")
        );
        assert_eq!(TriggerKind::Suffix.apply(" pls", "pls help"), None);
    }

    #[test]
    fn test_keyword_keeps_text() {
        assert_eq!(
            TriggerKind::Keyword.apply("cat", "my cat sleeps").as_deref(),
            Some("my cat sleeps")
        );
        assert_eq!(TriggerKind::Keyword.apply("dog", "my cat sleeps"), None);
    }

    #[test]
    fn test_fullmatch_requires_equality() {
        assert!(TriggerKind::FullMatch.apply("ping", "ping").is_some());
        assert!(TriggerKind::FullMatch.apply("ping", "ping ").is_none());
    }

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&TriggerKind::FullMatch).unwrap(),
            r#""fullmatch""#
        );
        assert_eq!(
            serde_json::from_str::<TriggerKind>(r#""prefix""#).unwrap(),
            TriggerKind::Prefix
        );
    }

    #[test]
    fn test_patterns_conversion() {
        assert_eq!("a".into_patterns(), vec!["a"]);
        assert_eq!(["a", "b"].into_patterns(), vec!["a", "b"]);
        assert_eq!(vec!["x".to_string()].into_patterns(), vec!["x"]);
    }
}
