//! Token substitution for configured strings
//!
//! Header values and the request path may reference the invalidation being
//! processed, e.g. `X-Purge-Tag: [invalidation:expression]`.

use crate::invalidation::Invalidation;

/// Values available to token replacement
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    pub invalidation: &'a Invalidation,
}

impl<'a> TokenContext<'a> {
    pub fn new(invalidation: &'a Invalidation) -> Self {
        Self { invalidation }
    }
}

/// Trait for interpolating per-invalidation values into a template
pub trait TokenReplacer: Send + Sync {
    fn replace(&self, template: &str, context: &TokenContext<'_>) -> String;
}

/// Replaces the `[invalidation:*]` token group.
///
/// Supports `[invalidation:expression]` and `[invalidation:type]`; any other
/// token is left in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidationTokens;

impl InvalidationTokens {
    pub fn new() -> Self {
        Self
    }
}

const TOKEN_PREFIX: &str = "[invalidation:";

impl TokenReplacer for InvalidationTokens {
    /// Single left-to-right pass; substituted text is never scanned again.
    fn replace(&self, template: &str, context: &TokenContext<'_>) -> String {
        let mut replaced = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(TOKEN_PREFIX) {
            replaced.push_str(&rest[..start]);
            let candidate = &rest[start..];

            let value = match candidate.find(']') {
                Some(end) => match &candidate[TOKEN_PREFIX.len()..end] {
                    "expression" => Some((end, context.invalidation.expression())),
                    "type" => Some((end, context.invalidation.kind().as_str())),
                    _ => None,
                },
                None => None,
            };

            match value {
                Some((end, value)) => {
                    replaced.push_str(value);
                    rest = &candidate[end + 1..];
                }
                None => {
                    replaced.push_str(TOKEN_PREFIX);
                    rest = &candidate[TOKEN_PREFIX.len()..];
                }
            }
        }

        replaced.push_str(rest);
        replaced
    }
}
