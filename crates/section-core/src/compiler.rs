//! Ban expression compiler
//!
//! Translates an invalidation into the Varnish ban expression understood by
//! the Section control plane. Compilation is pure: no I/O and no state
//! beyond the optional site name used to scope expressions on proxies that
//! serve several sites.

use std::fmt;
use url::Url;

use crate::error::CompileError;
use crate::hash;
use crate::invalidation::InvalidationKind;

/// Characters with a meaning in Varnish regular expressions (or in the
/// surrounding quoted string) that must be matched literally. `*` is
/// handled separately as a wildcard.
const REGEX_RESERVED: &[char] = &[
    '[', ']', '{', '}', '(', ')', '+', '?', '"', '.', ',', '\\', '^', '$', '|', '#',
];

/// Matches every object with a non-empty response
const EVERYTHING: &str = "obj.status != 0";

/// A compiled ban expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanExpression(String);

impl BanExpression {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode for use as a query parameter value
    pub fn url_encoded(&self) -> String {
        url::form_urlencoded::byte_serialize(self.0.as_bytes()).collect()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BanExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compiles invalidation expressions into ban expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionCompiler<'a> {
    site_name: Option<&'a str>,
}

impl<'a> ExpressionCompiler<'a> {
    /// Create a compiler, scoped to `site_name` when it is non-empty
    pub fn new(site_name: Option<&'a str>) -> Self {
        Self {
            site_name: site_name.filter(|name| !name.is_empty()),
        }
    }

    pub fn site_name(&self) -> Option<&'a str> {
        self.site_name
    }

    /// Compile one expression of the given kind
    pub fn compile(
        &self,
        kind: InvalidationKind,
        expression: &str,
    ) -> Result<BanExpression, CompileError> {
        let compiled = match kind {
            InvalidationKind::Tag => self.tag(expression),
            InvalidationKind::Everything => self.everything(),
            InvalidationKind::Url | InvalidationKind::WildcardUrl => self.url(expression)?,
            InvalidationKind::Path | InvalidationKind::WildcardPath => self.path(expression),
            InvalidationKind::Domain => self.domain(expression),
            InvalidationKind::Regex => self.regex(expression),
            InvalidationKind::Raw => expression.to_string(),
        };
        Ok(BanExpression(compiled))
    }

    fn tag(&self, tag: &str) -> String {
        let expression = format!("obj.http.Section-Cache-Tags ~ \"{}\"", hash::cache_tag(tag));
        self.scoped(expression)
    }

    fn everything(&self) -> String {
        self.scoped(EVERYTHING.to_string())
    }

    /// The scheme is matched exactly: purging `https://x/` leaves the
    /// `http://x/` variant cached.
    ///
    /// The path is matched in its normalised form: dot segments are
    /// resolved and characters such as spaces, quotes and braces are
    /// percent-encoded, which is how clients put them on the wire.
    fn url(&self, expression: &str) -> Result<String, CompileError> {
        let parsed = Url::parse(expression).map_err(|e| {
            CompileError::InvalidExpression(format!("{}: {}", expression, e))
        })?;

        let host = parsed.host_str().ok_or_else(|| {
            CompileError::InvalidExpression(format!("{}: missing host", expression))
        })?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        if let Some(fragment) = parsed.fragment().filter(|f| !f.is_empty()) {
            target.push('#');
            target.push_str(fragment);
        }

        Ok(format!(
            "req.http.X-Forwarded-Proto == \"{}\" && req.http.host == \"{}\" && req.url ~ \"^{}$\"",
            parsed.scheme(),
            host,
            escape_pattern(&target)
        ))
    }

    fn path(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.scoped(format!("req.url ~ \"^/{}$\"", escape_pattern(path)))
    }

    fn domain(&self, domain: &str) -> String {
        format!("req.http.host == \"{}\"", domain)
    }

    /// The caller supplies a proxy-native pattern, so nothing is quoted and
    /// the site filter keeps its legacy unquoted form.
    fn regex(&self, pattern: &str) -> String {
        let mut expression = format!("req.url ~ {}", pattern);
        if let Some(site) = self.site_name {
            expression.push_str("&& req.http.host == ");
            expression.push_str(site);
        }
        expression
    }

    fn scoped(&self, mut expression: String) -> String {
        if let Some(site) = self.site_name {
            expression.push_str(" && req.http.host == \"");
            expression.push_str(site);
            expression.push('"');
        }
        expression
    }
}

/// Escape reserved regex characters and turn `*` into `.*`
pub fn escape_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() * 2);
    for ch in input.chars() {
        match ch {
            '*' => escaped.push_str(".*"),
            c if REGEX_RESERVED.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}
