use crate::RegistrationError;
use std::fmt;

/// Segment text used for an empty path segment (`//`).
pub(crate) const EMPTY_SEGMENT: &str = "/";

/// Name given to an anonymous wildcard (`{}`).
pub(crate) const ANONYMOUS_WILDCARD: &str = "$";

/// One `/`-separated part of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches exactly this string.
    Literal(String),
    /// Matches any single segment, binding it to this name.
    Wildcard(String),
}

impl Segment {
    /// The literal text or the wildcard name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) | Self::Wildcard(s) => s,
        }
    }

    /// True for [`Segment::Wildcard`].
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard(_))
    }

    fn parse(seg: &str) -> Self {
        let seg = seg.trim_matches(' ');
        if seg.is_empty() {
            return Self::Literal(EMPTY_SEGMENT.to_owned());
        }
        if seg.starts_with('{') && seg.ends_with('}') {
            let name = seg.trim_matches(|c: char| c == '{' || c == '}');
            if name.is_empty() {
                return Self::Wildcard(ANONYMOUS_WILDCARD.to_owned());
            }
            return Self::Wildcard(name.to_owned());
        }
        Self::Literal(seg.to_owned())
    }
}

/// Split a url into the segment strings the trie is keyed by. Leading and
/// trailing slashes and spaces are ignored, and an empty segment becomes
/// [`EMPTY_SEGMENT`].
pub(crate) fn split_url(url: &str) -> impl Iterator<Item = &str> {
    url.trim_matches(|c: char| c == ' ' || c == '/')
        .split('/')
        .map(|seg| match seg.trim_matches(' ') {
            "" => EMPTY_SEGMENT,
            seg => seg,
        })
}

/// A parsed route definition.
///
/// ```
/// use tcpchat::{Pattern, Segment};
///
/// let p = Pattern::parse("GET", "/user/{id}/description").unwrap();
/// assert_eq!(
///     p.segments(),
///     &[
///         Segment::Literal("user".into()),
///         Segment::Wildcard("id".into()),
///         Segment::Literal("description".into()),
///     ]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    method: String,
    url: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a method and url pattern. Fails if either is empty.
    pub fn parse(method: &str, url: &str) -> Result<Self, RegistrationError> {
        if method.is_empty() || url.is_empty() {
            return Err(RegistrationError::EmptyPattern);
        }

        let segments = url
            .trim_matches(|c: char| c == ' ' || c == '/')
            .split('/')
            .map(Segment::parse)
            .collect();

        Ok(Self {
            method: method.to_owned(),
            url: url.to_owned(),
            segments,
        })
    }

    /// The method the pattern was registered with.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The url the pattern was parsed from, unmodified.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the wildcard segments, left to right.
    pub fn wildcards(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|s| s.is_wildcard())
            .map(Segment::as_str)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
