//! Identifier naming conventions.
//!
//! Maps arbitrary Unicode identifiers (record keys, column and table names) to
//! identifiers that are safe to use in every output format and destination.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};

/// Separator used when flattening nested paths into one identifier.
pub const PATH_SEPARATOR: &str = "__";

/// Placeholder produced for identifiers that are empty after trimming.
pub const EMPTY_IDENTIFIER: &str = "_empty";

const TAG_LEN: usize = 8;

/// Smallest accepted `max_length`: one leading byte, `_` and the hash tag.
pub const MIN_MAX_LENGTH: usize = TAG_LEN + 2;

/// Supported naming conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// Lowercase ASCII `snake_case`.
    #[default]
    SnakeCase,
    /// Keep the identifier as given, only trimmed.
    Direct,
}

/// A naming convention plus an optional identifier length limit (in bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Naming {
    #[serde(default)]
    pub convention: NamingConvention,
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl Naming {
    #[must_use]
    pub const fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            max_length: None,
        }
    }

    #[must_use]
    pub const fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.max_length {
            Some(max_length) if max_length < MIN_MAX_LENGTH => Err(Error::InvalidConfig {
                details: Cow::Owned(format!(
                    "naming max_length must be at least {MIN_MAX_LENGTH}, got {max_length}"
                )),
            }),
            _ => Ok(()),
        }
    }

    /// Normalizes a single identifier.
    #[must_use]
    pub fn normalize_identifier(&self, identifier: &str) -> String {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return EMPTY_IDENTIFIER.to_string();
        }
        let normalized = match self.convention {
            NamingConvention::SnakeCase => to_snake_case(trimmed),
            NamingConvention::Direct => trimmed.to_string(),
        };
        match self.max_length {
            Some(max_length) if normalized.len() > max_length => {
                shorten_identifier(&normalized, identifier, max_length)
            }
            _ => normalized,
        }
    }

    /// Normalizes every part of a nested path and joins them with [`PATH_SEPARATOR`].
    #[must_use]
    pub fn normalize_path(&self, parts: &[&str]) -> String {
        let joined = parts
            .iter()
            .map(|part| {
                Self {
                    max_length: None,
                    ..*self
                }
                .normalize_identifier(part)
            })
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR);
        match self.max_length {
            Some(max_length) if joined.len() > max_length => {
                shorten_identifier(&joined, &parts.join(PATH_SEPARATOR), max_length)
            }
            _ => joined,
        }
    }
}

fn camel_break_upper() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^_])([A-Z][a-z]+)").expect("valid regex"))
}

fn camel_break_lower() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"))
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]+").expect("valid regex"))
}

fn underscores() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("valid regex"))
}

fn reduce_alphabet(c: char) -> char {
    match c {
        '+' | '*' => 'x',
        '-' => '_',
        '@' => 'a',
        '|' => 'l',
        other => other,
    }
}

fn to_snake_case(identifier: &str) -> String {
    let reduced: String = identifier.chars().map(reduce_alphabet).collect();
    let broken = camel_break_upper().replace_all(&reduced, "${1}_${2}");
    let broken = camel_break_lower().replace_all(&broken, "${1}_${2}");
    let lowered = broken.to_lowercase();
    let mut ident = non_alphanumeric().replace_all(&lowered, "_").into_owned();

    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }

    // trailing underscores would be collapsed or stripped by destinations
    let stripped_len = ident.trim_end_matches('_').len();
    if stripped_len > 0 && stripped_len < ident.len() {
        let trailing = ident.len() - stripped_len;
        ident.truncate(stripped_len);
        ident.extend(std::iter::repeat('x').take(trailing));
    }

    underscores().replace_all(&ident, "_").into_owned()
}

/// Truncates `normalized` on a grapheme boundary and appends a stable tag
/// derived from the original identifier, so that distinct long identifiers
/// stay distinct.
///
/// Limits below [`MIN_MAX_LENGTH`] are raised to it.
fn shorten_identifier(normalized: &str, original: &str, max_length: usize) -> String {
    let tag = format!("{:0width$x}", xxh3_64(original.as_bytes()) as u32, width = TAG_LEN);
    let budget = max_length.max(MIN_MAX_LENGTH) - TAG_LEN - 1;
    let mut prefix = String::with_capacity(budget);
    for grapheme in normalized.graphemes(true) {
        if prefix.len() + grapheme.len() > budget {
            break;
        }
        prefix.push_str(grapheme);
    }
    format!("{prefix}_{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snake(ident: &str) -> String {
        Naming::default().normalize_identifier(ident)
    }

    #[test]
    fn snake_case_basic() {
        assert_eq!(snake("Natural Disasters"), "natural_disasters");
        assert_eq!(snake("camelCase"), "camel_case");
        assert_eq!(snake("HTTPServer"), "http_server");
        assert_eq!(snake("already_snake"), "already_snake");
        assert_eq!(snake("  padded  "), "padded");
    }

    #[test]
    fn snake_case_symbols_and_digits() {
        assert_eq!(snake("a+b"), "axb");
        assert_eq!(snake("a-b"), "a_b");
        assert_eq!(snake("@home"), "ahome");
        assert_eq!(snake("123abc"), "_123abc");
        assert_eq!(snake("price__usd"), "price_usd");
        assert_eq!(snake("value_"), "valuex");
        assert_eq!(snake("weird!!name"), "weird_name");
    }

    #[test]
    fn snake_case_unicode_becomes_ascii() {
        let normalized = snake("Ünïcödé Column");
        assert!(normalized.is_ascii());
        assert!(normalized.ends_with("column"));
    }

    #[test]
    fn empty_identifier_placeholder() {
        assert_eq!(snake("   "), EMPTY_IDENTIFIER);
        assert_eq!(
            Naming::new(NamingConvention::Direct).normalize_identifier(""),
            EMPTY_IDENTIFIER
        );
    }

    #[test]
    fn direct_keeps_unicode() {
        let naming = Naming::new(NamingConvention::Direct);
        assert_eq!(naming.normalize_identifier(" Größe "), "Größe");
    }

    #[test]
    fn shortening_is_bounded_and_stable() {
        let naming = Naming::default().with_max_length(20);
        let long = "a_very_long_column_name_that_exceeds_the_limit";
        let first = naming.normalize_identifier(long);
        assert!(first.len() <= 20);
        assert_eq!(first, naming.normalize_identifier(long));
        let other = naming.normalize_identifier("a_very_long_column_name_that_differs");
        assert_ne!(first, other);
    }

    #[test]
    fn shortening_respects_graphemes() {
        let naming = Naming::new(NamingConvention::Direct).with_max_length(16);
        let shortened = naming.normalize_identifier("ééééééééééééé");
        assert!(shortened.len() <= 16);
        assert!(shortened.starts_with("ééé_"));
    }

    #[test]
    fn tiny_limits_are_rejected_and_clamped() {
        let tiny = Naming::default().with_max_length(4);
        assert!(matches!(tiny.validate(), Err(Error::InvalidConfig { .. })));
        assert!(Naming::default().with_max_length(MIN_MAX_LENGTH).validate().is_ok());
        assert!(Naming::default().validate().is_ok());

        let shortened = tiny.normalize_identifier("some_long_identifier");
        assert_eq!(shortened.len(), MIN_MAX_LENGTH);
        assert!(shortened.starts_with("s_"));

        let zero = Naming::default().with_max_length(0);
        assert!(!zero.normalize_identifier("abc").is_empty());
    }

    #[test]
    fn path_joins_parts() {
        let naming = Naming::default();
        assert_eq!(naming.normalize_path(&["Parent", "childName"]), "parent__child_name");
    }
}
