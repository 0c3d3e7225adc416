//! Configuration options for JSON Light reading and writing.
//!
//! This module provides the types that configure a reader or writer context:
//!
//! - [`JsonLightOptions`]: Main configuration struct
//! - [`MetadataLevel`]: How much type and link information is written
//! - [`UndeclaredPropertyBehavior`]: What the reader does with properties the model does not declare
//! - [`AnnotationFilter`]: Which custom instance annotations are read and written
//! - [`MessageKind`]: Whether the payload is a request or a response
//!
//! ## Examples
//!
//! ```rust
//! use odata_json_light::{JsonLightOptions, MetadataLevel, UndeclaredPropertyBehavior};
//!
//! let options = JsonLightOptions::minimal()
//!     .with_undeclared_property_behavior(UndeclaredPropertyBehavior::IgnoreAndDiscard)
//!     .with_omit_odata_prefix(true);
//!
//! assert_eq!(options.metadata_level, MetadataLevel::Minimal);
//! assert!(options.omit_odata_prefix);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Metadata verbosity of a JSON Light payload.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::MetadataLevel;
///
/// assert_eq!(MetadataLevel::Full.as_str(), "full");
/// assert_eq!("nometadata".parse::<MetadataLevel>().unwrap(), MetadataLevel::None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MetadataLevel {
    Full,
    #[default]
    Minimal,
    None,
}

impl MetadataLevel {
    /// Returns the `odata.metadata` media type parameter value for this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetadataLevel::Full => "full",
            MetadataLevel::Minimal => "minimal",
            MetadataLevel::None => "none",
        }
    }
}

impl fmt::Display for MetadataLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "fullmetadata" => Ok(MetadataLevel::Full),
            "minimal" | "minimalmetadata" => Ok(MetadataLevel::Minimal),
            "none" | "nometadata" => Ok(MetadataLevel::None),
            other => Err(Error::custom(format!("unknown metadata level '{}'", other))),
        }
    }
}

/// Reader policy for properties a closed structured type does not declare.
///
/// Open types always keep undeclared properties as dynamic properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UndeclaredPropertyBehavior {
    /// Fail the read with [`Error::UndeclaredProperty`].
    #[default]
    Fail,
    /// Skip the property's value, including any nested structure.
    IgnoreAndDiscard,
    /// Materialize the property as if the type were open.
    KeepAsOpen,
}

/// Whether the payload travels in a request or a response.
///
/// Requests carry no context URL, so a collection in a request must always
/// have a determinable type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MessageKind {
    Request,
    #[default]
    Response,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FilterPattern {
    pattern: String,
    exclude: bool,
}

impl FilterPattern {
    /// Specificity used to break ties: exact names beat namespace wildcards, which beat `*`.
    fn specificity(&self, name: &str) -> Option<usize> {
        if self.pattern == "*" {
            return Some(0);
        }
        if let Some(namespace) = self.pattern.strip_suffix(".*") {
            let matches = name
                .strip_prefix(namespace)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false);
            return matches.then_some(1 + namespace.len());
        }
        (self.pattern == name).then_some(usize::MAX)
    }
}

/// Include/exclude filter for custom instance annotations.
///
/// Parsed from the `odata.include-annotations` preference syntax: a comma
/// separated list of `*`, `namespace.*` or `namespace.term` patterns, each
/// optionally prefixed with `-` to exclude. The most specific matching pattern
/// decides; on a tie, exclusion wins.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::AnnotationFilter;
///
/// let filter: AnnotationFilter = "*,-Secret.*".parse().unwrap();
/// assert!(filter.matches("Display.Title"));
/// assert!(!filter.matches("Secret.Key"));
///
/// let none = AnnotationFilter::none();
/// assert!(!none.matches("Display.Title"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationFilter {
    patterns: Vec<FilterPattern>,
}

impl AnnotationFilter {
    /// A filter that includes every annotation.
    #[must_use]
    pub fn all() -> Self {
        AnnotationFilter {
            patterns: vec![FilterPattern {
                pattern: "*".to_string(),
                exclude: false,
            }],
        }
    }

    /// A filter that includes nothing.
    #[must_use]
    pub fn none() -> Self {
        AnnotationFilter {
            patterns: Vec::new(),
        }
    }

    /// Returns `true` if an annotation term name (without the leading `@`) passes the filter.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let name = name.strip_prefix('@').unwrap_or(name);
        let mut best: Option<(usize, bool)> = None;
        for pattern in &self.patterns {
            if let Some(score) = pattern.specificity(name) {
                best = match best {
                    Some((s, excl)) if s > score || (s == score && excl) => Some((s, excl)),
                    _ => Some((score, pattern.exclude)),
                };
            }
        }
        matches!(best, Some((_, false)))
    }
}

impl Default for AnnotationFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for AnnotationFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for raw in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (exclude, pattern) = match raw.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let valid = pattern == "*"
                || (!pattern.starts_with('.') && pattern.contains('.') && !pattern.contains(' '));
            if !valid {
                return Err(Error::custom(format!(
                    "invalid annotation filter pattern '{}'",
                    raw
                )));
            }
            patterns.push(FilterPattern {
                pattern: pattern.to_string(),
                exclude,
            });
        }
        Ok(AnnotationFilter { patterns })
    }
}

/// Configuration options for a JSON Light reader or writer context.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::{JsonLightOptions, MetadataLevel};
///
/// // Defaults: minimal metadata, fail on undeclared properties, response payload
/// let options = JsonLightOptions::new();
/// assert_eq!(options.metadata_level, MetadataLevel::Minimal);
///
/// // Full metadata with IEEE754-compatible Int64/Decimal encoding
/// let options = JsonLightOptions::full().with_ieee754_compatible(true);
/// assert!(options.ieee754_compatible);
/// ```
#[derive(Clone, Debug)]
pub struct JsonLightOptions {
    pub metadata_level: MetadataLevel,
    pub undeclared_property_behavior: UndeclaredPropertyBehavior,
    pub annotation_filter: AnnotationFilter,
    pub omit_odata_prefix: bool,
    pub ieee754_compatible: bool,
    pub message_kind: MessageKind,
    pub max_nesting_depth: usize,
}

impl Default for JsonLightOptions {
    fn default() -> Self {
        JsonLightOptions {
            metadata_level: MetadataLevel::default(),
            undeclared_property_behavior: UndeclaredPropertyBehavior::default(),
            annotation_filter: AnnotationFilter::default(),
            omit_odata_prefix: false,
            ieee754_compatible: false,
            message_kind: MessageKind::default(),
            max_nesting_depth: 100,
        }
    }
}

impl JsonLightOptions {
    /// Creates default options (minimal metadata).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options for full-metadata payloads.
    #[must_use]
    pub fn full() -> Self {
        Self::new().with_metadata_level(MetadataLevel::Full)
    }

    /// Creates options for minimal-metadata payloads.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new().with_metadata_level(MetadataLevel::Minimal)
    }

    /// Creates options for no-metadata payloads.
    #[must_use]
    pub fn none() -> Self {
        Self::new().with_metadata_level(MetadataLevel::None)
    }

    #[must_use]
    pub fn with_metadata_level(mut self, level: MetadataLevel) -> Self {
        self.metadata_level = level;
        self
    }

    #[must_use]
    pub fn with_undeclared_property_behavior(mut self, behavior: UndeclaredPropertyBehavior) -> Self {
        self.undeclared_property_behavior = behavior;
        self
    }

    #[must_use]
    pub fn with_annotation_filter(mut self, filter: AnnotationFilter) -> Self {
        self.annotation_filter = filter;
        self
    }

    /// Spells reserved annotations `@type` instead of `@odata.type` when writing.
    ///
    /// Readers accept both spellings regardless of this flag.
    #[must_use]
    pub fn with_omit_odata_prefix(mut self, omit: bool) -> Self {
        self.omit_odata_prefix = omit;
        self
    }

    /// Writes Int64 and Decimal values as JSON strings.
    #[must_use]
    pub fn with_ieee754_compatible(mut self, compatible: bool) -> Self {
        self.ieee754_compatible = compatible;
        self
    }

    #[must_use]
    pub fn with_message_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub(crate) fn is_request(&self) -> bool {
        self.message_kind == MessageKind::Request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_specificity() {
        let filter: AnnotationFilter = "-*,Display.*,-Display.Secret".parse().unwrap();
        assert!(filter.matches("Display.Title"));
        assert!(!filter.matches("Display.Secret"));
        assert!(!filter.matches("Other.Title"));
        assert!(!filter.matches("DisplayX.Title"));
    }

    #[test]
    fn test_filter_tie_prefers_exclusion() {
        let filter: AnnotationFilter = "NS.Term,-NS.Term".parse().unwrap();
        assert!(!filter.matches("NS.Term"));
    }

    #[test]
    fn test_filter_rejects_garbage() {
        assert!("nodot".parse::<AnnotationFilter>().is_err());
        assert!(".Leading".parse::<AnnotationFilter>().is_err());
    }

    #[test]
    fn test_filter_leading_at_is_ignored() {
        let filter: AnnotationFilter = "NS.*".parse().unwrap();
        assert!(filter.matches("@NS.Term"));
    }

    #[test]
    fn test_presets() {
        assert_eq!(JsonLightOptions::full().metadata_level, MetadataLevel::Full);
        assert_eq!(JsonLightOptions::none().metadata_level, MetadataLevel::None);
        assert_eq!(JsonLightOptions::new().max_nesting_depth, 100);
    }

    #[test]
    fn test_metadata_level_parse() {
        assert_eq!("Full".parse::<MetadataLevel>().unwrap(), MetadataLevel::Full);
        assert!("verbose".parse::<MetadataLevel>().is_err());
    }
}
