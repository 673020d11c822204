//! File classification for deciding which category folder a file belongs in.
//!
//! A [`Classifier`] evaluates, in this fixed order:
//! 1. Regex rules, in configured order, matched case-insensitively anywhere in the filename
//! 2. Extension rules, in configured category order
//! 3. The [`FALLBACK_CATEGORY`]
//!
//! # Examples
//!
//! ```
//! use tidywatch::file_category::Classifier;
//!
//! let mut classifier = Classifier::new();
//! classifier.add_extension_category("Images", [".png", ".jpg"]);
//! classifier.add_pattern_rule("screenshot", "Screenshots").unwrap();
//!
//! assert_eq!(classifier.classify("holiday.PNG"), "Images");
//! assert_eq!(classifier.classify("Screenshot 2024-03-01.png"), "Screenshots");
//! assert_eq!(classifier.classify("notes.txt"), "Others");
//! ```

use crate::config::{CategoryExtensions, ConfigError, RegexRule};
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Category used when no rule matches.
pub const FALLBACK_CATEGORY: &str = "Others";

/// A compiled filename rule.
#[derive(Debug, Clone)]
struct PatternRule {
    regex: Regex,
    category: String,
}

/// A category and the lower-cased, dot-prefixed extensions it claims.
#[derive(Debug, Clone)]
struct ExtensionCategory {
    name: String,
    extensions: Vec<String>,
}

/// Maps filenames to category names.
///
/// Classification is a pure function of the filename and the rules the
/// classifier was built with.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    pattern_rules: Vec<PatternRule>,
    categories: Vec<ExtensionCategory>,
}

impl Classifier {
    /// Creates a classifier with no rules; everything classifies as `Others`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a classifier from configuration.
    ///
    /// Malformed regex rules are logged and skipped; the remaining rules keep
    /// their relative order.
    pub fn from_rules(regex_rules: &[RegexRule], file_types: &[CategoryExtensions]) -> Self {
        let mut classifier = Self::new();
        for rule in regex_rules {
            if let Err(e) = classifier.add_pattern_rule(&rule.pattern, &rule.category) {
                warn!(category = %rule.category, "Ignoring regex rule: {}", e);
            }
        }
        for category in file_types {
            classifier.add_extension_category(&category.name, &category.extensions);
        }
        classifier
    }

    /// Appends a regex rule, evaluated after the rules already added.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRegexPattern` if the pattern does not compile.
    pub fn add_pattern_rule(&mut self, pattern: &str, category: &str) -> Result<(), ConfigError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidRegexPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        self.pattern_rules.push(PatternRule {
            regex,
            category: category.to_string(),
        });
        Ok(())
    }

    /// Appends an extension category, lower priority than those already added.
    ///
    /// Extensions are accepted with or without the leading dot and in any case.
    pub fn add_extension_category<I, S>(&mut self, name: &str, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self.categories.push(ExtensionCategory {
            name: name.to_string(),
            extensions,
        });
    }

    /// Determines the category for a filename.
    pub fn classify(&self, file_name: &str) -> &str {
        if let Some(rule) = self
            .pattern_rules
            .iter()
            .find(|rule| rule.regex.is_match(file_name))
        {
            return &rule.category;
        }

        // Suffix matching lets multi-part extensions such as `.tar.gz` claim a file.
        let lower = file_name.to_lowercase();
        if let Some(category) = self.categories.iter().find(|category| {
            category
                .extensions
                .iter()
                .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
        }) {
            return &category.name;
        }

        FALLBACK_CATEGORY
    }

    /// Every folder name this classifier can produce, including the fallback.
    pub fn category_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let candidates = self
            .categories
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.pattern_rules.iter().map(|r| r.category.as_str()))
            .chain(std::iter::once(FALLBACK_CATEGORY));
        for name in candidates {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

/// Lower-cases an extension and ensures the leading dot. Empty input yields `None`.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}
