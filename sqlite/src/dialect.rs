//! Identifier quoting and parameter marker conventions.
//!
//! A [`Dialect`] is built once from the configured [`Quoting`] and is used
//! by the statement builder to wrap identifiers and by the query mapper to
//! find parameter markers inside filter clauses.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Quoting;
use crate::error::{Error, Result};

static WHERE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("static regex must compile"));

/// Validates that a name contains only alphanumeric characters and
/// underscores.
///
/// Used for savepoint names, which are spliced into statement text.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Returns `true` if the clause already carries a `WHERE` keyword.
pub(crate) fn has_where(clause: &str) -> bool {
    WHERE_RE.is_match(clause)
}

/// Compiled quoting and marker conventions.
#[derive(Debug, Clone)]
pub struct Dialect {
    quoting: Quoting,
    marker: Regex,
}

impl Dialect {
    /// Compiles the marker pattern for the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the quoting is invalid.
    pub fn new(quoting: Quoting) -> Result<Self> {
        quoting.validate()?;
        let pattern = format!(
            "{}[A-Za-z0-9]+",
            regex::escape(&quoting.param_prefix.to_string())
        );
        let marker = Regex::new(&pattern)
            .map_err(|e| Error::Configuration(format!("invalid marker pattern: {e}")))?;
        Ok(Self { quoting, marker })
    }

    pub fn quoting(&self) -> &Quoting {
        &self.quoting
    }

    /// Wraps an identifier in the configured delimiters.
    ///
    /// Occurrences of the closing delimiter inside the name are doubled.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relmap_sqlite::{Dialect, Quoting};
    /// let d = Dialect::new(Quoting::default()).unwrap();
    /// assert_eq!(d.quote("Order"), "\"Order\"");
    ///
    /// let b = Dialect::new(Quoting::brackets()).unwrap();
    /// assert_eq!(b.quote("Order"), "[Order]");
    /// ```
    pub fn quote(&self, ident: &str) -> String {
        let end = &self.quoting.end;
        let escaped = ident.replace(end.as_str(), &format!("{end}{end}"));
        format!("{}{escaped}{end}", self.quoting.begin)
    }

    /// Quotes `alias.column`.
    pub fn qualify(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", self.quote(alias), self.quote(column))
    }

    /// Renders a parameter marker for a bare name (`id` → `@id`).
    pub fn marker(&self, name: &str) -> String {
        format!("{}{name}", self.quoting.param_prefix)
    }

    /// Extracts every parameter marker in left-to-right order.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relmap_sqlite::{Dialect, Quoting};
    /// let d = Dialect::new(Quoting::default()).unwrap();
    /// let markers = d.markers("Status = @p0 AND Total > @p1");
    /// assert_eq!(markers, vec!["@p0", "@p1"]);
    /// ```
    pub fn markers<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.marker.find_iter(text).map(|m| m.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        assert!(validate_identifier("before_update").is_ok());
        assert!(validate_identifier("sp1").is_ok());
    }

    #[test]
    fn test_invalid_identifier() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("drop;--").is_err());
        assert!(validate_identifier("two words").is_err());
    }

    #[test]
    fn test_has_where_is_case_insensitive_whole_word() {
        assert!(has_where("WHERE Status = @p0"));
        assert!(has_where("where x = 1"));
        assert!(has_where("  Where x = 1"));
        assert!(!has_where("Somewhere = @p0"));
        assert!(!has_where("Status = @p0"));
    }

    #[test]
    fn test_quote_escapes_closing_delimiter() {
        let d = Dialect::new(Quoting::default()).unwrap();
        assert_eq!(d.quote("we\"ird"), "\"we\"\"ird\"");
        let b = Dialect::new(Quoting::brackets()).unwrap();
        assert_eq!(b.quote("a]b"), "[a]]b]");
        assert_eq!(b.qualify("Order", "Status"), "[Order].[Status]");
    }

    #[test]
    fn test_markers_with_other_prefix() {
        let q = Quoting {
            param_prefix: ':',
            ..Quoting::default()
        };
        let d = Dialect::new(q).unwrap();
        assert_eq!(d.markers("a = :first OR b = @ignored"), vec![":first"]);
        assert_eq!(d.marker("id"), ":id");
    }

    #[test]
    fn test_markers_stop_at_non_alphanumerics() {
        let d = Dialect::new(Quoting::default()).unwrap();
        assert_eq!(d.markers("(a=@x1)AND(b=@y_2)"), vec!["@x1", "@y"]);
        assert!(d.markers("no markers here").is_empty());
    }
}
