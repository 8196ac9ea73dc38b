//! Dated naming patterns.
//!
//! A pattern is a regular expression template in which `%Y`, `%m` and `%d`
//! stand for a zero-padded 4-digit year, 2-digit month and 2-digit day, e.g.
//! `^.*%Y%m%d.*$`. Each placeholder must appear exactly once. Capture groups
//! are reserved for the placeholders, so `(` and `)` are rejected.

use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Pattern used when the caller does not supply one.
pub const DEFAULT_PATTERN: &str = "^.*%Y%m%d.*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
}

impl Field {
    fn placeholder(self) -> &'static str {
        match self {
            Field::Year => "%Y",
            Field::Month => "%m",
            Field::Day => "%d",
        }
    }

    fn digits(self) -> &'static str {
        match self {
            Field::Year => r"(\d{4})",
            Field::Month | Field::Day => r"(\d{2})",
        }
    }
}

#[derive(Clone)]
pub struct DatedPattern {
    template: String,
    full: Regex,
    /// The placeholder span alone, without capture groups
    core: Regex,
    /// Placeholder order in the template, i.e. capture group order
    order: [Field; 3],
}

impl DatedPattern {
    pub fn new(template: &str) -> Result<Self> {
        let invalid = |reason: &str| SyncError::Pattern {
            pattern: template.to_string(),
            reason: reason.to_string(),
        };

        let mut problems = Vec::new();
        for field in [Field::Year, Field::Month, Field::Day] {
            if template.matches(field.placeholder()).count() != 1 {
                problems.push(format!("must contain `{}` exactly once", field.placeholder()));
            }
        }
        if template.matches('%').count() != 3 {
            problems.push("must contain exactly 3 `%` characters".to_string());
        }
        if template.contains('(') || template.contains(')') {
            problems.push("must not contain `(` or `)`".to_string());
        }
        if !problems.is_empty() {
            return Err(invalid(&problems.join("; ")));
        }

        let mut order = [Field::Year, Field::Month, Field::Day];
        // Each placeholder is present exactly once, so find() cannot miss
        order.sort_by_key(|f| template.find(f.placeholder()).unwrap_or(usize::MAX));

        let mut source = template.to_string();
        for field in order {
            source = source.replace(field.placeholder(), field.digits());
        }
        if !source.starts_with('^') {
            source.insert(0, '^');
        }
        if !source.ends_with('$') {
            source.push('$');
        }

        let (first, last) = match (source.find('('), source.rfind(')')) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(invalid("placeholders not found")),
        };
        let core_source: String = source[first..=last]
            .chars()
            .filter(|c| *c != '(' && *c != ')')
            .collect();

        let full = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
        let core = Regex::new(&core_source).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            full,
            core,
            order,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Extract the date encoded in `name`.
    ///
    /// Returns `Ok(None)` when the name does not match or the digits do not
    /// form a calendar date, and `AmbiguousName` when the name could have been
    /// produced on more than one date.
    pub fn parse(&self, name: &str) -> Result<Option<NaiveDate>> {
        let Some(caps) = self.full.captures(name) else {
            return Ok(None);
        };

        if self.is_ambiguous(name) {
            return Err(SyncError::AmbiguousName {
                name: name.to_string(),
                pattern: self.template.clone(),
            });
        }

        let (mut year, mut month, mut day) = (0i32, 0u32, 0u32);
        for (i, field) in self.order.iter().enumerate() {
            let Some(text) = caps.get(i + 1).map(|m| m.as_str()) else {
                return Ok(None);
            };
            match field {
                Field::Year => year = text.parse().unwrap_or(0),
                Field::Month => month = text.parse().unwrap_or(0),
                Field::Day => day = text.parse().unwrap_or(0),
            }
        }

        Ok(NaiveDate::from_ymd_opt(year, month, day))
    }

    /// A name is ambiguous when the date span matches at more than one
    /// distinct place across all of its prefixes and suffixes.
    fn is_ambiguous(&self, name: &str) -> bool {
        let bounds: Vec<usize> = name.char_indices().map(|(i, _)| i).skip(1).collect();

        let mut candidates: Vec<&str> = Vec::with_capacity(bounds.len() * 2 + 1);
        candidates.extend(bounds.iter().map(|&i| &name[..i]));
        candidates.extend(bounds.iter().map(|&i| &name[i..]));
        candidates.push(name);

        let mut seen: HashSet<&str> = HashSet::new();
        for candidate in candidates {
            for m in self.core.find_iter(candidate) {
                seen.insert(m.as_str());
                if seen.len() > 1 {
                    return true;
                }
            }
        }
        false
    }

    /// Render the name produced on `date`.
    ///
    /// Anchors are dropped; any other regex syntax is kept verbatim, so this
    /// is only meaningful for templates that are otherwise literal.
    pub fn render(&self, date: NaiveDate) -> String {
        let literal = self.template.trim_start_matches('^').trim_end_matches('$');
        date.format(literal).to_string()
    }
}

impl Default for DatedPattern {
    fn default() -> Self {
        // DEFAULT_PATTERN is a valid template
        match Self::new(DEFAULT_PATTERN) {
            Ok(pattern) => pattern,
            Err(e) => unreachable!("default pattern rejected: {e}"),
        }
    }
}

impl fmt::Debug for DatedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatedPattern").field(&self.template).finish()
    }
}

impl fmt::Display for DatedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(template: &str, name: &str) -> Option<NaiveDate> {
        DatedPattern::new(template).unwrap().parse(name).unwrap()
    }

    #[test]
    fn test_rejects_malformed_templates() {
        for template in [
            "%Y%m",
            "%Y%m%d%d",
            "%Y%m%d%H",
            "^(%Y)%m%d$",
            "^%Y%m%d 100%$",
        ] {
            assert!(
                matches!(DatedPattern::new(template), Err(SyncError::Pattern { .. })),
                "{template} should be rejected"
            );
        }
    }

    #[test]
    fn test_non_matching_names() {
        assert_eq!(parse("^%Y%m%d$", "2021-02-03"), None);
        assert_eq!(parse("^%Y%m%d$", "2021020"), None);
        assert_eq!(parse("^%Y%m%d$", "2021020a"), None);
        assert_eq!(parse("^%Y%m%d$", "a2021020"), None);
    }

    #[test]
    fn test_placeholder_orders() {
        let expected = Some(date(2021, 2, 3));
        assert_eq!(parse("^%Y%m%d$", "20210203"), expected);
        assert_eq!(parse("^.*%Y%m%d$", "asds20210203"), expected);
        assert_eq!(parse("^.*%Y%m%d.*$", "ads20210203.asd"), expected);
        assert_eq!(parse("^.*%Y%m%d.*$", "20210203.txt"), expected);
        assert_eq!(parse("^%Y-%m-%d$", "2021-02-03"), expected);
        assert_eq!(parse("^%Y-%d-%m$", "2021-03-02"), expected);
        assert_eq!(parse("^%d-%m-%Y$", "03-02-2021"), expected);
        assert_eq!(parse("^%d-%Y-%m$", "03-2021-02"), expected);
        assert_eq!(parse("^%m-%Y-%d$", "02-2021-03"), expected);
        assert_eq!(parse("^%m-%d-%Y$", "02-03-2021"), expected);
    }

    #[test]
    fn test_unanchored_template_matches_whole_name() {
        assert_eq!(parse("%Y%m%d", "20210203"), Some(date(2021, 2, 3)));
        assert_eq!(parse("%Y%m%d", "x20210203"), None);
    }

    #[test]
    fn test_invalid_calendar_date_is_skipped() {
        assert_eq!(parse("^%Y%m%d$", "20210230"), None);
        assert_eq!(parse("^%Y%m%d$", "20211301"), None);
    }

    #[test]
    fn test_ambiguous_names() {
        let cases = [
            ("^%Y.*%m.*%d$", "2022-03-04", vec!["2022-03-04-05", "2022-2021-04-05"]),
            ("^.*%Y%m%d.*$", "20220204", vec!["202202041", "20220204-20220205"]),
            (
                "^.*%Y-%m-%d.*$",
                "2022-02-04",
                vec!["2020-11-2020-11-11", "2020-11-20.2020-12-20"],
            ),
        ];

        for (template, good, bad) in cases {
            let pattern = DatedPattern::new(template).unwrap();
            assert!(pattern.parse(good).unwrap().is_some(), "{template} / {good}");
            for name in bad {
                assert!(
                    matches!(pattern.parse(name), Err(SyncError::AmbiguousName { .. })),
                    "{template} / {name} should be ambiguous"
                );
            }
        }
    }

    #[test]
    fn test_render() {
        let pattern = DatedPattern::new("^log-%Y-%m-%d.txt$").unwrap();
        assert_eq!(pattern.render(date(2024, 9, 17)), "log-2024-09-17.txt");
        assert_eq!(
            pattern.parse(&pattern.render(date(2024, 9, 17))).unwrap(),
            Some(date(2024, 9, 17))
        );
    }

    #[test]
    fn test_default_pattern() {
        let pattern = DatedPattern::default();
        assert_eq!(pattern.template(), DEFAULT_PATTERN);
        assert_eq!(pattern.parse("20240917").unwrap(), Some(date(2024, 9, 17)));
    }
}
