// src/rules/pattern.rs

//! Wildcard path templates such as `chunk_{i}.txt` or `{sample,[a-z]+}.csv`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;

use crate::errors::{JobdagError, Result};

/// Wildcard name → bound value.
pub type Wildcards = BTreeMap<String, String>;

/// Regex used for a wildcard without an explicit constraint.
const DEFAULT_WILDCARD_REGEX: &str = ".+";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard {
        name: String,
        constraint: Option<String>,
        /// Original `{...}` text, kept for partial expansion.
        raw: String,
    },
}

/// A compiled path template.
///
/// Wildcards are written `{name}` or `{name,regex}`. A name may appear more
/// than once; a match then requires every occurrence to bind the same value.
#[derive(Debug, Clone)]
pub struct Pattern {
    template: String,
    segments: Vec<Segment>,
    regex: Regex,
    /// Same shape with every wildcard unconstrained, for placeholder paths.
    loose: Regex,
    /// Capture group name → wildcard name, in template order.
    groups: Vec<(String, String)>,
}

impl Pattern {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let segments = parse_segments(&template)?;

        let mut source = String::from("^");
        let mut loose = String::from("^");
        let mut groups = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Literal(text) => {
                    source.push_str(&regex::escape(text));
                    loose.push_str(&regex::escape(text));
                }
                Segment::Wildcard {
                    name, constraint, ..
                } => {
                    let group = format!("w{}", groups.len());
                    let body = constraint.as_deref().unwrap_or(DEFAULT_WILDCARD_REGEX);
                    source.push_str(&format!("(?P<{group}>{body})"));
                    loose.push_str(&format!("(?P<{group}>{DEFAULT_WILDCARD_REGEX})"));
                    groups.push((group, name.clone()));
                }
            }
        }
        source.push('$');
        loose.push('$');

        let compile = |source: &str| {
            Regex::new(source).map_err(|e| JobdagError::InvalidPattern {
                pattern: template.clone(),
                reason: e.to_string(),
            })
        };
        let regex = compile(&source)?;
        let loose = compile(&loose)?;

        Ok(Self {
            template,
            segments,
            regex,
            loose,
            groups,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn has_wildcards(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn wildcard_names(&self) -> BTreeSet<String> {
        self.groups.iter().map(|(_, name)| name.clone()).collect()
    }

    /// Match a concrete path, returning the wildcard bindings.
    pub fn matches(&self, path: &str) -> Option<Wildcards> {
        Self::bind(&self.regex, &self.groups, path)
    }

    /// Like [`matches`](Self::matches) but ignores wildcard constraints, so
    /// that a path still holding `{name}` tokens can be matched.
    pub fn matches_placeholder(&self, path: &str) -> Option<Wildcards> {
        Self::bind(&self.loose, &self.groups, path)
    }

    fn bind(regex: &Regex, groups: &[(String, String)], path: &str) -> Option<Wildcards> {
        let caps = regex.captures(path)?;
        let mut wildcards = Wildcards::new();
        for (group, name) in groups {
            let value = caps.name(group)?.as_str();
            match wildcards.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    wildcards.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(wildcards)
    }

    /// Substitute every wildcard. Fails with the first unbound name.
    pub fn expand(&self, wildcards: &Wildcards) -> std::result::Result<String, String> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Wildcard { name, .. } => match wildcards.get(name) {
                    Some(value) => out.push_str(value),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }

    /// Substitute the bound wildcards and leave the others verbatim, so the
    /// result is itself a valid template.
    pub fn partial_expand(&self, wildcards: &Wildcards) -> String {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Wildcard { name, raw, .. } => match wildcards.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(raw),
                },
            }
        }
        out
    }

    /// Literal text before the first wildcard.
    pub fn constant_prefix(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Literal(text)) => text,
            _ => "",
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>> {
    let invalid = |reason: &str| JobdagError::InvalidPattern {
        pattern: template.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }

        // Find the matching brace; constraints may contain `{n}` quantifiers.
        let mut depth = 1;
        let mut end = None;
        for (idx, c) in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| invalid("unclosed '{'"))?;
        let inner = &template[start + 1..end];

        let (name, constraint) = match inner.split_once(',') {
            Some((name, constraint)) => (name.trim(), Some(constraint.trim().to_string())),
            None => (inner.trim(), None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(&format!("invalid wildcard name '{name}'")));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Wildcard {
            name: name.to_string(),
            constraint,
            raw: template[start..=end].to_string(),
        });
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wc(pairs: &[(&str, &str)]) -> Wildcards {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn matches_and_expands() {
        let p = Pattern::new("results/{sample}/{part}.txt").unwrap();
        let w = p.matches("results/a/b.txt").unwrap();
        assert_eq!(w, wc(&[("sample", "a"), ("part", "b")]));
        assert_eq!(p.expand(&w).unwrap(), "results/a/b.txt");
        assert_eq!(p.constant_prefix(), "results/");
        assert!(p.matches("other/a/b.txt").is_none());
    }

    #[test]
    fn repeated_names_must_agree() {
        let p = Pattern::new("{x}/{x}.txt").unwrap();
        assert!(p.matches("a/a.txt").is_some());
        assert!(p.matches("a/b.txt").is_none());
    }

    #[test]
    fn constraints_are_honoured() {
        let p = Pattern::new("chunk_{i,[0-9]{1,3}}.txt").unwrap();
        assert!(p.matches("chunk_42.txt").is_some());
        assert!(p.matches("chunk_x.txt").is_none());
        assert_eq!(p.wildcard_names(), BTreeSet::from(["i".to_string()]));
    }

    #[test]
    fn partial_expansion_keeps_unbound_wildcards() {
        let p = Pattern::new("{sample}/chunk_{i,[0-9]+}.txt").unwrap();
        let out = p.partial_expand(&wc(&[("sample", "s1")]));
        assert_eq!(out, "s1/chunk_{i,[0-9]+}.txt");
        assert_eq!(p.expand(&wc(&[("sample", "s1")])), Err("i".to_string()));
    }

    #[test]
    fn placeholder_matches_itself() {
        let p = Pattern::new("chunk_{i}.txt").unwrap();
        let w = p.matches("chunk_{i}.txt").unwrap();
        assert_eq!(p.expand(&w).unwrap(), "chunk_{i}.txt");
    }

    #[test]
    fn placeholder_matching_ignores_constraints() {
        let p = Pattern::new("chunk_{i,[0-9]+}.txt").unwrap();
        assert!(p.matches("chunk_{i}.txt").is_none());
        let w = p.matches_placeholder("chunk_{i}.txt").unwrap();
        assert_eq!(w, wc(&[("i", "{i}")]));
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(Pattern::new("chunk_{i.txt").is_err());
        assert!(Pattern::new("chunk_{}.txt").is_err());
    }
}
