//! Literal arguments compiled at check time: topic regexes and payload
//! pattern files.

use regex::bytes::RegexSet;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Pattern {
    /// Literal text as written in the rule
    pub source: String,
    pub kind: PatternKind,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    Regex(Regex),
    Payload(PayloadRules),
}

/// A payload pattern file: one regex per line, `#` comments.
#[derive(Debug, Clone)]
pub struct PayloadRules {
    pub names: Vec<String>,
    pub set: RegexSet,
}

impl PayloadRules {
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        let names: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_owned)
            .collect();
        let set = RegexSet::new(&names)?;
        Ok(PayloadRules { names, set })
    }

    /// Patterns that match `payload`.
    pub fn matches<'a>(&'a self, payload: &[u8]) -> Vec<&'a str> {
        self.set
            .matches(payload)
            .into_iter()
            .map(|i| self.names[i].as_str())
            .collect()
    }
}

impl Pattern {
    pub fn regex(&self) -> Option<&Regex> {
        match &self.kind {
            PatternKind::Regex(re) => Some(re),
            PatternKind::Payload(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&PayloadRules> {
        match &self.kind {
            PatternKind::Payload(p) => Some(p),
            PatternKind::Regex(_) => None,
        }
    }
}

/// Compiled patterns for one compilation, keyed by literal text.
#[derive(Debug, Default)]
pub struct PatternCache {
    regexes: HashMap<String, Pattern>,
    payloads: HashMap<String, Pattern>,
}

impl PatternCache {
    pub fn new() -> Self {
        PatternCache::default()
    }

    pub fn regex(&mut self, source: &str) -> Result<Pattern, String> {
        if let Some(p) = self.regexes.get(source) {
            return Ok(p.clone());
        }
        let re = Regex::new(source).map_err(|e| e.to_string())?;
        let p = Pattern {
            source: source.to_owned(),
            kind: PatternKind::Regex(re),
        };
        self.regexes.insert(source.to_owned(), p.clone());
        Ok(p)
    }

    pub fn payload(&mut self, path: &str) -> Result<Pattern, String> {
        if let Some(p) = self.payloads.get(path) {
            return Ok(p.clone());
        }
        let text = fs::read_to_string(Path::new(path))
            .map_err(|e| format!("cannot read pattern file: {}", e))?;
        let rules = PayloadRules::parse(&text).map_err(|e| e.to_string())?;
        let p = Pattern {
            source: path.to_owned(),
            kind: PatternKind::Payload(rules),
        };
        self.payloads.insert(path.to_owned(), p.clone());
        Ok(p)
    }

    pub fn len(&self) -> usize {
        self.regexes.len() + self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn topic_regexes() {
        let mut cache = PatternCache::new();
        let p = cache.regex(".*[^/]/pose").unwrap();
        assert!(p.regex().unwrap().is_match("/robot/pose"));
        assert!(cache.regex("*").is_err());
        cache.regex(".*[^/]/pose").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn payload_files() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# suspicious payloads\n\nrm -rf\n^\\x7fELF").unwrap();
        let mut cache = PatternCache::new();
        let p = cache.payload(f.path().to_str().unwrap()).unwrap();
        let rules = p.payload().unwrap();
        assert_eq!(rules.names.len(), 2);
        assert_eq!(rules.matches(b"please rm -rf /"), vec!["rm -rf"]);
        assert!(rules.matches(b"\x7fELF\x02").contains(&"^\\x7fELF"));
        assert!(rules.matches(b"hello").is_empty());
        assert!(cache.payload("/nonexistent/rules.pat").is_err());
    }
}
