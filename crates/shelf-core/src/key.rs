//! Identity keys used to join local items with remote records.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::CatalogKind;

/// Placeholder slug used when a name slugifies to nothing.
pub const DEFAULT_CATEGORY_SLUG: &str = "category";

static ARXIV_BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4}\.[0-9]{4,5})(?:v\d+)?$").expect("valid arxiv id regex"));

static ARXIV_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv\.org/(?:abs|pdf)/([0-9]{4}\.[0-9]{4,5})(?:v\d+)?(?:\.pdf)?")
        .expect("valid arxiv link regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Link,
    External,
}

/// Canonical join key between an item and a remote record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedKey {
    kind: KeyKind,
    value: String,
}

impl NormalizedKey {
    pub fn from_link(raw: &str) -> Option<Self> {
        let value = normalize_link(raw);
        if value.is_empty() {
            return None;
        }
        Some(Self {
            kind: KeyKind::Link,
            value,
        })
    }

    /// External identifiers prefer the arXiv `NNNN.NNNNN` form; anything else is
    /// kept trimmed and lower-cased.
    pub fn from_external(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value = parse_arxiv_id(&[trimmed]).unwrap_or_else(|| trimmed.to_lowercase());
        Some(Self {
            kind: KeyKind::External,
            value,
        })
    }

    pub fn from_kind(kind: KeyKind, raw: &str) -> Option<Self> {
        match kind {
            KeyKind::Link => Self::from_link(raw),
            KeyKind::External => Self::from_external(raw),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KeyKind::Link => write!(f, "link:{}", self.value),
            KeyKind::External => write!(f, "ext:{}", self.value),
        }
    }
}

/// Trimmed, trailing slashes removed, lower-cased.
pub fn normalize_link(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_lowercase()
}

/// Keys for an item in match precedence order. Papers try the arXiv identifier
/// before the link; projects only have the link.
pub fn identity_keys(kind: CatalogKind, primary_link: &str, external_id: &str) -> Vec<NormalizedKey> {
    let mut keys = Vec::new();
    if kind == CatalogKind::Papers {
        let external = parse_arxiv_id(&[external_id, primary_link])
            .or_else(|| Some(external_id.to_string()).filter(|s| !s.trim().is_empty()));
        if let Some(key) = external.as_deref().and_then(NormalizedKey::from_external) {
            keys.push(key);
        }
    }
    if let Some(key) = NormalizedKey::from_link(primary_link) {
        keys.push(key);
    }
    keys
}

/// First arXiv identifier found in `values`, version suffix dropped.
pub fn parse_arxiv_id(values: &[&str]) -> Option<String> {
    for value in values {
        let text = value.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(caps) = ARXIV_BARE_ID.captures(text) {
            return Some(caps[1].to_string());
        }
        if let Some(caps) = ARXIV_LINK.captures(text) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Abstract page and PDF links for an arXiv identifier.
pub fn arxiv_urls(arxiv_id: &str) -> Option<(String, String)> {
    let id = arxiv_id.trim();
    if id.is_empty() {
        return None;
    }
    Some((
        format!("https://arxiv.org/abs/{id}"),
        format!("https://arxiv.org/pdf/{id}.pdf"),
    ))
}

/// Canonical dashed form of a record id. Accepts a bare 32-hex id, a dashed
/// id, or a URL whose last path segment ends in one; other input is returned
/// trimmed and unchanged.
pub fn normalize_record_id(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let mut value = trimmed.trim_end_matches('/');
    if let Some(tail) = value.rsplit('/').next() {
        value = tail;
    }
    if let Some((head, _)) = value.split_once('?') {
        value = head;
    }
    let compact: Vec<char> = value.chars().filter(|c| *c != '-').collect();
    // page URLs carry a title slug before the id
    let hex: String = compact[compact.len().saturating_sub(32)..].iter().collect();
    if hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let hex = hex.to_ascii_lowercase();
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..]
        )
    } else {
        trimmed.to_string()
    }
}

/// True when `raw` normalizes to a dashed 32-hex id.
pub fn is_record_id(raw: &str) -> bool {
    let normalized = normalize_record_id(raw);
    normalized.len() == 36
        && normalized
            .chars()
            .all(|c| c == '-' || c.is_ascii_hexdigit())
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Lower-cases, replaces runs of characters outside `[a-z0-9]` and CJK
/// ideographs with a single dash, and trims dashes. Falls back to `fallback`
/// when nothing survives.
pub fn slugify(text: &str, fallback: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for c in lowered.chars() {
        if is_slug_char(c) {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}

/// Appends `-2`, `-3`, ... to `base` until `taken` reports the candidate free.
pub fn uniquify(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn links_normalize_case_and_trailing_slash() {
        let a = NormalizedKey::from_link("  https://GitHub.com/Tokio-rs/Tokio/ ").unwrap();
        let b = NormalizedKey::from_link("https://github.com/tokio-rs/tokio").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://github.com/tokio-rs/tokio");
        assert!(NormalizedKey::from_link("   ").is_none());
    }

    #[test]
    fn arxiv_ids_come_from_bare_ids_and_links() {
        assert_eq!(parse_arxiv_id(&["2401.01234v3"]).as_deref(), Some("2401.01234"));
        assert_eq!(
            parse_arxiv_id(&["", "https://arxiv.org/pdf/1706.03762v7.pdf"]).as_deref(),
            Some("1706.03762")
        );
        assert_eq!(
            parse_arxiv_id(&["https://ArXiv.org/abs/2310.0001"]).as_deref(),
            Some("2310.0001")
        );
        assert_eq!(parse_arxiv_id(&["10.1145/3292500", "https://example.org"]), None);
    }

    #[test]
    fn paper_keys_prefer_external_identifier() {
        let keys = identity_keys(
            CatalogKind::Papers,
            "https://arxiv.org/abs/1706.03762",
            "",
        );
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].kind(), KeyKind::External);
        assert_eq!(keys[0].as_str(), "1706.03762");
        assert_eq!(keys[1].kind(), KeyKind::Link);

        let project_keys = identity_keys(CatalogKind::Projects, "https://github.com/a/b", "x");
        assert_eq!(project_keys.len(), 1);
        assert_eq!(project_keys[0].kind(), KeyKind::Link);
    }

    #[test]
    fn slugify_folds_case_punctuation_and_keeps_cjk() {
        assert_eq!(slugify("AI ", "category"), "ai");
        assert_eq!(slugify("Dev Tools / CLI", "category"), "dev-tools-cli");
        assert_eq!(slugify("机器学习 Infra", "category"), "机器学习-infra");
        assert_eq!(slugify("--!!--", "category"), "category");
        assert_eq!(slugify("Émigré", "category"), "migr");
    }

    #[test]
    fn record_ids_normalize_to_dashed_form() {
        let dashed = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";
        assert_eq!(normalize_record_id("0F1E2D3C4B5A69788796A5B4C3D2E1F0"), dashed);
        assert_eq!(normalize_record_id(dashed), dashed);
        assert_eq!(
            normalize_record_id("https://www.notion.so/team/Reading-List-0f1e2d3c4b5a69788796a5b4c3d2e1f0?v=abc"),
            dashed
        );
        assert_eq!(normalize_record_id(" R1 "), "R1");
        assert!(is_record_id(dashed));
        assert!(!is_record_id("not-an-id"));
    }

    #[test]
    fn uniquify_appends_numeric_suffixes() {
        let taken: HashSet<&str> = ["ai", "ai-2"].into_iter().collect();
        assert_eq!(uniquify("ai", |c| taken.contains(c)), "ai-3");
        assert_eq!(uniquify("ml", |c| taken.contains(c)), "ml");
    }
}
