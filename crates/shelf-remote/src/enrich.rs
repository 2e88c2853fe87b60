//! Metadata enrichment sources. Their output only ever fills gaps; the
//! engine decides what to do with it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use scraper::{Html, Selector};
use serde_json::Value;
use shelf_core::{parse_arxiv_id, CatalogKind, Item, ItemFields};
use shelf_storage::{HttpTransport, TransportError};
use thiserror::Error;

use crate::property::FieldValue;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const ARXIV_BASE: &str = "https://arxiv.org";

static GITHUB_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").expect("valid github regex")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub fields: ItemFields,
    /// Remote-only values keyed like `PropertyMap::enrichment`.
    pub remote: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{source_name} returned status {status}")]
    Status { source_name: &'static str, status: u16 },
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, kind: CatalogKind) -> bool;

    /// `Ok(None)` when the item has nothing this source can look up.
    async fn enrich(&self, item: &Item) -> Result<Option<Enrichment>, EnrichError>;
}

/// `(owner, repo)` from a GitHub repository link.
pub fn github_repo(link: &str) -> Option<(String, String)> {
    let caps = GITHUB_REPO.captures(link.trim())?;
    let owner = caps[1].to_string();
    let repo = caps[2].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

fn str_at<'a>(body: &'a Value, pointer: &str) -> &'a str {
    body.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn date_part(timestamp: &str) -> String {
    timestamp.get(..10).unwrap_or(timestamp).to_string()
}

/// Maps a GitHub repository response onto local fields and remote-only stats.
pub fn parse_repo(body: &Value) -> Result<Enrichment, EnrichError> {
    let name = str_at(body, "/name");
    if name.is_empty() {
        return Err(EnrichError::Message("repository response without name".into()));
    }
    let fields = ItemFields {
        title: name.to_string(),
        description: str_at(body, "/description").to_string(),
        primary_link: str_at(body, "/html_url").to_string(),
        tags: body
            .get("topics")
            .and_then(Value::as_array)
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        ..ItemFields::default()
    };

    let mut remote = BTreeMap::new();
    for (key, pointer) in [
        ("stars", "/stargazers_count"),
        ("forks", "/forks_count"),
        ("watchers", "/watchers_count"),
        ("open_issues", "/open_issues_count"),
    ] {
        if let Some(n) = body.pointer(pointer).and_then(Value::as_f64) {
            remote.insert(key.to_string(), FieldValue::Number(n));
        }
    }
    for (key, pointer) in [("language", "/language"), ("owner", "/owner/login")] {
        let text = str_at(body, pointer);
        if !text.is_empty() {
            remote.insert(key.to_string(), FieldValue::Text(text.to_string()));
        }
    }
    let license = str_at(body, "/license/name");
    remote.insert(
        "license".to_string(),
        FieldValue::Text(if license.is_empty() { "None" } else { license }.to_string()),
    );
    for (key, pointer) in [("updated_at", "/updated_at"), ("pushed_at", "/pushed_at")] {
        let text = str_at(body, pointer);
        if !text.is_empty() {
            remote.insert(key.to_string(), FieldValue::Date(date_part(text)));
        }
    }
    let archived = body.get("archived").and_then(Value::as_bool).unwrap_or(false);
    remote.insert(
        "status".to_string(),
        FieldValue::Text(if archived { "Archived" } else { "Active" }.to_string()),
    );

    Ok(Enrichment { fields, remote })
}

pub struct GitHubEnricher {
    http: HttpTransport,
    token: Option<String>,
    api_base: String,
}

impl GitHubEnricher {
    pub fn new(http: HttpTransport, token: Option<String>) -> Self {
        Self::with_base(http, token, GITHUB_API_BASE)
    }

    pub fn with_base(http: HttpTransport, token: Option<String>, api_base: &str) -> Self {
        Self {
            http,
            token: token.filter(|t| !t.trim().is_empty()),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Enricher for GitHubEnricher {
    fn name(&self) -> &'static str {
        "github"
    }

    fn applies_to(&self, kind: CatalogKind) -> bool {
        kind == CatalogKind::Projects
    }

    async fn enrich(&self, item: &Item) -> Result<Option<Enrichment>, EnrichError> {
        let Some((owner, repo)) = github_repo(&item.primary_link) else {
            return Ok(None);
        };
        let url = format!("{}/repos/{owner}/{repo}", self.api_base);
        let response = self
            .http
            .execute("GET", &url, |client| {
                let request = client
                    .get(&url)
                    .header(ACCEPT, "application/vnd.github+json");
                match &self.token {
                    Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
                    None => request,
                }
            })
            .await?;
        if !response.is_success() {
            return Err(EnrichError::Status {
                source_name: "github",
                status: response.status,
            });
        }
        let body: Value = response
            .json()
            .map_err(|e| EnrichError::Message(e.to_string()))?;
        parse_repo(&body).map(Some)
    }
}

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn select_first_text(document: &Html, selector: &str) -> Result<Option<String>, EnrichError> {
    let sel = Selector::parse(selector).map_err(|e| EnrichError::Message(e.to_string()))?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

fn select_all_attrs(document: &Html, selector: &str, attr: &str) -> Result<Vec<String>, EnrichError> {
    let sel = Selector::parse(selector).map_err(|e| EnrichError::Message(e.to_string()))?;
    Ok(document
        .select(&sel)
        .filter_map(|n| n.value().attr(attr))
        .filter_map(|s| text_or_none(s.to_string()))
        .collect())
}

/// Title, authors and year from an arXiv abstract page.
pub fn parse_abs_page(html: &str) -> Result<Enrichment, EnrichError> {
    let document = Html::parse_document(html);
    let title = match select_all_attrs(&document, r#"meta[name="citation_title"]"#, "content")?
        .into_iter()
        .next()
    {
        Some(title) => title,
        None => select_first_text(&document, "h1.title")?
            .map(|t| t.trim_start_matches("Title:").trim().to_string())
            .unwrap_or_default(),
    };
    let authors = select_all_attrs(&document, r#"meta[name="citation_author"]"#, "content")?;
    let year = select_all_attrs(&document, r#"meta[name="citation_date"]"#, "content")?
        .into_iter()
        .next()
        .and_then(|date| date.get(..4).map(str::to_string))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()));

    let mut fields = ItemFields {
        title,
        ..ItemFields::default()
    };
    if !authors.is_empty() {
        fields.attributes.insert("authors".into(), authors.join(", "));
    }
    if let Some(year) = year {
        fields.attributes.insert("year".into(), year);
    }
    Ok(Enrichment {
        fields,
        remote: BTreeMap::new(),
    })
}

pub struct ArxivEnricher {
    http: HttpTransport,
    base: String,
}

impl ArxivEnricher {
    pub fn new(http: HttpTransport) -> Self {
        Self::with_base(http, ARXIV_BASE)
    }

    pub fn with_base(http: HttpTransport, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Enricher for ArxivEnricher {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn applies_to(&self, kind: CatalogKind) -> bool {
        kind == CatalogKind::Papers
    }

    async fn enrich(&self, item: &Item) -> Result<Option<Enrichment>, EnrichError> {
        let Some(arxiv_id) = parse_arxiv_id(&[item.external_id.as_str(), item.primary_link.as_str()]) else {
            return Ok(None);
        };
        let url = format!("{}/abs/{arxiv_id}", self.base);
        let response = self.http.execute("GET", &url, |client| client.get(&url)).await?;
        if !response.is_success() {
            return Err(EnrichError::Status {
                source_name: "arxiv",
                status: response.status,
            });
        }
        parse_abs_page(&response.text()).map(Some)
    }
}
