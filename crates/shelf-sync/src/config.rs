use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf_core::{is_record_id, normalize_record_id, CatalogKind};
use shelf_remote::DEFAULT_API_BASE;
use thiserror::Error;
use tracing::warn;

/// Which mutations a run may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    All,
    CreateOnly,
    UpdateOnly,
    /// Pull and align only; no remote create or update.
    ReconcileOnly,
}

impl RunMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "full" | "both" => Some(Self::All),
            "create_only" | "create" | "new_only" | "only_create" => Some(Self::CreateOnly),
            "update_only" | "update" | "only_update" => Some(Self::UpdateOnly),
            "reconcile_only" | "reconcile" => Some(Self::ReconcileOnly),
            _ => None,
        }
    }

    /// Like [`RunMode::parse`], but unknown values fall back to `All`.
    pub fn from_setting(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            warn!(value = raw, "unknown sync mode, falling back to all");
            Self::All
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::CreateOnly => "create_only",
            Self::UpdateOnly => "update_only",
            Self::ReconcileOnly => "reconcile_only",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("NOTION_TOKEN is not set")]
    MissingToken,
    #[error("NOTION_DATABASE_ID is not set")]
    MissingDatabaseId,
    #[error("NOTION_DATABASE_ID `{0}` is not a 32-hex id, dashed id or database URL")]
    MalformedDatabaseId(String),
    #[error("SHELF_KIND `{0}` is not one of projects, papers")]
    UnknownKind(String),
}

/// `1|true|yes|on` and `0|false|no|off`, case-insensitive; anything else is
/// `default`.
pub fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Everything a run needs, resolved once at startup.
#[derive(Clone)]
pub struct SyncConfig {
    pub token: String,
    /// Dashed UUID form.
    pub database_id: String,
    pub kind: CatalogKind,
    pub catalog_path: PathBuf,
    pub mode: RunMode,
    pub merge_from_remote: bool,
    pub force_title: bool,
    pub align_categories: bool,
    /// Pause after each iteration that called a mutating endpoint.
    pub delay: Duration,
    pub timeout: Duration,
    pub api_base: String,
    pub github_token: Option<String>,
    pub enrich: bool,
    pub property_map_file: Option<PathBuf>,
    /// Skip the final save.
    pub dry_run: bool,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("token", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("kind", &self.kind)
            .field("catalog_path", &self.catalog_path)
            .field("mode", &self.mode)
            .field("merge_from_remote", &self.merge_from_remote)
            .field("force_title", &self.force_title)
            .field("align_categories", &self.align_categories)
            .field("delay", &self.delay)
            .field("timeout", &self.timeout)
            .field("api_base", &self.api_base)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("enrich", &self.enrich)
            .field("property_map_file", &self.property_map_file)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any name lookup; empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("NOTION_TOKEN").ok_or(ConfigError::MissingToken)?;
        let raw_database_id = get("NOTION_DATABASE_ID").ok_or(ConfigError::MissingDatabaseId)?;
        if !is_record_id(&raw_database_id) {
            return Err(ConfigError::MalformedDatabaseId(raw_database_id));
        }
        let kind = match get("SHELF_KIND") {
            Some(raw) => CatalogKind::parse(&raw).ok_or(ConfigError::UnknownKind(raw))?,
            None => CatalogKind::default(),
        };
        let default_delay_ms = match kind {
            CatalogKind::Projects => 1000,
            CatalogKind::Papers => 300,
        };

        Ok(Self {
            token,
            database_id: normalize_record_id(&raw_database_id),
            kind,
            catalog_path: get("CATALOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(kind.default_catalog_file())),
            mode: get("SYNC_MODE")
                .map(|raw| RunMode::from_setting(&raw))
                .unwrap_or_default(),
            merge_from_remote: parse_bool(get("MERGE_FROM_REMOTE").as_deref(), false),
            force_title: parse_bool(get("FORCE_TITLE_OVERRIDE").as_deref(), false),
            align_categories: parse_bool(get("SYNC_CATEGORY_FROM_REMOTE").as_deref(), false),
            delay: Duration::from_millis(
                get("SYNC_DELAY_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default_delay_ms),
            ),
            timeout: Duration::from_secs(
                get("REMOTE_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(12),
            ),
            api_base: get("REMOTE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            github_token: get("GITHUB_TOKEN"),
            enrich: parse_bool(get("ENRICH").as_deref(), true),
            property_map_file: get("PROPERTY_MAP_FILE").map(PathBuf::from),
            dry_run: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const DB: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f0";

    #[test]
    fn missing_credentials_are_fatal() {
        assert_eq!(
            SyncConfig::from_lookup(lookup(&[("NOTION_DATABASE_ID", DB)])).unwrap_err(),
            ConfigError::MissingToken
        );
        assert_eq!(
            SyncConfig::from_lookup(lookup(&[("NOTION_TOKEN", "secret"), ("NOTION_DATABASE_ID", " ")]))
                .unwrap_err(),
            ConfigError::MissingDatabaseId
        );
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&[
                ("NOTION_TOKEN", "secret"),
                ("NOTION_DATABASE_ID", "reading-list")
            ])),
            Err(ConfigError::MalformedDatabaseId(_))
        ));
    }

    #[test]
    fn defaults_follow_catalog_kind() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("NOTION_TOKEN", "secret"),
            ("NOTION_DATABASE_ID", DB),
            ("SHELF_KIND", "papers"),
        ]))
        .unwrap();
        assert_eq!(config.database_id, "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0");
        assert_eq!(config.catalog_path, PathBuf::from("data/papers.xlsx"));
        assert_eq!(config.delay, Duration::from_millis(300));
        assert_eq!(config.mode, RunMode::All);
        assert!(config.enrich);
        assert!(!config.merge_from_remote);
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn modes_accept_aliases_and_fall_back_to_all() {
        assert_eq!(RunMode::from_setting("CREATE"), RunMode::CreateOnly);
        assert_eq!(RunMode::from_setting("only_update"), RunMode::UpdateOnly);
        assert_eq!(RunMode::from_setting(" Reconcile "), RunMode::ReconcileOnly);
        assert_eq!(RunMode::from_setting("both"), RunMode::All);
        assert_eq!(RunMode::from_setting("sideways"), RunMode::All);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert!(parse_bool(Some("Yes"), false));
        assert!(parse_bool(Some("on"), false));
        assert!(!parse_bool(Some("OFF"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }
}
