//! Schema-typed remote properties. Every value carries its type tag and is
//! encoded or decoded by the variant for that tag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Title,
    Url,
    RichText,
    Number,
    Select,
    MultiSelect,
    Date,
}

impl PropertyType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "title" => Some(Self::Title),
            "url" => Some(Self::Url),
            "rich_text" => Some(Self::RichText),
            "number" => Some(Self::Number),
            "select" => Some(Self::Select),
            "multi_select" => Some(Self::MultiSelect),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Url => "url",
            Self::RichText => "rich_text",
            Self::Number => "number",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Date => "date",
        }
    }

    /// Types whose values can be matched with a text `equals` filter.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Title | Self::RichText | Self::Url)
    }
}

/// Property name to type, as reported by the remote database.
pub type Schema = BTreeMap<String, PropertyType>;

/// Reads `{"properties": {name: {"type": tag}}}`. Types outside the closed set
/// are left out of the schema, so nothing is ever written to them.
pub fn parse_schema(body: &Value) -> Schema {
    let mut schema = Schema::new();
    let Some(properties) = body.get("properties").and_then(Value::as_object) else {
        return schema;
    };
    for (name, definition) in properties {
        let tag = definition.get("type").and_then(Value::as_str).unwrap_or("");
        match PropertyType::from_tag(tag) {
            Some(ptype) => {
                schema.insert(name.clone(), ptype);
            }
            None => debug!(property = %name, tag, "ignoring unsupported property type"),
        }
    }
    schema
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    Url(String),
    RichText(String),
    Number(Option<f64>),
    Select(String),
    MultiSelect(Vec<String>),
    /// ISO date or date-time start value.
    Date(String),
}

fn rich_text_content(text: &str) -> Value {
    json!([{ "text": { "content": text } }])
}

fn plain_text(fragments: Option<&Value>) -> String {
    fragments
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| {
                    part.get("plain_text")
                        .and_then(Value::as_str)
                        .or_else(|| part.pointer("/text/content").and_then(Value::as_str))
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Title(_) => PropertyType::Title,
            Self::Url(_) => PropertyType::Url,
            Self::RichText(_) => PropertyType::RichText,
            Self::Number(_) => PropertyType::Number,
            Self::Select(_) => PropertyType::Select,
            Self::MultiSelect(_) => PropertyType::MultiSelect,
            Self::Date(_) => PropertyType::Date,
        }
    }

    /// Request-body shape for this value.
    pub fn encode(&self) -> Value {
        match self {
            Self::Title(text) => json!({ "title": rich_text_content(text) }),
            Self::RichText(text) => json!({ "rich_text": rich_text_content(text) }),
            Self::Url(url) if url.is_empty() => json!({ "url": null }),
            Self::Url(url) => json!({ "url": url }),
            Self::Number(n) => json!({ "number": n }),
            Self::Select(name) if name.is_empty() => json!({ "select": null }),
            Self::Select(name) => json!({ "select": { "name": name } }),
            Self::MultiSelect(names) => {
                let options: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
                json!({ "multi_select": options })
            }
            Self::Date(start) if start.is_empty() => json!({ "date": null }),
            Self::Date(start) => json!({ "date": { "start": start } }),
        }
    }

    /// Decodes a response-body property by its `type` tag.
    pub fn decode(value: &Value) -> Option<Self> {
        let ptype = PropertyType::from_tag(value.get("type")?.as_str()?)?;
        let text_at = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(match ptype {
            PropertyType::Title => Self::Title(plain_text(value.get("title"))),
            PropertyType::RichText => Self::RichText(plain_text(value.get("rich_text"))),
            PropertyType::Url => Self::Url(text_at("/url")),
            PropertyType::Number => Self::Number(value.get("number").and_then(Value::as_f64)),
            PropertyType::Select => Self::Select(text_at("/select/name")),
            PropertyType::MultiSelect => Self::MultiSelect(
                value
                    .get("multi_select")
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .filter_map(|o| o.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            PropertyType::Date => Self::Date(text_at("/date/start")),
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Number(n) => n.is_none(),
            Self::MultiSelect(names) => names.iter().all(|n| n.trim().is_empty()),
            other => other.as_text().trim().is_empty(),
        }
    }

    /// Text rendering used for labels and identity keys.
    pub fn as_text(&self) -> String {
        match self {
            Self::Title(s) | Self::Url(s) | Self::RichText(s) | Self::Select(s) | Self::Date(s) => {
                s.clone()
            }
            Self::Number(n) => n.map(format_number).unwrap_or_default(),
            Self::MultiSelect(names) => names.join(", "),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::MultiSelect(names) => names
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
            other => other
                .as_text()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Category-style label: select name, first option, or text.
    pub fn label(&self) -> String {
        match self {
            Self::MultiSelect(names) => names
                .iter()
                .map(|n| n.trim())
                .find(|n| !n.is_empty())
                .unwrap_or_default()
                .to_string(),
            other => other.as_text().trim().to_string(),
        }
    }
}

/// A local value on its way to a remote property of whatever type the schema
/// reports.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Link(String),
    Number(f64),
    List(Vec<String>),
    Date(String),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Link(s) | Self::Date(s) => s.trim().is_empty(),
            Self::Number(_) => false,
            Self::List(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Text(s) | Self::Link(s) | Self::Date(s) => s.trim().to_string(),
            Self::Number(n) => format_number(*n),
            Self::List(values) => clean(values).join(", "),
        }
    }
}

fn clean(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeLimits {
    pub text_chars: usize,
    pub option_chars: usize,
    pub max_options: usize,
}

impl Default for EncodeLimits {
    fn default() -> Self {
        Self {
            text_chars: 2000,
            option_chars: 100,
            max_options: 20,
        }
    }
}

/// Shapes `value` for a property of type `ptype`. Returns `None` for empty
/// values and for combinations the type cannot hold.
pub fn encode_for(ptype: PropertyType, value: &FieldValue, limits: EncodeLimits) -> Option<PropertyValue> {
    if value.is_empty() {
        return None;
    }
    let text = || truncate(&value.as_text(), limits.text_chars);
    match ptype {
        PropertyType::Title => Some(PropertyValue::Title(text())),
        PropertyType::RichText => Some(PropertyValue::RichText(text())),
        PropertyType::Url => match value {
            FieldValue::Link(link) | FieldValue::Text(link) => {
                Some(PropertyValue::Url(link.trim().to_string()))
            }
            _ => None,
        },
        PropertyType::Number => match value {
            FieldValue::Number(n) => Some(PropertyValue::Number(Some(*n))),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().map(|n| PropertyValue::Number(Some(n))),
            _ => None,
        },
        PropertyType::Select => {
            let name = match value {
                FieldValue::List(values) => clean(values).into_iter().next()?,
                other => other.as_text(),
            };
            Some(PropertyValue::Select(truncate(&name, limits.option_chars)))
        }
        PropertyType::MultiSelect => {
            let names = match value {
                FieldValue::List(values) => clean(values),
                FieldValue::Text(s) => clean(&s.split(',').map(str::to_string).collect::<Vec<_>>()),
                other => vec![other.as_text()],
            };
            let mut options: Vec<String> = Vec::new();
            for name in names {
                let name = truncate(&name, limits.option_chars);
                if !options.contains(&name) {
                    options.push(name);
                }
            }
            options.truncate(limits.max_options);
            Some(PropertyValue::MultiSelect(options))
        }
        PropertyType::Date => match value {
            FieldValue::Date(s) | FieldValue::Text(s) => Some(PropertyValue::Date(s.trim().to_string())),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_keeps_known_types_only() {
        let schema = parse_schema(&json!({
            "properties": {
                "Name": {"type": "title"},
                "GitHub": {"type": "url"},
                "Owner": {"type": "people"},
                "Stars": {"type": "number"}
            }
        }));
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get("GitHub"), Some(&PropertyType::Url));
        assert!(!schema.contains_key("Owner"));
    }

    #[test]
    fn decodes_response_shapes() {
        let title = PropertyValue::decode(&json!({
            "type": "title",
            "title": [{"plain_text": "rip"}, {"text": {"content": "grep"}}]
        }));
        assert_eq!(title, Some(PropertyValue::Title("ripgrep".into())));
        let select = PropertyValue::decode(&json!({"type": "select", "select": null}));
        assert_eq!(select, Some(PropertyValue::Select(String::new())));
        assert!(select.unwrap().is_empty());
        let number = PropertyValue::decode(&json!({"type": "number", "number": 42.0})).unwrap();
        assert_eq!(number.as_text(), "42");
        assert!(PropertyValue::decode(&json!({"type": "formula"})).is_none());
    }

    #[test]
    fn encoding_branches_on_reported_type() {
        let limits = EncodeLimits::default();
        let tags = FieldValue::List(vec!["rust".into(), " ".into(), "cli".into()]);
        assert_eq!(
            encode_for(PropertyType::MultiSelect, &tags, limits),
            Some(PropertyValue::MultiSelect(vec!["rust".into(), "cli".into()]))
        );
        assert_eq!(
            encode_for(PropertyType::RichText, &tags, limits),
            Some(PropertyValue::RichText("rust, cli".into()))
        );
        let link = FieldValue::Link("https://github.com/a/b".into());
        assert_eq!(
            encode_for(PropertyType::Url, &link, limits).map(|v| v.encode()),
            Some(json!({"url": "https://github.com/a/b"}))
        );
        assert_eq!(encode_for(PropertyType::Number, &link, limits), None);
        assert_eq!(
            encode_for(PropertyType::Number, &FieldValue::Text("2017".into()), limits),
            Some(PropertyValue::Number(Some(2017.0)))
        );
        assert_eq!(encode_for(PropertyType::Title, &FieldValue::Text("  ".into()), limits), None);
    }

    #[test]
    fn encoding_applies_limits() {
        let limits = EncodeLimits {
            text_chars: 5,
            option_chars: 3,
            max_options: 2,
        };
        assert_eq!(
            encode_for(PropertyType::RichText, &FieldValue::Text("abcdefgh".into()), limits),
            Some(PropertyValue::RichText("abcde".into()))
        );
        let list = FieldValue::List(vec!["alpha".into(), "beta".into(), "gamma".into()]);
        assert_eq!(
            encode_for(PropertyType::MultiSelect, &list, limits),
            Some(PropertyValue::MultiSelect(vec!["alp".into(), "bet".into()]))
        );
    }
}
