//! Item to remote property payload, shaped by the reported schema.

use std::collections::BTreeMap;

use shelf_core::Item;
use shelf_remote::{encode_for, EncodeLimits, FieldValue, Properties, PropertyMap, Schema};
use tracing::warn;

/// Title written when an item has none: DOI, then id, then `Untitled`.
pub fn placeholder_title(item: &Item) -> String {
    [item.attribute("doi"), item.id.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

pub struct PayloadBuilder {
    map: PropertyMap,
    schema: Schema,
    limits: EncodeLimits,
    category_warned: bool,
}

impl PayloadBuilder {
    pub fn new(map: PropertyMap, schema: Schema) -> Self {
        Self {
            map,
            schema,
            limits: EncodeLimits::default(),
            category_warned: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn put(&self, properties: &mut Properties, name: &str, value: FieldValue, limits: EncodeLimits) {
        if name.is_empty() {
            return;
        }
        let Some(ptype) = self.schema.get(name).copied() else {
            return;
        };
        if let Some(encoded) = encode_for(ptype, &value, limits) {
            properties.insert(name.to_string(), encoded);
        }
    }

    /// Properties for `item` living in the category named `category_name`,
    /// plus remote-only enrichment values. Properties the schema does not
    /// report are left out.
    pub fn build(
        &mut self,
        item: &Item,
        category_name: &str,
        enrichment: &BTreeMap<String, FieldValue>,
    ) -> Properties {
        let mut properties = Properties::new();
        let limits = self.limits;
        let title = if item.title.trim().is_empty() {
            placeholder_title(item)
        } else {
            item.title.clone()
        };

        self.put(&mut properties, &self.map.title, FieldValue::Text(title), limits);
        self.put(
            &mut properties,
            &self.map.primary_link,
            FieldValue::Link(item.primary_link.clone()),
            limits,
        );
        self.put(
            &mut properties,
            &self.map.description,
            FieldValue::Text(item.description.clone()),
            limits,
        );
        let tag_limits = EncodeLimits {
            max_options: self.map.tag_limit.min(limits.max_options),
            ..limits
        };
        let tags: Vec<String> = item.tags.iter().take(self.map.tag_limit).cloned().collect();
        self.put(&mut properties, &self.map.tags, FieldValue::List(tags), tag_limits);
        self.put(
            &mut properties,
            &self.map.external_id,
            FieldValue::Text(item.external_id.clone()),
            limits,
        );
        for (property, link) in self.map.secondary_links.iter().zip(&item.secondary_links) {
            self.put(&mut properties, property, FieldValue::Link(link.clone()), limits);
        }
        for (key, property) in &self.map.attributes {
            self.put(
                &mut properties,
                property,
                FieldValue::Text(item.attribute(key).to_string()),
                limits,
            );
        }
        for (key, value) in enrichment {
            if let Some(property) = self.map.enrichment.get(key) {
                self.put(&mut properties, property, value.clone(), limits);
            }
        }

        if !self.map.category.is_empty() && !self.schema.contains_key(&self.map.category) {
            if !self.category_warned {
                warn!(property = %self.map.category, "category property not in remote schema, not writing categories");
                self.category_warned = true;
            }
        } else {
            self.put(
                &mut properties,
                &self.map.category,
                FieldValue::Text(category_name.to_string()),
                limits,
            );
        }

        properties
    }
}
