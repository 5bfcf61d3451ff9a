use crate::models::{SchemaEntity, SchemaSource};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeSet;

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("json-ld selector should be valid")
});
static ITEMSCOPE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[itemscope][itemtype]").expect("itemscope selector should be valid")
});
static ITEMPROP_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemprop]").expect("itemprop selector should be valid"));

/// Types treated as an Organization for identity purposes.
const ORGANIZATION_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "NGO",
    "EducationalOrganization",
    "GovernmentOrganization",
    "MedicalOrganization",
    "NewsMediaOrganization",
    "OnlineBusiness",
    "OnlineStore",
    "ProfessionalService",
    "Restaurant",
    "SportsOrganization",
    "Store",
];

/// Recommended properties per type, checked by the schema deep dive.
const RECOMMENDED_PROPERTIES: &[(&str, &[&str])] = &[
    ("Organization", &["name", "url", "logo", "sameAs"]),
    ("LocalBusiness", &["name", "address", "telephone", "openingHoursSpecification"]),
    ("Person", &["name", "url", "sameAs"]),
    ("Product", &["name", "image", "offers", "description"]),
    ("Article", &["headline", "author", "datePublished", "image"]),
    ("BlogPosting", &["headline", "author", "datePublished", "image"]),
    ("NewsArticle", &["headline", "author", "datePublished", "image"]),
    ("BreadcrumbList", &["itemListElement"]),
    ("FAQPage", &["mainEntity"]),
    ("WebSite", &["name", "url"]),
    ("Event", &["name", "startDate", "location"]),
    ("Recipe", &["name", "recipeIngredient", "recipeInstructions"]),
];

/// Extracts all JSON-LD and microdata entities from a document.
pub fn extract_entities(document: &Html) -> Vec<SchemaEntity> {
    let mut entities = Vec::new();

    for script in document.select(&JSON_LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => collect_json_ld(&value, &mut entities),
            Err(e) => tracing::debug!(error = %e, "Skipping malformed JSON-LD block"),
        }
    }

    for element in document.select(&ITEMSCOPE_SELECTOR) {
        if let Some(entity) = microdata_entity(element) {
            entities.push(entity);
        }
    }

    entities
}

fn short_type_name(raw: &str) -> String {
    raw.rsplit('/').next().unwrap_or(raw).trim().to_string()
}

fn collect_json_ld(value: &Value, entities: &mut Vec<SchemaEntity>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_ld(item, entities);
            }
        }
        Value::Object(map) => {
            let types: Vec<String> = match map.get("@type") {
                Some(Value::String(t)) => vec![short_type_name(t)],
                Some(Value::Array(ts)) => ts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(short_type_name)
                    .collect(),
                _ => Vec::new(),
            };

            if !types.is_empty() {
                let properties: BTreeSet<String> = map
                    .iter()
                    .filter(|(key, value)| !key.starts_with('@') && !is_empty_value(value))
                    .map(|(key, _)| key.clone())
                    .collect();
                for schema_type in types {
                    entities.push(SchemaEntity {
                        schema_type,
                        source: SchemaSource::JsonLd,
                        properties: properties.clone(),
                    });
                }
            }

            // Nested entities (@graph, publisher, author, ...) are entities too.
            for (key, nested) in map {
                if key == "@context" {
                    continue;
                }
                if nested.is_object() || nested.is_array() {
                    collect_json_ld(nested, entities);
                }
            }
        }
        _ => {}
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn microdata_entity(element: ElementRef<'_>) -> Option<SchemaEntity> {
    let item_type = element.value().attr("itemtype")?;
    let schema_type = short_type_name(item_type.split_whitespace().next()?);
    if schema_type.is_empty() {
        return None;
    }
    let properties = element
        .select(&ITEMPROP_SELECTOR)
        .filter_map(|prop| prop.value().attr("itemprop"))
        .flat_map(|names| names.split_whitespace().map(str::to_string))
        .collect();
    Some(SchemaEntity {
        schema_type,
        source: SchemaSource::Microdata,
        properties,
    })
}

pub fn is_organization_type(schema_type: &str) -> bool {
    ORGANIZATION_TYPES.contains(&schema_type)
}

/// An Organization with `name` and `url`, or a Person with `name`.
pub fn is_identity_entity(entity: &SchemaEntity) -> bool {
    let has = |prop: &str| entity.properties.contains(prop);
    if is_organization_type(&entity.schema_type) {
        has("name") && has("url")
    } else if entity.schema_type == "Person" {
        has("name")
    } else {
        false
    }
}

pub fn has_identity_schema(entities: &[SchemaEntity]) -> bool {
    entities.iter().any(is_identity_entity)
}

/// Recommended properties the entity does not carry. Unknown types have none.
pub fn missing_recommended_properties(entity: &SchemaEntity) -> Vec<&'static str> {
    RECOMMENDED_PROPERTIES
        .iter()
        .find(|(schema_type, _)| *schema_type == entity.schema_type)
        .map(|(_, props)| {
            props
                .iter()
                .copied()
                .filter(|prop| !entity.properties.contains(*prop))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(html: &str) -> Vec<SchemaEntity> {
        extract_entities(&Html::parse_document(html))
    }

    #[test]
    fn test_json_ld_organization_is_identity() {
        let found = entities(
            r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@type":"Organization","name":"Acme","url":"https://acme.test"}
            </script></head><body></body></html>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].schema_type, "Organization");
        assert!(has_identity_schema(&found));
    }

    #[test]
    fn test_organization_without_url_is_not_identity() {
        let found = entities(
            r#"<script type="application/ld+json">{"@type":"Organization","name":"Acme"}</script>"#,
        );
        assert!(!has_identity_schema(&found));
    }

    #[test]
    fn test_graph_and_nested_entities() {
        let found = entities(
            r#"<script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
              {"@type":"WebPage","name":"Home","publisher":{"@type":"Person","name":"Jo"}},
              {"@type":["LocalBusiness","Store"],"name":"Shop","url":"https://shop.test"}
            ]}</script>"#,
        );
        let types: Vec<_> = found.iter().map(|e| e.schema_type.as_str()).collect();
        assert!(types.contains(&"WebPage"));
        assert!(types.contains(&"Person"));
        assert!(types.contains(&"LocalBusiness"));
        assert!(types.contains(&"Store"));
        assert!(has_identity_schema(&found));
    }

    #[test]
    fn test_malformed_json_ld_is_skipped() {
        let found = entities(r#"<script type="application/ld+json">{ not json </script>"#);
        assert!(found.is_empty());
    }

    #[test]
    fn test_microdata_entity() {
        let found = entities(
            r#"<div itemscope itemtype="https://schema.org/Person">
                 <span itemprop="name">Ada</span><a itemprop="url" href="/ada">me</a>
               </div>"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, SchemaSource::Microdata);
        assert!(found[0].properties.contains("name"));
        assert!(has_identity_schema(&found));
    }

    #[test]
    fn test_missing_recommended_properties() {
        let found = entities(
            r#"<script type="application/ld+json">{"@type":"Product","name":"Widget","image":""}</script>"#,
        );
        let missing = missing_recommended_properties(&found[0]);
        assert_eq!(missing, vec!["image", "offers", "description"]);
    }
}
