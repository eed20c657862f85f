use serde_json::{Map, Value};

/// Wire keys written in snake_case, or in a legacy spelling, and the canonical
/// names the models decode
const KEY_MAP: &[(&str, &str)] = &[
    ("api_version", "apiVersion"),
    ("app_id", "appID"),
    ("app_permissions", "appPermissions"),
    ("build_version", "buildVersion"),
    ("bundle_identifier", "bundleIdentifier"),
    ("developer_name", "developerName"),
    ("download_url", "downloadURL"),
    ("featured_apps", "featuredApps"),
    ("header_url", "headerURL"),
    ("icon_url", "iconURL"),
    ("image_url", "imageURL"),
    ("localized_description", "localizedDescription"),
    ("max_os_version", "maxOSVersion"),
    ("min_os_version", "minOSVersion"),
    ("screenshotURLs", "screenshots"),
    ("screenshot_urls", "screenshots"),
    ("source_url", "sourceURL"),
    ("tint_color", "tintColor"),
    ("usage_description", "usageDescription"),
    ("user_info", "userInfo"),
];

/// Keys whose object values are free-form maps; their keys belong to the
/// publisher, not to the schema
const FREE_FORM_KEYS: &[&str] = &["privacy", "userInfo"];

/// Returns the canonical name for a wire key, or the key itself when it has
/// no other spelling in the schema
pub fn canonical_key(key: &str) -> &str {
    KEY_MAP
        .iter()
        .find(|(wire, _)| *wire == key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(key)
}

/// Rewrites every snake_case or legacy schema key in the document to its
/// canonical name.
///
/// Unknown keys are kept as they are. When a document carries both spellings
/// of the same field, the canonical one wins.
pub fn normalize_keys(value: Value) -> Value {
    normalize(value, false)
}

fn normalize(value: Value, free_form: bool) -> Value {
    match value {
        Value::Object(map) if free_form => Value::Object(map),
        Value::Object(map) => Value::Object(normalize_object(map)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|item| normalize(item, false)).collect())
        }
        other => other,
    }
}

fn normalize_object(map: Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::with_capacity(map.len());
    let mut renamed = Vec::new();

    for (key, value) in map {
        let canonical = canonical_key(&key);
        if canonical == key {
            let free_form = FREE_FORM_KEYS.contains(&canonical);
            normalized.insert(key, normalize(value, free_form));
        } else {
            renamed.push((canonical.to_string(), value));
        }
    }

    for (key, value) in renamed {
        if normalized.contains_key(&key) {
            tracing::debug!("Ignoring duplicate spelling of {}", key);
            continue;
        }
        let free_form = FREE_FORM_KEYS.contains(&key.as_str());
        normalized.insert(key, normalize(value, free_form));
    }

    normalized
}
