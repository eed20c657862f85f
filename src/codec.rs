use crate::models::{Catalog, Screenshot};
use crate::normalize::normalize_keys;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use serde_path_to_error::{Path, Segment};

/// How to treat an app that lists no versions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyVersionsPolicy {
    /// Keep the app; it simply has nothing to install
    #[default]
    Allow,
    /// Fail decoding
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub empty_versions: EmptyVersionsPolicy,
}

/// Why a payload could not be turned into a catalog
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("invalid catalog at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("invalid catalog at {path}: value must not be empty")]
    EmptyField { path: String },

    #[error("invalid catalog at {path}: app has no versions")]
    NoVersions { path: String },
}

impl DecodeError {
    /// JSON path of the offending value (`$` is the document root)
    pub fn path(&self) -> Option<&str> {
        match self {
            DecodeError::Syntax(_) => None,
            DecodeError::Schema { path, .. }
            | DecodeError::EmptyField { path }
            | DecodeError::NoVersions { path } => Some(path),
        }
    }
}

/// Decodes a source document using the default options
pub fn decode_catalog(bytes: &[u8]) -> Result<Catalog, DecodeError> {
    decode_catalog_with(bytes, DecodeOptions::default())
}

/// Decodes a source document: parse, normalize key names, decode, validate
pub fn decode_catalog_with(
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<Catalog, DecodeError> {
    let document: Value = serde_json::from_slice(bytes).map_err(DecodeError::Syntax)?;
    let document = normalize_keys(document);

    let catalog = decode_document(&document)?;
    validate(&catalog, options)?;

    tracing::debug!(
        "Decoded catalog {} ({} apps, {} news items)",
        catalog.name,
        catalog.apps.len(),
        catalog.news().len()
    );

    Ok(catalog)
}

/// Encodes a catalog back into its canonical JSON form
pub fn encode_catalog(catalog: &Catalog) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(catalog)
}

/// Decodes the normalized document, tracking the path of the value that fails.
///
/// A missing field is reported at the object that lacks it; a value of the
/// wrong type is reported at the value itself.
fn decode_document(document: &Value) -> Result<Catalog, DecodeError> {
    serde_path_to_error::deserialize(document).map_err(|err| {
        let path = render_path(err.path());
        if let Some(refined) = locate_screenshot_error(document, err.path(), &path) {
            return refined;
        }
        DecodeError::Schema {
            path,
            message: err.into_inner().to_string(),
        }
    })
}

fn render_path(path: &Path) -> String {
    let mut rendered = String::from("$");
    for segment in path.iter() {
        match segment {
            Segment::Seq { index } => rendered.push_str(&format!("[{index}]")),
            Segment::Map { key } | Segment::Enum { variant: key } => {
                rendered.push('.');
                rendered.push_str(key);
            }
            _ => rendered.push_str(".?"),
        }
    }
    rendered
}

fn value_at<'a>(document: &'a Value, path: &Path) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |value, segment| match segment {
            Segment::Seq { index } => value.get(*index),
            Segment::Map { key } => value.get(key.as_str()),
            _ => None,
        })
}

/// Screenshot lists go through an untagged union, so a failure inside one is
/// only reported at the list. Retry its elements one by one to find the index.
fn locate_screenshot_error(document: &Value, path: &Path, rendered: &str) -> Option<DecodeError> {
    match path.iter().last()? {
        Segment::Map { key } if key == "screenshots" => {}
        _ => return None,
    }

    match value_at(document, path)? {
        Value::Object(groups) => groups.iter().find_map(|(device, list)| {
            first_failure::<Screenshot>(list, &format!("{rendered}.{device}"))
        }),
        list => first_failure::<Screenshot>(list, rendered),
    }
}

/// Decodes each element of an array on its own and reports the first failure
fn first_failure<T: DeserializeOwned>(list: &Value, path: &str) -> Option<DecodeError> {
    list.as_array()?
        .iter()
        .enumerate()
        .find_map(|(index, item)| {
            T::deserialize(item).err().map(|err| DecodeError::Schema {
                path: format!("{path}[{index}]"),
                message: err.to_string(),
            })
        })
}

fn validate(catalog: &Catalog, options: DecodeOptions) -> Result<(), DecodeError> {
    if catalog.name.trim().is_empty() {
        return Err(DecodeError::EmptyField {
            path: "$.name".to_string(),
        });
    }

    for (index, app) in catalog.apps.iter().enumerate() {
        if app.bundle_identifier.trim().is_empty() {
            return Err(DecodeError::EmptyField {
                path: format!("$.apps[{index}].bundleIdentifier"),
            });
        }

        if app.versions.is_empty() {
            match options.empty_versions {
                EmptyVersionsPolicy::Allow => {
                    tracing::debug!("App {} has no versions to install", app.bundle_identifier);
                }
                EmptyVersionsPolicy::Reject => {
                    return Err(DecodeError::NoVersions {
                        path: format!("$.apps[{index}].versions"),
                    });
                }
            }
        }
    }

    Ok(())
}
