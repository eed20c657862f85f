use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Root of an app source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "iconURL", skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, rename = "headerURL", skip_serializing_if = "Option::is_none")]
    pub header_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, rename = "tintColor", skip_serializing_if = "Option::is_none")]
    pub tint_color: Option<String>,
    #[serde(default, rename = "sourceURL", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Bundle identifiers the source wants highlighted
    #[serde(default, rename = "featuredApps", skip_serializing_if = "Option::is_none")]
    pub featured_apps: Option<Vec<String>>,
    pub apps: Vec<App>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<Vec<NewsItem>>,
    #[serde(default, rename = "userInfo", skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Catalog {
    /// Looks up an app by bundle identifier
    pub fn app(&self, bundle_identifier: &str) -> Option<&App> {
        self.apps
            .iter()
            .find(|app| app.bundle_identifier == bundle_identifier)
    }

    /// Resolves `featuredApps` against the app list, skipping identifiers that
    /// do not name an app in this catalog
    pub fn featured_apps(&self) -> Vec<&App> {
        self.featured_apps
            .iter()
            .flatten()
            .filter_map(|id| self.app(id))
            .collect()
    }

    pub fn news(&self) -> &[NewsItem] {
        self.news.as_deref().unwrap_or_default()
    }

    pub fn news_for_app<'a>(
        &'a self,
        bundle_identifier: &'a str,
    ) -> impl Iterator<Item = &'a NewsItem> {
        self.news()
            .iter()
            .filter(move |item| item.app_id.as_deref() == Some(bundle_identifier))
    }
}

/// One installable application entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    #[serde(rename = "bundleIdentifier")]
    pub bundle_identifier: String,
    #[serde(rename = "developerName")]
    pub developer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(rename = "localizedDescription")]
    pub localized_description: String,
    #[serde(rename = "iconURL")]
    pub icon_url: String,
    #[serde(default, rename = "tintColor", skip_serializing_if = "Option::is_none")]
    pub tint_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_screenshots",
        skip_serializing_if = "Option::is_none"
    )]
    pub screenshots: Option<Vec<Screenshot>>,
    pub versions: Vec<AppVersion>,
    #[serde(default, rename = "appPermissions", skip_serializing_if = "Option::is_none")]
    pub app_permissions: Option<AppPermissions>,
}

impl App {
    pub fn id(&self) -> &str {
        &self.bundle_identifier
    }

    /// Sources list versions newest first
    pub fn latest_version(&self) -> Option<&AppVersion> {
        self.versions.first()
    }

    pub fn is_installable(&self) -> bool {
        self.latest_version().is_some()
    }

    pub fn screenshots(&self) -> &[Screenshot] {
        self.screenshots.as_deref().unwrap_or_default()
    }
}

/// A screenshot reference, either a bare URL or an image record with dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Screenshot {
    Url(String),
    Detailed(DetailedScreenshot),
}

impl Screenshot {
    pub fn url(&self) -> &str {
        match self {
            Screenshot::Url(url) => url,
            Screenshot::Detailed(image) => &image.image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedScreenshot {
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Screenshots arrive either as one list or grouped per device (`iphone`, `ipad`)
#[derive(Deserialize)]
#[serde(untagged)]
enum ScreenshotsWire {
    List(Vec<Screenshot>),
    ByDevice(BTreeMap<String, Vec<Screenshot>>),
}

fn deserialize_screenshots<'de, D>(deserializer: D) -> Result<Option<Vec<Screenshot>>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Option::<ScreenshotsWire>::deserialize(deserializer)?;
    Ok(wire.map(|wire| match wire {
        ScreenshotsWire::List(list) => list,
        ScreenshotsWire::ByDevice(groups) => groups.into_values().flatten().collect(),
    }))
}

/// App version entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppVersion {
    pub version: String,
    #[serde(default, rename = "buildVersion", skip_serializing_if = "Option::is_none")]
    pub build_version: Option<String>,
    pub date: String,
    /// Release notes
    #[serde(default, rename = "localizedDescription")]
    pub localized_description: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, rename = "minOSVersion", skip_serializing_if = "Option::is_none")]
    pub min_os_version: Option<String>,
    #[serde(default, rename = "maxOSVersion", skip_serializing_if = "Option::is_none")]
    pub max_os_version: Option<String>,
}

impl AppVersion {
    /// Parses `date`, which sources write either as RFC 3339 or as a plain
    /// `YYYY-MM-DD` day
    pub fn release_date(&self) -> Option<DateTime<FixedOffset>> {
        if let Ok(datetime) = DateTime::parse_from_rfc3339(&self.date) {
            return Some(datetime);
        }
        let day = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        Some(day.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset())
    }
}

/// App permissions structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppPermissions {
    #[serde(
        default,
        deserialize_with = "deserialize_entitlements",
        skip_serializing_if = "Option::is_none"
    )]
    pub entitlements: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_privacy",
        skip_serializing_if = "Option::is_none"
    )]
    pub privacy: Option<Vec<PrivacyPermission>>,
}

/// A privacy-sensitive capability and the reason the app gives for using it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPermission {
    pub name: String,
    #[serde(rename = "usageDescription")]
    pub usage_description: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrivacyWire {
    List(Vec<PrivacyPermission>),
    Map(BTreeMap<String, String>),
}

fn deserialize_privacy<'de, D>(deserializer: D) -> Result<Option<Vec<PrivacyPermission>>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Option::<PrivacyWire>::deserialize(deserializer)?;
    Ok(wire.map(|wire| match wire {
        PrivacyWire::List(list) => list,
        PrivacyWire::Map(map) => map
            .into_iter()
            .map(|(name, usage_description)| PrivacyPermission {
                name,
                usage_description,
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntitlementWire {
    Name(String),
    Record { name: String },
}

fn deserialize_entitlements<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Option::<Vec<EntitlementWire>>::deserialize(deserializer)?;
    Ok(wire.map(|list| {
        list.into_iter()
            .map(|entry| match entry {
                EntitlementWire::Name(name) | EntitlementWire::Record { name } => name,
            })
            .collect()
    }))
}

/// News item for updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub identifier: String,
    pub caption: String,
    pub date: String,
    #[serde(default, rename = "tintColor", skip_serializing_if = "Option::is_none")]
    pub tint_color: Option<String>,
    #[serde(default, rename = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "appID", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl NewsItem {
    pub fn id(&self) -> &str {
        &self.identifier
    }
}
