//! Template Catalog - postcard templates and the business data poured into them

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub type TemplateId = String;

/// Design files above this size are not offered for editing.
pub const MAX_DESIGN_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, alias = "psdFile", alias = "designFileName")]
    pub design_file: Option<String>,
    #[serde(default, alias = "psdFileSize")]
    pub design_file_size: Option<u64>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub unavailable_reason: Option<String>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default, alias = "editableElementNames")]
    pub editable_elements: Vec<String>,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub unit: DimensionUnit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionUnit {
    #[default]
    Inch,
    Pixel,
}

/// Whether a template can be opened, and why not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_valid: bool,
    pub reason: String,
    pub file_size: Option<u64>,
}

impl Template {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f.eq_ignore_ascii_case(feature))
    }

    pub fn availability(&self) -> Availability {
        if self.design_file.is_none() {
            return Availability {
                is_valid: true,
                reason: "Programmatic template - no file size limitations".into(),
                file_size: None,
            };
        }
        if !self.available {
            return Availability {
                is_valid: false,
                reason: self
                    .unavailable_reason
                    .clone()
                    .unwrap_or_else(|| "Template marked as unavailable".into()),
                file_size: self.design_file_size,
            };
        }
        if let Some(size) = self.design_file_size.filter(|s| *s > MAX_DESIGN_FILE_SIZE) {
            return Availability {
                is_valid: false,
                reason: format!(
                    "File size too large ({}) - may cause loading issues",
                    format_file_size(size)
                ),
                file_size: Some(size),
            };
        }
        Availability {
            is_valid: true,
            reason: "Template meets size requirements".into(),
            file_size: self.design_file_size,
        }
    }
}

/// `1536` → `"1.5KB"`; zero → `"0B"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".into();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Unknown,
    Small,
    Medium,
    Large,
    Xlarge,
}

impl SizeCategory {
    pub fn of(bytes: Option<u64>) -> Self {
        const MB: u64 = 1024 * 1024;
        match bytes {
            None | Some(0) => SizeCategory::Unknown,
            Some(b) if b < MB => SizeCategory::Small,
            Some(b) if b < 5 * MB => SizeCategory::Medium,
            Some(b) if b < 20 * MB => SizeCategory::Large,
            Some(_) => SizeCategory::Xlarge,
        }
    }
}

/// A service line on a postcard: either plain text or a titled entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceEntry {
    Plain(String),
    Detailed { title: String, description: String },
}

impl ServiceEntry {
    pub fn label(&self) -> String {
        match self {
            ServiceEntry::Plain(s) => s.clone(),
            ServiceEntry::Detailed { title, description } => format!("{title}: {description}"),
        }
    }
}

/// Caller-supplied content substituted into template text.
///
/// The record is free-form: scalar fields accept numbers and booleans as
/// text, and a `services` value that is not an array is treated as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessData {
    #[serde(default, deserialize_with = "scalar_text")]
    pub business_name: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub headline: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub subheadline: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub call_to_action: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub offer_amount: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub offer_description: Option<String>,
    #[serde(default, deserialize_with = "service_list")]
    pub services: Option<Vec<ServiceEntry>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_text(&serde_json::Value::deserialize(d)?))
}

/// Arrays become service lists; anything else means "no services".
fn service_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<ServiceEntry>>, D::Error> {
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(d)? else {
        return Ok(None);
    };
    let services = items
        .into_iter()
        .filter_map(|item| match value_text(&item) {
            Some(text) => Some(ServiceEntry::Plain(text)),
            None => serde_json::from_value(item).ok(),
        })
        .collect();
    Ok(Some(services))
}

impl BusinessData {
    /// Resolve a placeholder key (camelCase) to a non-empty value.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let typed = match key {
            "businessName" => self.business_name.as_deref(),
            "headline" => self.headline.as_deref(),
            "subheadline" => self.subheadline.as_deref(),
            "phone" => self.phone.as_deref(),
            "website" => self.website.as_deref(),
            "callToAction" => self.call_to_action.as_deref(),
            "offerAmount" => self.offer_amount.as_deref(),
            "offerDescription" => self.offer_description.as_deref(),
            _ => None,
        };
        let value = match typed {
            Some(v) => Some(v.to_string()),
            None => self.extra.get(key).and_then(value_text),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Many(Vec<Template>),
    One(Box<Template>),
}

/// Template catalog - loaded once at startup, read-only afterwards
#[derive(Debug, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<TemplateId, Template>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for template in serde_json::from_str::<Vec<Template>>(json)? {
            catalog.register(template);
        }
        Ok(catalog)
    }

    /// Load a single JSON file, or every `*.json` file in a directory.
    ///
    /// In directory mode unreadable or malformed files are skipped.
    pub fn load_from_path(path: &Path) -> Result<Self, CatalogError> {
        if path.is_file() {
            return Self::from_json_str(&fs::read_to_string(path)?);
        }
        let mut catalog = Self::new();
        if path.exists() {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let file = entry.path();
                if file.extension().map_or(false, |e| e == "json") {
                    let parsed = fs::read_to_string(&file)
                        .map_err(CatalogError::from)
                        .and_then(|s| Ok(serde_json::from_str::<CatalogFile>(&s)?));
                    match parsed {
                        Ok(CatalogFile::Many(list)) => list.into_iter().for_each(|t| catalog.register(t)),
                        Ok(CatalogFile::One(t)) => catalog.register(*t),
                        Err(e) => tracing::warn!(file = %file.display(), error = %e, "skipping template file"),
                    }
                }
            }
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// All templates, ordered by id.
    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn categories(&self) -> Vec<String> {
        self.templates
            .values()
            .map(|t| t.category.clone())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&Template> {
        self.templates
            .values()
            .filter(|t| category == "all" || t.category.eq_ignore_ascii_case(category))
            .collect()
    }

    /// Case-insensitive match on name, description or any feature.
    pub fn search(&self, query: &str) -> Vec<&Template> {
        let q = query.trim().to_lowercase();
        self.templates
            .values()
            .filter(|t| {
                q.is_empty()
                    || t.name.to_lowercase().contains(&q)
                    || t.description.to_lowercase().contains(&q)
                    || t.features.iter().any(|f| f.to_lowercase().contains(&q))
            })
            .collect()
    }

    /// Split into openable templates and the rest, with the reason.
    pub fn partition_by_availability(&self) -> (Vec<&Template>, Vec<(&Template, Availability)>) {
        let mut available = vec![];
        let mut unavailable = vec![];
        for template in self.templates.values() {
            let availability = template.availability();
            if availability.is_valid {
                available.push(template);
            } else {
                unavailable.push((template, availability));
            }
        }
        (available, unavailable)
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r##"[
        {"id": "cleaning", "name": "Spring Cleaning", "description": "Seasonal offer",
         "category": "Services", "primaryColor": "#17A2B8", "features": ["Image Areas", "Services"]},
        {"id": "retro", "name": "Retro Sale", "description": "Vintage look",
         "category": "Retail", "psdFile": "5248770.psd", "psdFileSize": 4200000},
        {"id": "huge", "name": "Poster", "description": "Too big",
         "category": "Retail", "designFile": "8039429.psd", "designFileSize": 31457280}
    ]"##;

    #[test]
    fn loads_camel_case_and_legacy_keys() {
        let catalog = TemplateCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 3);
        let retro = catalog.get("retro").unwrap();
        assert_eq!(retro.design_file.as_deref(), Some("5248770.psd"));
        assert!(retro.available);
        assert_eq!(catalog.categories(), vec!["Retail", "Services"]);
        assert_eq!(catalog.by_category("retail").len(), 2);
        assert_eq!(catalog.by_category("all").len(), 3);
        assert_eq!(catalog.search("image").len(), 1);
    }

    #[test]
    fn availability_rules() {
        let catalog = TemplateCatalog::from_json_str(CATALOG).unwrap();
        assert!(catalog.get("cleaning").unwrap().availability().is_valid);
        let huge = catalog.get("huge").unwrap().availability();
        assert!(!huge.is_valid);
        assert_eq!(huge.reason, "File size too large (30.0MB) - may cause loading issues");

        let (available, unavailable) = catalog.partition_by_availability();
        assert_eq!(available.len(), 2);
        assert_eq!(unavailable[0].0.id, "huge");
    }

    #[test]
    fn unavailable_flag_uses_reason() {
        let mut t = TemplateCatalog::from_json_str(CATALOG).unwrap().get("retro").unwrap().clone();
        t.available = false;
        assert_eq!(t.availability().reason, "Template marked as unavailable");
        t.unavailable_reason = Some("Licensing".into());
        assert_eq!(t.availability().reason, "Licensing");
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0B");
        assert_eq!(format_file_size(512), "512.0B");
        assert_eq!(format_file_size(6_815_744), "6.5MB");
        assert_eq!(SizeCategory::of(Some(4_200_000)), SizeCategory::Medium);
        assert_eq!(SizeCategory::of(None), SizeCategory::Unknown);
        assert_eq!(SizeCategory::of(Some(25 * 1024 * 1024)), SizeCategory::Xlarge);
    }

    #[test]
    fn business_data_lookup() {
        let data: BusinessData = serde_json::from_str(
            r#"{"businessName": "ABC Cleaning", "phone": "  ", "zip": "90210", "year": 1999,
                "services": ["Windows", {"title": "Carpet", "description": "Deep clean"}]}"#,
        )
        .unwrap();
        assert_eq!(data.lookup("businessName").as_deref(), Some("ABC Cleaning"));
        assert_eq!(data.lookup("phone"), None);
        assert_eq!(data.lookup("zip").as_deref(), Some("90210"));
        assert_eq!(data.lookup("year").as_deref(), Some("1999"));
        let services = data.services.unwrap();
        assert_eq!(services[1].label(), "Carpet: Deep clean");
    }

    #[test]
    fn non_array_services_count_as_absent() {
        let data: BusinessData =
            serde_json::from_str(r#"{"services": "Windows", "offerAmount": "20% OFF"}"#).unwrap();
        assert!(data.services.is_none());
        assert_eq!(data.lookup("offerAmount").as_deref(), Some("20% OFF"));

        let data: BusinessData = serde_json::from_str(r#"{"services": null}"#).unwrap();
        assert!(data.services.is_none());
    }

    #[test]
    fn numeric_scalars_are_read_as_text() {
        let data: BusinessData = serde_json::from_str(
            r#"{"offerAmount": 50, "phone": 5551234, "services": [1, "Gutters", {"bad": true}]}"#,
        )
        .unwrap();
        assert_eq!(data.offer_amount.as_deref(), Some("50"));
        assert_eq!(data.phone.as_deref(), Some("5551234"));
        let labels: Vec<String> = data.services.unwrap().iter().map(|s| s.label()).collect();
        assert_eq!(labels, ["1", "Gutters"]);
    }
}
