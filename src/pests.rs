// Pest reference library
//
// Loaded from a JSON file of the form
//   { "pests": { "<id>": Pest, ... }, "pest_details": { "<id>": PestDetails, ... } }

use crate::error::PestDataError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub scientific_name: String,
    /// Crop ids this pest attacks
    #[serde(default)]
    pub crops: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub quick_treatment: String,
    #[serde(default)]
    pub image_thumb: String,
    #[serde(default)]
    pub has_full_details: bool,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentOption {
    pub method: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestDetails {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lifecycle: Vec<String>,
    #[serde(default)]
    pub identification: Vec<String>,
    #[serde(default)]
    pub treatment_options: Vec<TreatmentOption>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub local_advice: Vec<String>,
}

/// A crop some pest in the library attacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub id: String,
    pub name: String,
}

impl Crop {
    /// `"sweet_potato"` becomes `"Sweet Potato"`.
    pub fn from_id(id: &str) -> Self {
        let name = id
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        Crop {
            id: id.to_string(),
            name,
        }
    }
}

/// Pests and detail pages keyed by pest id (sorted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PestLibrary {
    #[serde(default)]
    pests: BTreeMap<String, Pest>,
    #[serde(default, rename = "pest_details")]
    details: BTreeMap<String, PestDetails>,
}

impl PestLibrary {
    pub fn load(path: &Path) -> Result<Self, PestDataError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PestDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let library = Self::from_json(&raw).map_err(|source| PestDataError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            source = %path.display(),
            pests = library.pests.len(),
            details = library.details.len(),
            "pest library loaded"
        );
        Ok(library)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.pests.is_empty()
    }

    /// Pests affecting `crop` (exact id), or every pest when no crop is given.
    pub fn pests_for_crop(&self, crop: Option<&str>) -> Vec<&Pest> {
        match crop.filter(|c| !c.is_empty()) {
            Some(crop) => self
                .pests
                .values()
                .filter(|p| p.crops.iter().any(|c| c == crop))
                .collect(),
            None => self.pests.values().collect(),
        }
    }

    /// Pests attacking any of `crops`, each listed once, ordered by id.
    pub fn pests_for_crops(&self, crops: &[String]) -> Vec<&Pest> {
        self.pests
            .values()
            .filter(|p| p.crops.iter().any(|c| crops.contains(c)))
            .collect()
    }

    /// Distinct crop ids across all pests, sorted.
    pub fn crops(&self) -> Vec<Crop> {
        self.pests
            .values()
            .flat_map(|p| p.crops.iter())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| Crop::from_id(id))
            .collect()
    }

    pub fn crop(&self, id: &str) -> Option<Crop> {
        self.crops().into_iter().find(|c| c.id == id)
    }

    pub fn details(&self, id: &str) -> Option<&PestDetails> {
        self.details.get(id)
    }
}
