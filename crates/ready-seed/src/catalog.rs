//! Reference records the application expects to exist after bootstrap.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const MILESTONE_CATEGORIES: [&str; 4] = ["motor", "social", "language", "cognitive"];

fn default_dose_number() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaccineEntry {
    /// Natural key.
    pub vaccine_name: String,
    pub description: String,
    pub age_in_months: u32,
    #[serde(default = "default_dose_number")]
    pub dose_number: u32,
    #[serde(default = "default_true")]
    pub is_mandatory: bool,
    #[serde(default)]
    pub protects_against: String,
    #[serde(default)]
    pub side_effects: String,
    #[serde(default)]
    pub notes: String,
}

impl VaccineEntry {
    fn scheduled(vaccine_name: &str, description: &str, age_in_months: u32) -> Self {
        Self {
            vaccine_name: vaccine_name.to_string(),
            description: description.to_string(),
            age_in_months,
            dose_number: default_dose_number(),
            is_mandatory: true,
            protects_against: String::new(),
            side_effects: String::new(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilestoneEntry {
    /// Natural key.
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub typical_age_months: u32,
}

impl MilestoneEntry {
    fn expected(title: &str, category: &str, typical_age_months: u32) -> Self {
        Self {
            title: title.to_string(),
            category: category.to_string(),
            description: None,
            typical_age_months,
        }
    }

    pub fn description_text(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Child should achieve {}", self.title))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCatalog {
    #[serde(default)]
    pub vaccines: Vec<VaccineEntry>,
    #[serde(default)]
    pub milestones: Vec<MilestoneEntry>,
}

impl Default for SeedCatalog {
    /// The national immunization schedule and the developmental milestones
    /// shipped with the application.
    fn default() -> Self {
        let vaccines = [
            ("BCG", "Tuberculosis", 0),
            ("Hepatitis B (Birth)", "Hepatitis B", 0),
            ("OPV-0", "Polio", 0),
            ("Pentavalent-1", "DPT + HepB + Hib", 1),
            ("Rotavirus-1", "Diarrhea", 1),
            ("Pentavalent-2", "DPT + HepB + Hib", 2),
            ("Pentavalent-3", "DPT + HepB + Hib", 3),
            ("Measles-1", "Measles", 9),
            ("Vitamin A", "Eye Health", 9),
            ("Booster DPT-1", "Diphtheria, Pertussis, Tetanus", 16),
        ]
        .into_iter()
        .map(|(name, description, age)| VaccineEntry::scheduled(name, description, age))
        .collect();

        let milestones = [
            ("Social Smile", "social", 2),
            ("Holds Head Steady", "motor", 4),
            ("Rolls Over", "motor", 6),
            ("Responds to Name", "social", 7),
            ("Sits Without Support", "motor", 9),
            ("Says 'Mama'/'Dada'", "language", 12),
            ("Walks Alone", "motor", 15),
            ("Points to objects", "cognitive", 18),
        ]
        .into_iter()
        .map(|(title, category, age)| MilestoneEntry::expected(title, category, age))
        .collect();

        Self {
            vaccines,
            milestones,
        }
    }
}

impl SeedCatalog {
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for vaccine in &self.vaccines {
            let name = vaccine.vaccine_name.trim();
            if name.is_empty() {
                bail!("seed catalog contains a vaccine with an empty name");
            }
            if !names.insert(name) {
                bail!("seed catalog lists vaccine '{name}' more than once");
            }
        }

        let mut titles = BTreeSet::new();
        for milestone in &self.milestones {
            let title = milestone.title.trim();
            if title.is_empty() {
                bail!("seed catalog contains a milestone with an empty title");
            }
            if !titles.insert(title) {
                bail!("seed catalog lists milestone '{title}' more than once");
            }
            if !MILESTONE_CATEGORIES.contains(&milestone.category.as_str()) {
                bail!(
                    "milestone '{title}' has unknown category '{}' (expected one of {})",
                    milestone.category,
                    MILESTONE_CATEGORIES.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Reads a JSON catalog, or returns the built-in one when `path` is `None`.
pub fn load_catalog(path: Option<&Path>) -> Result<SeedCatalog> {
    let Some(path) = path else {
        return Ok(SeedCatalog::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed catalog {}", path.display()))?;
    let catalog: SeedCatalog = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed catalog {}", path.display()))?;
    catalog
        .validate()
        .with_context(|| format!("invalid seed catalog {}", path.display()))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_builtin_catalog_is_valid_and_complete() {
        let catalog = SeedCatalog::default();
        catalog.validate().expect("builtin catalog");
        assert_eq!(catalog.vaccines.len(), 10);
        assert_eq!(catalog.milestones.len(), 8);
        assert!(catalog.vaccines.iter().all(|vaccine| vaccine.is_mandatory));
        assert_eq!(
            catalog.milestones[0].description_text(),
            "Child should achieve Social Smile"
        );
    }

    #[test]
    fn functional_load_catalog_applies_field_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{
  "vaccines": [{"vaccine_name": "IPV-1", "description": "Polio", "age_in_months": 1}],
  "milestones": [{"title": "Babbles", "category": "language", "typical_age_months": 6}]
}"#,
        )
        .expect("write catalog");

        let catalog = load_catalog(Some(&path)).expect("load");
        assert_eq!(catalog.vaccines[0].dose_number, 1);
        assert!(catalog.vaccines[0].is_mandatory);
        assert_eq!(catalog.milestones[0].description_text(), "Child should achieve Babbles");
    }

    #[test]
    fn regression_load_catalog_rejects_duplicate_natural_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"vaccines": [
  {"vaccine_name": "BCG", "description": "a", "age_in_months": 0},
  {"vaccine_name": "BCG", "description": "b", "age_in_months": 0}
]}"#,
        )
        .expect("write catalog");

        let error = load_catalog(Some(&path)).expect_err("duplicate");
        assert!(format!("{error:#}").contains("'BCG' more than once"));
    }

    #[test]
    fn regression_load_catalog_rejects_unknown_milestone_category() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"milestones": [{"title": "Juggles", "category": "circus", "typical_age_months": 30}]}"#,
        )
        .expect("write catalog");

        let error = load_catalog(Some(&path)).expect_err("category");
        assert!(format!("{error:#}").contains("unknown category 'circus'"));
    }
}
