//! Mapping model feature identifiers onto taxonomy symptoms

use crate::error::{CaretabError, Result};
use crate::normalize::{normalize_feature, strip_prefix_ignore_case};
use crate::taxonomy::{Symptom, TaxonomyStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Group name for matches whose symptom has no category
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatch {
    pub feature: String,
    pub normalized: String,
    pub symptom: String,
    pub category_id: Option<i64>,
    pub category: Option<String>,
}

/// Symptoms whose names normalize to the same key as an earlier one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowedSymptoms {
    pub key: String,
    pub winner: String,
    pub shadowed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatchReport {
    pub matched: Vec<FeatureMatch>,
    pub unmatched: Vec<String>,
    pub shadowed: Vec<ShadowedSymptoms>,
}

impl FeatureMatchReport {
    /// Matches grouped by category name, alphabetical, with unassigned
    /// matches last under "Uncategorized"
    pub fn grouped_by_category(&self) -> IndexMap<String, Vec<&FeatureMatch>> {
        let mut named: Vec<(&str, &FeatureMatch)> = Vec::new();
        let mut unassigned = Vec::new();
        for m in &self.matched {
            match m.category.as_deref() {
                Some(category) => named.push((category, m)),
                None => unassigned.push(m),
            }
        }
        named.sort_by_key(|(category, _)| category.to_lowercase());

        let mut groups: IndexMap<String, Vec<&FeatureMatch>> = IndexMap::new();
        for (category, m) in named {
            groups.entry(category.to_string()).or_default().push(m);
        }
        if !unassigned.is_empty() {
            groups.insert(UNCATEGORIZED.to_string(), unassigned);
        }
        groups
    }
}

/// Reverse index from normalized symptom names to symptoms
#[derive(Debug, Clone)]
pub struct FeatureMatcher {
    prefix: String,
    index: HashMap<String, Symptom>,
    shadowed: Vec<ShadowedSymptoms>,
}

impl FeatureMatcher {
    /// Build the index; when two names collide the earliest registered
    /// symptom wins.
    pub fn new(mut symptoms: Vec<Symptom>, prefix: &str) -> Self {
        symptoms.sort_by_key(|s| s.seq);

        let mut index: HashMap<String, Symptom> = HashMap::with_capacity(symptoms.len());
        let mut collisions: IndexMap<String, Vec<String>> = IndexMap::new();
        for symptom in symptoms {
            // Same normalization as identifiers, prefix included
            let key = normalize_feature(&symptom.name, prefix);
            if key.is_empty() {
                continue;
            }
            if index.contains_key(&key) {
                collisions.entry(key).or_default().push(symptom.name);
            } else {
                index.insert(key, symptom);
            }
        }

        let shadowed: Vec<ShadowedSymptoms> = collisions
            .into_iter()
            .filter_map(|(key, shadowed)| {
                let winner = index.get(&key)?.name.clone();
                Some(ShadowedSymptoms { key, winner, shadowed })
            })
            .collect();
        for s in &shadowed {
            log::warn!(
                "Symptoms {:?} normalize like '{}' and are shadowed by it",
                s.shadowed,
                s.winner
            );
        }

        Self {
            prefix: prefix.to_string(),
            index,
            shadowed,
        }
    }

    /// Index the symptoms currently in the store
    pub fn from_store(store: &TaxonomyStore<'_>, prefix: &str) -> Result<Self> {
        Ok(Self::new(store.symptoms_by_registration()?, prefix))
    }

    pub fn lookup(&self, feature: &str) -> Option<&Symptom> {
        self.index.get(&normalize_feature(feature, &self.prefix))
    }

    pub fn match_features<S: AsRef<str>>(&self, features: &[S]) -> FeatureMatchReport {
        let mut report = FeatureMatchReport {
            shadowed: self.shadowed.clone(),
            ..Default::default()
        };
        for feature in features {
            let feature = feature.as_ref().trim();
            if feature.is_empty() {
                continue;
            }
            let normalized = normalize_feature(feature, &self.prefix);
            match self.index.get(&normalized) {
                Some(symptom) => report.matched.push(FeatureMatch {
                    feature: feature.to_string(),
                    normalized,
                    symptom: symptom.name.clone(),
                    category_id: symptom.category_id,
                    category: symptom.category.clone(),
                }),
                None => report.unmatched.push(feature.to_string()),
            }
        }
        log::debug!(
            "Matched {} features, {} unmatched",
            report.matched.len(),
            report.unmatched.len()
        );
        report
    }
}

/// Read feature identifiers from `path`.
///
/// `.csv`/`.tsv` files contribute the header columns carrying `prefix`;
/// anything else is read as one identifier per line with `#` comments.
pub fn read_feature_list(path: &Path, prefix: &str) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    let content = raw.strip_prefix('\u{FEFF}').unwrap_or(raw.as_str());
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let features = match extension.as_deref() {
        Some("csv") => header_features(content, ',', prefix),
        Some("tsv") => header_features(content, '\t', prefix),
        _ => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
    };

    if features.is_empty() {
        return Err(CaretabError::invalid_input(format!(
            "No feature identifiers found in '{}'",
            path.display()
        )));
    }
    Ok(features)
}

fn header_features(content: &str, delimiter: char, prefix: &str) -> Vec<String> {
    let header = content.lines().next().unwrap_or("");
    header
        .split(delimiter)
        .map(|c| c.trim().trim_matches('"').trim())
        .filter(|c| !c.is_empty())
        .filter(|c| prefix.is_empty() || strip_prefix_ignore_case(c, prefix).len() < c.len())
        .map(str::to_string)
        .collect()
}
