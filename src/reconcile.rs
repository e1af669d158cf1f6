//! Mining the free-text risk field for terms the taxonomy lacks

use crate::error::{CaretabError, Result};
use crate::normalize::{casefold_key, normalize_column_name};
use crate::storage::{quote_identifier, table_columns, Database, RECORDS_TABLE};
use crate::taxonomy::{load_symptoms, BulkReport, ItemStatus, Symptom, SymptomAssignment, TaxonomyStore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Comma look-alikes that caregivers paste in from other keyboards. They are
/// reported, never split on.
pub const ALTERNATE_COMMAS: [char; 4] = ['\u{FF0C}', '\u{3001}', '\u{FE50}', '\u{FE51}'];

/// Whole-cell values meaning "nothing recorded"
const NULL_SENTINELS: &[&str] = &["none", "no", "n/a", "na", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Known symptom without a category
    ExistingNull,
    /// Not in the taxonomy at all
    New,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    pub symptom: String,
    pub classification: Classification,
}

impl MissingItem {
    pub fn key(&self) -> String {
        casefold_key(&self.symptom)
    }
}

/// A stored value containing comma look-alikes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatIssue {
    pub value: String,
    pub characters: Vec<char>,
    /// Number of records carrying this exact value
    pub records: u64,
}

/// Outcome of one scan of stored records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub column: String,
    pub records_scanned: u64,
    pub distinct_terms: usize,
    /// Ordered by normalized key
    pub missing_items: Vec<MissingItem>,
    pub format_issues: Vec<FormatIssue>,
}

impl ScanReport {
    /// Normalized keys of the worklist
    pub fn keys(&self) -> BTreeSet<String> {
        self.missing_items.iter().map(MissingItem::key).collect()
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.missing_items
            .iter()
            .filter(|i| i.classification == classification)
            .count()
    }
}

/// Distinct terms found in a set of values, keyed by normalized form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    /// key -> first display form seen
    pub terms: BTreeMap<String, String>,
    pub format_issues: BTreeMap<String, u64>,
}

impl TermSet {
    fn add_value(mut self, value: &str) -> Self {
        if value.contains(&ALTERNATE_COMMAS[..]) {
            *self.format_issues.entry(value.trim().to_string()).or_insert(0) += 1;
        }
        for term in extract_terms(value) {
            self.terms.entry(casefold_key(term)).or_insert_with(|| term.to_string());
        }
        self
    }

    /// Combine with a set built from later values; earlier display forms win
    fn merge(mut self, later: Self) -> Self {
        for (key, display) in later.terms {
            self.terms.entry(key).or_insert(display);
        }
        for (value, count) in later.format_issues {
            *self.format_issues.entry(value).or_insert(0) += count;
        }
        self
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.terms.keys().cloned().collect()
    }
}

/// Split one cell into trimmed, non-empty terms. Only the plain comma
/// separates terms.
pub fn extract_terms(value: &str) -> Vec<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || NULL_SENTINELS.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
        return Vec::new();
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Collect distinct terms from many values in parallel
pub fn collect_terms<S: AsRef<str> + Sync>(values: &[Option<S>]) -> TermSet {
    values
        .par_iter()
        .fold(TermSet::default, |set, value| match value {
            Some(v) => set.add_value(v.as_ref()),
            None => set,
        })
        .reduce(TermSet::default, TermSet::merge)
}

/// Classify terms against the taxonomy. Categorized symptoms drop out;
/// known ones keep the taxonomy's spelling.
pub fn classify(terms: &TermSet, symptoms: &[Symptom]) -> Vec<MissingItem> {
    let mut index: HashMap<String, &Symptom> = HashMap::with_capacity(symptoms.len());
    for symptom in symptoms {
        index.entry(casefold_key(&symptom.name)).or_insert(symptom);
    }

    terms
        .terms
        .iter()
        .filter_map(|(key, display)| match index.get(key) {
            Some(symptom) if symptom.category_id.is_some() => None,
            Some(symptom) => Some(MissingItem {
                symptom: symptom.name.clone(),
                classification: Classification::ExistingNull,
            }),
            None => Some(MissingItem {
                symptom: display.clone(),
                classification: Classification::New,
            }),
        })
        .collect()
}

/// Scans stored records and resolves the resulting worklist
pub struct Reconciler<'a> {
    db: &'a Database,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Build the worklist for `column`.
    ///
    /// Reads records and taxonomy in one read transaction on a separate
    /// connection, so the two are consistent with each other and commits are
    /// not blocked. Scanning never writes.
    pub fn scan(&self, column: &str) -> Result<ScanReport> {
        let mut conn = self.db.reader()?;
        let tx = conn.transaction()?;

        let storage_columns = table_columns(&tx, RECORDS_TABLE)?;
        let wanted = normalize_column_name(column);
        let Some(column) = storage_columns
            .iter()
            .find(|c| normalize_column_name(c) == wanted)
            .cloned()
        else {
            return Err(CaretabError::invalid_input(format!(
                "Column '{}' is not in the records table (available: {})",
                column,
                storage_columns.join(", ")
            )));
        };

        let sql = format!(
            "SELECT CAST({} AS VARCHAR) FROM {}",
            quote_identifier(&column),
            quote_identifier(RECORDS_TABLE)
        );
        let values: Vec<Option<String>> = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        let symptoms = load_symptoms(&tx)?;
        tx.commit()?;

        let terms = collect_terms(&values);
        let missing_items = classify(&terms, &symptoms);
        let format_issues: Vec<FormatIssue> = terms
            .format_issues
            .iter()
            .map(|(value, records)| FormatIssue {
                value: value.clone(),
                characters: value
                    .chars()
                    .filter(|c| ALTERNATE_COMMAS.contains(c))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                records: *records,
            })
            .collect();

        for issue in &format_issues {
            log::warn!("Value uses a non-standard comma and was not split: '{}'", issue.value);
        }
        log::info!(
            "Scanned {} records of '{}': {} distinct terms, {} need attention",
            values.len(),
            column,
            terms.terms.len(),
            missing_items.len()
        );

        Ok(ScanReport {
            column,
            records_scanned: values.len() as u64,
            distinct_terms: terms.terms.len(),
            missing_items,
            format_issues,
        })
    }

    /// Resolve one worklist item: assign the category to a known symptom,
    /// or register an unknown one under it.
    pub fn resolve(&self, item: &SymptomAssignment) -> Result<ItemStatus> {
        let Some(category_id) = item.category_id else {
            return Err(CaretabError::CategoryRequired {
                symptom: item.symptom.trim().to_string(),
            });
        };
        TaxonomyStore::new(self.db).upsert(&item.symptom, category_id)
    }

    /// Resolve each item independently
    pub fn resolve_many(&self, items: &[SymptomAssignment]) -> Result<BulkReport> {
        if items.is_empty() {
            return Err(CaretabError::invalid_input("no items given"));
        }
        let mut report = BulkReport::default();
        for item in items {
            report.record(&item.symptom, self.resolve(item));
        }
        log::info!("Resolved {} of {} worklist items", report.succeeded(), items.len());
        Ok(report)
    }
}
