//! Category and symptom taxonomy store

use crate::error::{CaretabError, Result};
use crate::normalize::casefold_key;
use crate::storage::Database;
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection, OptionalExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptom {
    pub name: String,
    pub category_id: Option<i64>,
    /// Name of the referenced category, when assigned
    pub category: Option<String>,
    /// Registration order, kept across renames
    pub seq: i64,
}

/// Filters for listing symptoms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymptomQuery {
    /// Case-insensitive substring of the symptom name
    pub search: Option<String>,
    pub category_id: Option<i64>,
    pub unassigned_only: bool,
}

/// One item of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymptomAssignment {
    pub symptom: String,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl SymptomAssignment {
    pub fn new(symptom: impl Into<String>, category_id: Option<i64>) -> Self {
        Self {
            symptom: symptom.into(),
            category_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Inserted,
    Updated,
    Unchanged,
    AlreadyExists,
    NotFound,
    InvalidCategory,
    CategoryRequired,
    Invalid,
    Failed,
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Inserted | Self::Updated | Self::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub symptom: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-item results of a best-effort bulk operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BulkReport {
    fn push(&mut self, symptom: &str, status: ItemStatus, message: Option<String>) {
        self.outcomes.push(ItemOutcome {
            symptom: symptom.to_string(),
            status,
            message,
        });
    }

    /// Record the outcome of one item, turning its error into a status
    pub(crate) fn record(&mut self, symptom: &str, result: Result<ItemStatus>) {
        match result {
            Ok(status) => self.push(symptom, status, None),
            Err(e) => {
                let status = match &e {
                    CaretabError::CategoryRequired { .. } => ItemStatus::CategoryRequired,
                    CaretabError::NotFound { entity: "category", .. } => ItemStatus::InvalidCategory,
                    CaretabError::NotFound { .. } => ItemStatus::NotFound,
                    CaretabError::DuplicateSymptom { .. } => ItemStatus::AlreadyExists,
                    CaretabError::InvalidInput { .. } => ItemStatus::Invalid,
                    _ => ItemStatus::Failed,
                };
                log::warn!("Bulk item '{}' not applied: {}", symptom, e);
                self.push(symptom, status, Some(e.to_string()));
            }
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Result of a single-row mutation whose target may be absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    Unchanged,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDeletion {
    pub deleted: bool,
    pub affected_symptoms_set_null: u64,
}

/// CRUD over categories and symptoms.
///
/// Every method holds the database write lock for its whole duration, so
/// each call is atomic with respect to commits and other mutations.
pub struct TaxonomyStore<'a> {
    db: &'a Database,
}

impl<'a> TaxonomyStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // Categories

    /// All categories, alphabetical
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT id, category FROM category ORDER BY lower(category), id")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.db.lock()?;
        category_by_id(&conn, id)
    }

    /// Create a category, or return the existing one with the same name.
    /// The flag reports whether a row was created.
    pub fn create_category(&self, name: &str) -> Result<(Category, bool)> {
        let name = required_name(name, "category name")?;
        let conn = self.db.lock()?;
        if let Some(existing) = category_by_name(&conn, name)? {
            return Ok((existing, false));
        }

        let id: i64 = conn.query_row(
            "INSERT INTO category (category) VALUES (?) RETURNING id",
            params![name],
            |row| row.get(0),
        )?;
        log::info!("Created category {} '{}'", id, name);
        Ok((
            Category {
                id,
                name: name.to_string(),
            },
            true,
        ))
    }

    pub fn rename_category(&self, id: i64, name: &str) -> Result<Category> {
        let name = required_name(name, "category name")?;
        let conn = self.db.lock()?;
        if category_by_id(&conn, id)?.is_none() {
            return Err(CaretabError::not_found("category", id));
        }
        if let Some(other) = category_by_name(&conn, name)? {
            if other.id != id {
                return Err(CaretabError::DuplicateCategory {
                    name: other.name,
                });
            }
        }

        conn.execute("UPDATE category SET category = ? WHERE id = ?", params![name, id])?;
        log::info!("Renamed category {} to '{}'", id, name);
        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a category; symptoms that referenced it become unassigned
    pub fn delete_category(&self, id: i64) -> Result<CategoryDeletion> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(
            "UPDATE symptom_categories SET category_id = NULL WHERE category_id = ?",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM category WHERE id = ?", params![id])?;
        tx.commit()?;

        if deleted > 0 {
            log::info!("Deleted category {}; {} symptoms unassigned", id, affected);
        }
        Ok(CategoryDeletion {
            deleted: deleted > 0,
            affected_symptoms_set_null: affected as u64,
        })
    }

    // Symptoms

    /// Symptoms matching `query`, ordered by name
    pub fn list_symptoms(&self, query: &SymptomQuery) -> Result<Vec<Symptom>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("contains(lower(s.symptom), lower(?))");
            values.push(Value::Text(search.to_string()));
        }
        if let Some(category_id) = query.category_id {
            clauses.push("s.category_id = ?");
            values.push(Value::BigInt(category_id));
        }
        if query.unassigned_only {
            clauses.push("s.category_id IS NULL");
        }

        let mut sql = format!("{} ", SYMPTOM_SELECT);
        if !clauses.is_empty() {
            sql.push_str(&format!("WHERE {} ", clauses.join(" AND ")));
        }
        sql.push_str("ORDER BY lower(s.symptom), s.symptom");

        let conn = self.db.lock()?;
        query_symptoms(&conn, &sql, values)
    }

    /// Case-insensitive lookup of a single symptom
    pub fn find_symptom(&self, name: &str) -> Result<Option<Symptom>> {
        let conn = self.db.lock()?;
        symptom_by_name(&conn, name.trim())
    }

    /// Every symptom in the order it was first registered
    pub fn symptoms_by_registration(&self) -> Result<Vec<Symptom>> {
        let conn = self.db.lock()?;
        load_symptoms(&conn)
    }

    pub fn add_symptom(&self, name: &str, category_id: Option<i64>) -> Result<Symptom> {
        let name = required_name(name, "symptom name")?;
        let conn = self.db.lock()?;
        insert_symptom(&conn, name, category_id)?;
        symptom_by_name(&conn, name)?.ok_or_else(|| CaretabError::not_found("symptom", name))
    }

    /// Set or clear the category of an existing symptom
    pub fn assign(&self, name: &str, category_id: Option<i64>) -> Result<MutationOutcome> {
        let conn = self.db.lock()?;
        let Some(symptom) = symptom_by_name(&conn, name.trim())? else {
            return Ok(MutationOutcome::NotFound);
        };
        ensure_category(&conn, category_id)?;
        if symptom.category_id == category_id {
            return Ok(MutationOutcome::Unchanged);
        }
        conn.execute(
            "UPDATE symptom_categories SET category_id = ? WHERE symptom = ?",
            params![category_id, symptom.name],
        )?;
        log::debug!("Assigned '{}' to category {:?}", symptom.name, category_id);
        Ok(MutationOutcome::Applied)
    }

    /// Rename a symptom, keeping its category and registration order.
    ///
    /// Fails with `DuplicateSymptom` if another symptom already has the new
    /// name (ignoring case); the two are never merged.
    pub fn rename(&self, old: &str, new: &str) -> Result<MutationOutcome> {
        let new = required_name(new, "symptom name")?;
        let mut conn = self.db.lock()?;
        let Some(current) = symptom_by_name(&conn, old.trim())? else {
            return Ok(MutationOutcome::NotFound);
        };
        if current.name == new {
            return Ok(MutationOutcome::Unchanged);
        }
        if let Some(other) = symptom_by_name(&conn, new)? {
            if other.name != current.name {
                return Err(CaretabError::DuplicateSymptom { name: other.name });
            }
        }

        // The name is the primary key, so the row is re-keyed rather than updated
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM symptom_categories WHERE symptom = ?", params![current.name])?;
        tx.execute(
            "INSERT INTO symptom_categories (symptom, category_id, seq) VALUES (?, ?, ?)",
            params![new, current.category_id, current.seq],
        )?;
        tx.commit()?;

        log::info!("Renamed symptom '{}' to '{}'", current.name, new);
        Ok(MutationOutcome::Applied)
    }

    /// Delete a symptom; returns whether a row was removed
    pub fn delete(&self, name: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        let Some(symptom) = symptom_by_name(&conn, name.trim())? else {
            return Ok(false);
        };
        let removed = conn.execute("DELETE FROM symptom_categories WHERE symptom = ?", params![symptom.name])?;
        log::info!("Deleted symptom '{}'", symptom.name);
        Ok(removed > 0)
    }

    /// Insert new symptoms; existing names are reported, not overwritten
    pub fn insert_many(&self, items: &[SymptomAssignment]) -> Result<BulkReport> {
        require_items(items)?;
        let conn = self.db.lock()?;
        let mut report = BulkReport::default();
        for item in items {
            let result = required_name(&item.symptom, "symptom name")
                .and_then(|name| insert_symptom(&conn, name, item.category_id))
                .map(|_| ItemStatus::Inserted);
            report.record(&item.symptom, result);
        }
        log::info!("Inserted {} of {} symptoms", report.succeeded(), items.len());
        Ok(report)
    }

    /// Change the category of existing symptoms
    pub fn update_many(&self, items: &[SymptomAssignment]) -> Result<BulkReport> {
        require_items(items)?;
        let conn = self.db.lock()?;
        let mut report = BulkReport::default();
        for item in items {
            let result = update_symptom_category(&conn, item.symptom.trim(), item.category_id);
            report.record(&item.symptom, result);
        }
        log::info!("Updated {} of {} symptoms", report.succeeded(), items.len());
        Ok(report)
    }

    /// Give `name` a category, inserting the symptom if it is unknown
    pub fn upsert(&self, name: &str, category_id: i64) -> Result<ItemStatus> {
        let name = required_name(name, "symptom name")?;
        let conn = self.db.lock()?;
        match symptom_by_name(&conn, name)? {
            Some(existing) => update_symptom_category(&conn, &existing.name, Some(category_id)),
            None => {
                insert_symptom(&conn, name, Some(category_id))?;
                Ok(ItemStatus::Inserted)
            }
        }
    }
}

const SYMPTOM_SELECT: &str = "SELECT s.symptom, s.category_id, c.category, s.seq \
     FROM symptom_categories s LEFT JOIN category c ON c.id = s.category_id";

/// All symptoms in registration order, on an existing connection
pub(crate) fn load_symptoms(conn: &Connection) -> Result<Vec<Symptom>> {
    let sql = format!("{} ORDER BY s.seq", SYMPTOM_SELECT);
    query_symptoms(conn, &sql, Vec::new())
}

fn query_symptoms(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<Symptom>> {
    let mut stmt = conn.prepare(sql)?;
    let symptoms = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(Symptom {
                name: row.get(0)?,
                category_id: row.get(1)?,
                category: row.get(2)?,
                seq: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(symptoms)
}

fn symptom_by_name(conn: &Connection, name: &str) -> Result<Option<Symptom>> {
    let sql = format!(
        "{} WHERE lower(s.symptom) = lower(?) ORDER BY s.symptom = ? DESC, s.seq LIMIT 1",
        SYMPTOM_SELECT
    );
    let values = vec![Value::Text(name.to_string()), Value::Text(name.to_string())];
    Ok(query_symptoms(conn, &sql, values)?.into_iter().next())
}

fn category_by_id(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let category = conn
        .query_row("SELECT id, category FROM category WHERE id = ?", params![id], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .optional()?;
    Ok(category)
}

fn category_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, category FROM category WHERE lower(trim(category)) = ? ORDER BY id LIMIT 1",
            params![casefold_key(name)],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(category)
}

fn ensure_category(conn: &Connection, category_id: Option<i64>) -> Result<()> {
    match category_id {
        Some(id) if category_by_id(conn, id)?.is_none() => Err(CaretabError::not_found("category", id)),
        _ => Ok(()),
    }
}

fn insert_symptom(conn: &Connection, name: &str, category_id: Option<i64>) -> Result<()> {
    if let Some(existing) = symptom_by_name(conn, name)? {
        return Err(CaretabError::DuplicateSymptom { name: existing.name });
    }
    ensure_category(conn, category_id)?;
    conn.execute(
        "INSERT INTO symptom_categories (symptom, category_id) VALUES (?, ?)",
        params![name, category_id],
    )?;
    log::debug!("Registered symptom '{}'", name);
    Ok(())
}

fn update_symptom_category(conn: &Connection, name: &str, category_id: Option<i64>) -> Result<ItemStatus> {
    let Some(symptom) = symptom_by_name(conn, name)? else {
        return Err(CaretabError::not_found("symptom", name));
    };
    ensure_category(conn, category_id)?;
    if symptom.category_id == category_id {
        return Ok(ItemStatus::Unchanged);
    }
    conn.execute(
        "UPDATE symptom_categories SET category_id = ? WHERE symptom = ?",
        params![category_id, symptom.name],
    )?;
    Ok(ItemStatus::Updated)
}

fn required_name<'n>(name: &'n str, what: &str) -> Result<&'n str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CaretabError::invalid_input(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

fn require_items(items: &[SymptomAssignment]) -> Result<()> {
    if items.is_empty() {
        return Err(CaretabError::invalid_input("no items given"));
    }
    Ok(())
}
