use crate::model::FeeStructure;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

/// Source of the fee-structure catalog. Handlers load a snapshot through this
/// and hand it to the calculator or a new wizard session.
pub trait FeeCatalog {
    fn load_fee_structures(&self) -> anyhow::Result<Vec<FeeStructure>>;
}

/// Catalog held in memory, e.g. supplied inline with a request.
pub struct StaticCatalog(pub Vec<FeeStructure>);

impl FeeCatalog for StaticCatalog {
    fn load_fee_structures(&self) -> anyhow::Result<Vec<FeeStructure>> {
        let mut out = self.0.clone();
        normalize_catalog(&mut out);
        sort_catalog(&mut out);
        Ok(out)
    }
}

/// Catalog stored in the workspace database.
pub struct SqliteCatalog<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCatalog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts or replaces one structure, matched by id or else by grade.
    /// Returns the stored id.
    pub fn upsert(&self, fs: &FeeStructure) -> anyhow::Result<String> {
        let mut fs = fs.clone();
        normalize_structure(&mut fs);
        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = if fs.id.is_empty() {
            tx.query_row(
                "SELECT id FROM fee_structures WHERE grades = ?",
                [&fs.grades],
                |r| r.get(0),
            )
            .optional()?
        } else {
            Some(fs.id.clone())
        };
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());
        write_structure(&tx, &id, &fs)?;
        tx.commit()?;
        Ok(id)
    }

    /// Imports a batch in one transaction. With `replace`, the previous
    /// catalog is dropped first.
    pub fn import(&self, structures: &[FeeStructure], replace: bool) -> anyhow::Result<usize> {
        let mut structures = structures.to_vec();
        normalize_catalog(&mut structures);
        let tx = self.conn.unchecked_transaction()?;
        if replace {
            tx.execute("DELETE FROM fee_structure_subjects", [])?;
            tx.execute("DELETE FROM fee_structures", [])?;
        }
        for fs in &structures {
            let id = if fs.id.is_empty() {
                tx.query_row(
                    "SELECT id FROM fee_structures WHERE grades = ?",
                    [&fs.grades],
                    |r| r.get::<_, String>(0),
                )
                .optional()?
                .unwrap_or_else(|| Uuid::new_v4().to_string())
            } else {
                fs.id.clone()
            };
            write_structure(&tx, &id, fs)?;
        }
        tx.commit()?;
        Ok(structures.len())
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM fee_structure_subjects WHERE structure_id = ?",
            [id],
        )?;
        let n = tx.execute("DELETE FROM fee_structures WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(n > 0)
    }
}

fn write_structure(conn: &Connection, id: &str, fs: &FeeStructure) -> anyhow::Result<()> {
    // A grade moving to a new id frees its slot first so UNIQUE(grades) holds.
    let clashing: Option<String> = conn
        .query_row(
            "SELECT id FROM fee_structures WHERE grades = ? AND id <> ?",
            (&fs.grades, id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(old) = clashing {
        conn.execute(
            "DELETE FROM fee_structure_subjects WHERE structure_id = ?",
            [&old],
        )?;
        conn.execute("DELETE FROM fee_structures WHERE id = ?", [&old])?;
    }

    conn.execute(
        "INSERT INTO fee_structures(id, grades, sort_order) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET grades = excluded.grades, sort_order = excluded.sort_order",
        (id, &fs.grades, fs.order),
    )?;
    conn.execute(
        "DELETE FROM fee_structure_subjects WHERE structure_id = ?",
        [id],
    )?;
    for (idx, s) in fs.subjects_with_fee.iter().enumerate() {
        conn.execute(
            "INSERT INTO fee_structure_subjects(structure_id, idx, name, fee) VALUES(?, ?, ?, ?)",
            (id, idx as i64, &s.name, s.fee),
        )?;
    }
    Ok(())
}

impl FeeCatalog for SqliteCatalog<'_> {
    fn load_fee_structures(&self) -> anyhow::Result<Vec<FeeStructure>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, grades, sort_order FROM fee_structures")?;
        let mut out = stmt
            .query_map([], |row| {
                Ok(FeeStructure {
                    id: row.get(0)?,
                    grades: row.get(1)?,
                    order: row.get(2)?,
                    subjects_with_fee: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut sub_stmt = self.conn.prepare(
            "SELECT name, fee FROM fee_structure_subjects WHERE structure_id = ? ORDER BY idx",
        )?;
        for fs in out.iter_mut() {
            let id = fs.id.clone();
            fs.subjects_with_fee = sub_stmt
                .query_map([&id], |row| {
                    Ok(crate::model::SubjectWithFee {
                        name: row.get(0)?,
                        fee: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }

        sort_catalog(&mut out);
        Ok(out)
    }
}

/// Explicit `order` first (missing order last), then grade label.
pub fn sort_catalog(structures: &mut [FeeStructure]) {
    structures.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.grades.cmp(&b.grades)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.grades.cmp(&b.grades),
    });
}

/// Unique grades in catalog order.
pub fn grade_options(structures: &[FeeStructure]) -> Vec<String> {
    let mut seen = HashSet::new();
    structures
        .iter()
        .filter(|fs| seen.insert(fs.grades.as_str()))
        .map(|fs| fs.grades.clone())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CatalogError {
    fn new(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Trims ids, grades and subject names so lookups, validation and storage
/// all use the same keys.
pub fn normalize_catalog(structures: &mut [FeeStructure]) {
    for fs in structures.iter_mut() {
        normalize_structure(fs);
    }
}

fn normalize_structure(fs: &mut FeeStructure) {
    fs.id = fs.id.trim().to_string();
    fs.grades = fs.grades.trim().to_string();
    for s in fs.subjects_with_fee.iter_mut() {
        s.name = s.name.trim().to_string();
    }
}

/// Checks that lookups by grade and by subject name are unambiguous and that
/// no fee is negative.
pub fn validate_catalog(structures: &[FeeStructure]) -> Result<(), CatalogError> {
    let mut grades = HashSet::new();
    for fs in structures {
        let grade = fs.grades.trim();
        if grade.is_empty() {
            return Err(CatalogError::new(
                "empty_grade",
                "fee structure grade must not be empty",
                serde_json::json!({ "id": fs.id }),
            ));
        }
        if !grades.insert(grade) {
            return Err(CatalogError::new(
                "duplicate_grade",
                format!("grade {} appears more than once", grade),
                serde_json::json!({ "grade": grade }),
            ));
        }
        let mut names = HashSet::new();
        for s in &fs.subjects_with_fee {
            if !names.insert(s.name.trim()) {
                return Err(CatalogError::new(
                    "duplicate_subject",
                    format!("subject {} appears more than once in grade {}", s.name, grade),
                    serde_json::json!({ "grade": grade, "subject": s.name }),
                ));
            }
            if !s.fee.is_finite() || s.fee < 0.0 {
                return Err(CatalogError::new(
                    "negative_fee",
                    format!("fee for {} in grade {} must be a non-negative number", s.name, grade),
                    serde_json::json!({ "grade": grade, "subject": s.name }),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubjectWithFee;

    fn fs(grade: &str, order: Option<i64>, subjects: &[(&str, f64)]) -> FeeStructure {
        FeeStructure {
            id: String::new(),
            grades: grade.to_string(),
            order,
            subjects_with_fee: subjects
                .iter()
                .map(|(n, f)| SubjectWithFee {
                    name: n.to_string(),
                    fee: *f,
                })
                .collect(),
        }
    }

    #[test]
    fn sort_puts_ordered_grades_first() {
        let mut v = vec![
            fs("10", None, &[]),
            fs("9", Some(2), &[]),
            fs("8", Some(1), &[]),
            fs("11", None, &[]),
        ];
        sort_catalog(&mut v);
        let grades: Vec<&str> = v.iter().map(|f| f.grades.as_str()).collect();
        assert_eq!(grades, vec!["8", "9", "10", "11"]);
    }

    #[test]
    fn validate_rejects_duplicates_and_negative_fees() {
        let dup_grade = vec![fs("5", None, &[]), fs("5", None, &[])];
        assert_eq!(validate_catalog(&dup_grade).unwrap_err().code, "duplicate_grade");

        let dup_subject = vec![fs("5", None, &[("Math", 1.0), ("Math", 2.0)])];
        assert_eq!(
            validate_catalog(&dup_subject).unwrap_err().code,
            "duplicate_subject"
        );

        let negative = vec![fs("5", None, &[("Math", -1.0)])];
        assert_eq!(validate_catalog(&negative).unwrap_err().code, "negative_fee");

        let blank = vec![fs("  ", None, &[])];
        assert_eq!(validate_catalog(&blank).unwrap_err().code, "empty_grade");

        let good = vec![fs("5", None, &[("All", 10.0), ("Math", 0.0)]), fs("6", None, &[])];
        assert!(validate_catalog(&good).is_ok());
    }

    #[test]
    fn sqlite_catalog_upsert_replaces_by_grade() {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&conn).expect("schema");
        let cat = SqliteCatalog::new(&conn);

        let first = cat
            .upsert(&fs("5", Some(1), &[("All", 10000.0), ("Math", 3000.0)]))
            .expect("upsert");
        let second = cat
            .upsert(&fs("5", Some(1), &[("All", 11000.0)]))
            .expect("upsert again");
        assert_eq!(first, second);

        let loaded = cat.load_fee_structures().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].all_fee(), 11000.0);
        assert_eq!(loaded[0].subjects_with_fee.len(), 1);

        assert!(cat.delete(&first).expect("delete"));
        assert!(cat.load_fee_structures().expect("load").is_empty());
    }

    #[test]
    fn padded_keys_are_trimmed_on_load_and_store() {
        let padded = fs(" 5 ", None, &[(" All", 10000.0), ("Math ", 3000.0)]);
        let loaded = StaticCatalog(vec![padded.clone()])
            .load_fee_structures()
            .expect("load");
        assert_eq!(grade_options(&loaded), vec!["5".to_string()]);
        assert_eq!(loaded[0].all_fee(), 10000.0);
        assert_eq!(loaded[0].selectable_subject_fee("Math"), Some(3000.0));

        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&conn).expect("schema");
        let cat = SqliteCatalog::new(&conn);
        let first = cat.upsert(&padded).expect("upsert");
        let second = cat.upsert(&fs("5", None, &[("All", 9000.0)])).expect("upsert");
        assert_eq!(first, second);
        let stored = cat.load_fee_structures().expect("load");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].grades, "5");
    }

    #[test]
    fn padded_duplicate_grades_are_rejected() {
        let mut v = vec![fs("5", None, &[]), fs(" 5", None, &[])];
        normalize_catalog(&mut v);
        assert_eq!(validate_catalog(&v).unwrap_err().code, "duplicate_grade");
    }

    #[test]
    fn grade_options_are_unique_in_order() {
        let v = vec![fs("8", None, &[]), fs("9", None, &[]), fs("8", None, &[])];
        assert_eq!(grade_options(&v), vec!["8".to_string(), "9".to_string()]);
    }
}
