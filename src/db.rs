use crate::model::{EnrollmentSubmission, SiblingDetail};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("tuition.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id TEXT PRIMARY KEY,
            grades TEXT NOT NULL UNIQUE,
            sort_order INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structure_subjects(
            structure_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            fee REAL NOT NULL,
            PRIMARY KEY(structure_id, idx),
            FOREIGN KEY(structure_id) REFERENCES fee_structures(id),
            UNIQUE(structure_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_structure_subjects_structure ON fee_structure_subjects(structure_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            siblings INTEGER NOT NULL,
            details_json TEXT NOT NULL,
            ac_charges INTEGER NOT NULL DEFAULT 0,
            deserving_discount INTEGER NOT NULL DEFAULT 0,
            total_fee REAL NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_created ON enrollments(created_at)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub id: String,
    pub created_at: String,
    pub siblings: usize,
    pub details: Vec<SiblingDetail>,
    pub ac_charges: bool,
    pub deserving_discount: bool,
    pub total_fee: f64,
}

pub fn enrollment_insert(
    conn: &Connection,
    id: &str,
    submission: &EnrollmentSubmission,
    total_fee: f64,
) -> anyhow::Result<String> {
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO enrollments(id, created_at, siblings, details_json, ac_charges, deserving_discount, total_fee)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            id,
            &created_at,
            submission.siblings as i64,
            serde_json::to_string(&submission.details)?,
            submission.ac_charges,
            submission.deserving_discount,
            total_fee,
        ),
    )?;
    Ok(created_at)
}

fn enrollment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(EnrollmentRecord, String)> {
    let details_json: String = row.get(3)?;
    let siblings: i64 = row.get(2)?;
    Ok((
        EnrollmentRecord {
            id: row.get(0)?,
            created_at: row.get(1)?,
            siblings: siblings.max(0) as usize,
            details: Vec::new(),
            ac_charges: row.get(4)?,
            deserving_discount: row.get(5)?,
            total_fee: row.get(6)?,
        },
        details_json,
    ))
}

fn decode_details(pair: (EnrollmentRecord, String)) -> anyhow::Result<EnrollmentRecord> {
    let (mut rec, details_json) = pair;
    rec.details = serde_json::from_str(&details_json)?;
    Ok(rec)
}

const ENROLLMENT_COLUMNS: &str =
    "id, created_at, siblings, details_json, ac_charges, deserving_discount, total_fee";

pub fn enrollments_list(conn: &Connection) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let sql = format!(
        "SELECT {} FROM enrollments ORDER BY created_at DESC, rowid DESC",
        ENROLLMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_details).collect()
}

pub fn enrollment_get(conn: &Connection, id: &str) -> anyhow::Result<Option<EnrollmentRecord>> {
    let sql = format!("SELECT {} FROM enrollments WHERE id = ?", ENROLLMENT_COLUMNS);
    let row = conn.query_row(&sql, [id], enrollment_from_row).optional()?;
    row.map(decode_details).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StudyMode, SubjectType};

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert!(settings_get_json(&conn, "setup.fees").expect("get").is_none());
        settings_set_json(&conn, "setup.fees", &serde_json::json!({ "roundingStep": 100 }))
            .expect("set");
        settings_set_json(&conn, "setup.fees", &serde_json::json!({ "roundingStep": 250 }))
            .expect("overwrite");
        let v = settings_get_json(&conn, "setup.fees").expect("get").expect("present");
        assert_eq!(v["roundingStep"], 250);
    }

    #[test]
    fn enrollment_insert_then_get() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        let submission = EnrollmentSubmission {
            siblings: 1,
            details: vec![SiblingDetail {
                grade: "5".to_string(),
                mode: Some(StudyMode::HomeTuition),
                subject_type: Some(SubjectType::All),
                subjects: vec!["All".to_string()],
            }],
            ac_charges: true,
            deserving_discount: false,
        };
        enrollment_insert(&conn, "e1", &submission, 32000.0).expect("insert");
        let rec = enrollment_get(&conn, "e1").expect("get").expect("present");
        assert_eq!(rec.details, submission.details);
        assert!(rec.ac_charges);
        assert_eq!(rec.total_fee, 32000.0);
        assert_eq!(enrollments_list(&conn).expect("list").len(), 1);
        assert!(enrollment_get(&conn, "missing").expect("get").is_none());
    }
}
