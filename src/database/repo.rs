use std::path::Path;

use rusqlite::types::{ToSql, Value};
use rusqlite::{params, Batch, Connection};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::database::schema::{DROP_ALL, SCHEMA, TABLES};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    pub id: i64,
    pub title: Option<String>,
    pub culture: Option<String>,
    pub period: Option<String>,
    pub century: Option<String>,
    pub medium: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub classification: Option<String>,
    pub accession_year: Option<i64>,
    pub accession_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMedia {
    pub image_count: Option<i64>,
    pub media_count: Option<i64>,
    pub color_count: Option<i64>,
    pub rank: Option<i64>,
    pub date_begin: Option<i64>,
    pub date_end: Option<i64>,
}

/// One detected color. Every field is required; incomplete colors never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactColor {
    pub color: String,
    pub spectrum: String,
    pub hue: String,
    pub percent: f64,
    pub css3: String,
}

/// Everything stored for one artifact, written as a unit by [`ArtifactStore::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRecord {
    pub metadata: ArtifactMetadata,
    pub media: Option<ArtifactMedia>,
    pub colors: Vec<ArtifactColor>,
}

impl ArtifactRecord {
    pub fn id(&self) -> i64 {
        self.metadata.id
    }
}

/// Column names plus rows in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Value of `column` in row `index`, if both exist.
    #[cfg(test)]
    pub fn get(&self, index: usize, column: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(index).and_then(|row| row.get(col))
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(value_to_json))
                    .collect()
            })
            .collect()
    }
}

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Blob(b) => JsonValue::String(format!("<{} bytes>", b.len())),
    }
}

/// Plain-text rendering used for tables and CSV cells. NULL renders empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub metadata: i64,
    pub media: i64,
    pub colors: i64,
}

/// Owns the SQLite connection. Opened once at startup and passed by reference.
pub struct ArtifactStore {
    conn: Connection,
}

impl ArtifactStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened artifact database");
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Replaces everything stored for one artifact inside a single transaction.
    ///
    /// Old media and color rows go first, then the metadata row is written, then
    /// the new children, so a reader never sees a child without its parent.
    pub fn upsert(&mut self, record: &ArtifactRecord) -> Result<()> {
        let id = record.id();
        let tx = self.conn.transaction()?;

        {
            tx.execute("DELETE FROM artifact_colors WHERE objectid = ?1", params![id])?;
            tx.execute("DELETE FROM artifact_media WHERE objectid = ?1", params![id])?;

            let m = &record.metadata;
            tx.execute(
                "INSERT OR REPLACE INTO artifact_metadata
                 (id, title, culture, period, century, medium, dimensions, description,
                  department, classification, accessionyear, accessionmethod)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    m.id,
                    m.title,
                    m.culture,
                    m.period,
                    m.century,
                    m.medium,
                    m.dimensions,
                    m.description,
                    m.department,
                    m.classification,
                    m.accession_year,
                    m.accession_method
                ],
            )?;

            if let Some(media) = &record.media {
                tx.execute(
                    "INSERT INTO artifact_media
                     (objectid, imagecount, mediacount, colorcount, rank, datebegin, dateend)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        media.image_count,
                        media.media_count,
                        media.color_count,
                        media.rank,
                        media.date_begin,
                        media.date_end
                    ],
                )?;
            }

            let mut stmt_color = tx.prepare(
                "INSERT INTO artifact_colors (objectid, color, spectrum, hue, percent, css3)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for c in &record.colors {
                stmt_color.execute(params![id, c.color, c.spectrum, c.hue, c.percent, c.css3])?;
            }
        }

        tx.commit()?;
        debug!(id, colors = record.colors.len(), "Upserted artifact");
        Ok(())
    }

    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.query_with_params(sql, &[])
    }

    /// Runs one read-only statement with named parameters bound by value.
    ///
    /// Parameter names may be given with or without the leading `:`. Every
    /// parameter the statement declares must be supplied. Input holding more
    /// than one statement is rejected, as is anything that returns no columns
    /// (`BEGIN`, `ATTACH` and friends are read-only to SQLite).
    pub fn query_with_params(&self, sql: &str, named: &[(String, Value)]) -> Result<QueryResult> {
        let sql = sql.trim();
        match self.count_statements(sql)? {
            0 => return Err(HarvestError::Query("empty query".into())),
            1 => {}
            n => {
                return Err(HarvestError::Query(format!(
                    "expected a single statement, found {n}"
                )))
            }
        }

        let mut stmt = self.conn.prepare(sql).map_err(query_error)?;
        if !stmt.readonly() || stmt.column_count() == 0 {
            return Err(HarvestError::Query(
                "only read-only statements that return rows may be run as queries".into(),
            ));
        }

        let keyed: Vec<(String, &Value)> = named
            .iter()
            .map(|(name, value)| (prefixed(name), value))
            .collect();

        for index in 1..=stmt.parameter_count() {
            match stmt.parameter_name(index) {
                Some(name) if keyed.iter().any(|(k, _)| k == name) => {}
                Some(name) => {
                    return Err(HarvestError::Query(format!("missing parameter {name}")));
                }
                None => {
                    return Err(HarvestError::Query(
                        "positional parameters are not supported; use :name".into(),
                    ));
                }
            }
        }

        let bound: Vec<(&str, &dyn ToSql)> = keyed
            .iter()
            .map(|(k, v)| (k.as_str(), *v as &dyn ToSql))
            .collect();

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(bound.as_slice()).map_err(query_error)?;
        while let Some(row) = cursor.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i).map_err(query_error)?);
            }
            rows.push(values);
        }

        debug!(rows = rows.len(), "Query completed");
        Ok(QueryResult { columns, rows })
    }

    /// Compiles every statement in `sql` without running any of them.
    fn count_statements(&self, sql: &str) -> Result<usize> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut count = 0;
        while batch.next().map_err(query_error)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(TableCounts {
            metadata: count(TABLES[0])?,
            media: count(TABLES[1])?,
            colors: count(TABLES[2])?,
        })
    }

    /// Most recently numbered artifacts, highest id first.
    pub fn recent_artifacts(&self, limit: u32) -> Result<QueryResult> {
        self.query_with_params(
            "SELECT id, title, classification, culture FROM artifact_metadata
             ORDER BY id DESC LIMIT :limit",
            &[("limit".to_string(), Value::Integer(i64::from(limit)))],
        )
    }

    /// Drops all three tables and recreates them empty.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(DROP_ALL)?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        info!("Artifact database reset");
        Ok(())
    }
}

fn prefixed(name: &str) -> String {
    if name.starts_with(':') {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

fn query_error(err: rusqlite::Error) -> HarvestError {
    HarvestError::Query(err.to_string())
}
