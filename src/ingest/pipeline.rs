use rusqlite::types::Value;
use tracing::{error, info, warn};

use crate::database::repo::{ArtifactRecord, ArtifactStore, QueryResult};
use crate::ingest::fetcher::{ArtifactStream, PageSource};
use crate::ingest::normalizer::normalize;
use crate::utils::config::HarvestConfig;

/// Outcome of one collection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionReport {
    pub classification: String,
    pub records_requested: usize,
    pub records_fetched: usize,
    pub records_stored: usize,
    pub records_skipped: usize,
    pub errors: Vec<String>,
    /// A store write failed and the rest of the run was abandoned.
    pub aborted: bool,
}

impl IngestionReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub fetched: usize,
    pub stored: usize,
    pub target: usize,
    pub available: Option<u64>,
}

/// Fetches up to `target` artifacts of one classification and stores each one.
///
/// Records that fail normalization are counted and skipped. A page that keeps
/// failing ends the run with what was stored so far. A store failure aborts
/// the remaining work; artifacts committed before it stay committed.
pub fn run_ingestion<S: PageSource + ?Sized>(
    store: &mut ArtifactStore,
    source: &S,
    config: &HarvestConfig,
    classification: &str,
    target: usize,
    mut progress: impl FnMut(Progress),
) -> IngestionReport {
    info!(classification, target, "Starting collection run");

    let mut report = IngestionReport {
        classification: classification.to_string(),
        records_requested: target,
        ..IngestionReport::default()
    };
    let mut stream = ArtifactStream::new(source, config, classification, target);

    while let Some(raw) = stream.next() {
        report.records_fetched += 1;

        match normalize(&raw) {
            Ok(record) => {
                if let Err(e) = store.upsert(&record) {
                    error!(id = record.id(), error = %e, "Store write failed, aborting run");
                    report.errors.push(format!("artifact {}: {}", record.id(), e));
                    report.aborted = true;
                    break;
                }
                report.records_stored += 1;
            }
            Err(e) => {
                warn!(error = %e, "Skipping record");
                report.records_skipped += 1;
            }
        }

        progress(Progress {
            fetched: report.records_fetched,
            stored: report.records_stored,
            target,
            available: stream.total(),
        });
    }

    if let Some(reason) = stream.termination() {
        report.errors.push(reason.to_string());
    }

    info!(
        classification,
        stored = report.records_stored,
        skipped = report.records_skipped,
        requested = target,
        errors = report.errors.len(),
        "Collection run finished"
    );
    report
}

/// Records fetched and normalized without touching the store.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub records: Vec<ArtifactRecord>,
    pub skipped: usize,
    pub errors: Vec<String>,
}

pub fn preview<S: PageSource + ?Sized>(
    source: &S,
    config: &HarvestConfig,
    classification: &str,
    limit: usize,
) -> Preview {
    let mut result = Preview::default();
    let mut stream = ArtifactStream::new(source, config, classification, limit);
    for raw in stream.by_ref() {
        match normalize(&raw) {
            Ok(record) => result.records.push(record),
            Err(_) => result.skipped += 1,
        }
    }
    if let Some(reason) = stream.termination() {
        result.errors.push(reason.to_string());
    }
    result
}

/// Summary table of normalized records, one row per artifact.
pub fn summary_table(records: &[ArtifactRecord]) -> QueryResult {
    let text = |s: &Option<String>| s.clone().map(Value::Text).unwrap_or(Value::Null);
    let int = |i: Option<i64>| i.map(Value::Integer).unwrap_or(Value::Null);

    QueryResult {
        columns: ["id", "title", "culture", "century", "department", "images", "colors"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rows: records
            .iter()
            .map(|r| {
                let m = &r.metadata;
                vec![
                    Value::Integer(m.id),
                    text(&m.title),
                    text(&m.culture),
                    text(&m.century),
                    text(&m.department),
                    int(r.media.as_ref().and_then(|x| x.image_count)),
                    Value::Integer(r.colors.len() as i64),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repo::tests::reject_artifact;
    use crate::ingest::fetcher::tests::{fast_config, ScriptedSource};
    use serde_json::json;

    #[test]
    fn test_coins_scenario_stops_at_source_size() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        let source = ScriptedSource::new(7);
        let report = run_ingestion(&mut store, &source, &fast_config(100), "Coins", 10, |_| {});

        assert_eq!(report.records_stored, 7);
        assert_eq!(report.records_requested, 10);
        assert!(report.errors.is_empty());
        assert!(!report.aborted);
        assert_eq!(store.table_counts()?.metadata, 7);
        Ok(())
    }

    #[test]
    fn test_invalid_records_are_counted_not_fatal() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        let mut source = ScriptedSource::new(6);
        source.record = |i| {
            if i % 3 == 0 {
                json!({ "title": "no id" })
            } else {
                json!({ "id": i, "accessionyear": null })
            }
        };
        let report = run_ingestion(&mut store, &source, &fast_config(4), "Prints", 6, |_| {});

        assert_eq!(report.records_fetched, 6);
        assert_eq!(report.records_stored, 4);
        assert_eq!(report.records_skipped, 2);
        assert!(report.is_complete());

        let res = store.query("SELECT COUNT(*) AS n FROM artifact_metadata WHERE accessionyear = 0")?;
        assert_eq!(res.get(0, "n"), Some(&Value::Integer(0)));
        Ok(())
    }

    #[test]
    fn test_partial_run_keeps_stored_records() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        let source = ScriptedSource::new(40).failing(3, 100);
        let report = run_ingestion(&mut store, &source, &fast_config(10), "Coins", 40, |_| {});

        assert_eq!(report.records_stored, 20);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.aborted);
        assert_eq!(store.table_counts()?.metadata, 20);
        Ok(())
    }

    #[test]
    fn test_store_failure_aborts_and_keeps_commits() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        reject_artifact(&store, 3, "disk full");
        let source = ScriptedSource::new(5);
        let mut calls = 0;
        let report = run_ingestion(&mut store, &source, &fast_config(100), "Coins", 5, |_| calls += 1);

        assert!(report.aborted);
        assert_eq!(report.records_fetched, 3);
        assert_eq!(report.records_stored, 2);
        assert_eq!(report.errors, vec!["artifact 3: store error: disk full".to_string()]);
        assert!(!report.is_complete());
        assert_eq!(calls, 2);
        assert_eq!(store.table_counts()?.metadata, 2);

        let ids = store.query("SELECT id FROM artifact_metadata ORDER BY id")?;
        assert_eq!(ids.rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
        Ok(())
    }

    #[test]
    fn test_reingestion_is_idempotent() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        let mut source = ScriptedSource::new(3);
        source.record = |i| {
            json!({
                "id": i,
                "colorcount": 2,
                "colors": [
                    { "color": "#111", "spectrum": "#222", "hue": "Grey", "percent": 0.5, "css3": "#111" },
                    { "color": "#333", "spectrum": "#444", "hue": "Blue", "percent": 0.5, "css3": "#333" }
                ]
            })
        };
        let config = fast_config(100);
        run_ingestion(&mut store, &source, &config, "Coins", 3, |_| {});
        run_ingestion(&mut store, &source, &config, "Coins", 3, |_| {});

        let counts = store.table_counts()?;
        assert_eq!((counts.metadata, counts.media, counts.colors), (3, 3, 6));
        Ok(())
    }

    #[test]
    fn test_progress_reported_per_record() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        let source = ScriptedSource::new(5);
        let mut seen = Vec::new();
        run_ingestion(&mut store, &source, &fast_config(2), "Coins", 5, |p| {
            seen.push((p.fetched, p.stored, p.available))
        });
        assert_eq!(seen.len(), 5);
        assert_eq!(seen.last(), Some(&(5, 5, Some(5))));
        Ok(())
    }

    #[test]
    fn test_preview_does_not_store() {
        let source = ScriptedSource::new(20);
        let result = preview(&source, &fast_config(100), "Coins", 10);
        assert_eq!(result.records.len(), 10);

        let table = summary_table(&result.records);
        assert_eq!(table.len(), 10);
        assert_eq!(table.get(0, "title"), Some(&Value::Text("Object 1".into())));
        assert_eq!(table.get(0, "culture"), Some(&Value::Null));
        assert_eq!(table.get(0, "images"), Some(&Value::Integer(1)));
    }
}
