//! Canned distribution charts, drawn as text for the terminal.

use std::fmt::Write;

use rusqlite::types::Value;

use crate::database::repo::{value_to_text, ArtifactStore, QueryResult};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    /// Shares of a whole; bars are annotated with percentages.
    Pie,
    Treemap,
}

#[derive(Debug, Clone, Copy)]
pub struct Chart {
    pub key: &'static str,
    pub title: &'static str,
    pub kind: ChartKind,
    pub sql: &'static str,
}

pub const CHARTS: &[Chart] = &[
    Chart {
        key: "classification",
        title: "Artifacts by Classification",
        kind: ChartKind::Bar,
        sql: "SELECT classification, COUNT(*) AS count FROM artifact_metadata
              WHERE classification IS NOT NULL
              GROUP BY classification ORDER BY count DESC LIMIT 10",
    },
    Chart {
        key: "culture",
        title: "Culture Distribution",
        kind: ChartKind::Pie,
        sql: "SELECT culture, COUNT(*) AS count FROM artifact_metadata
              WHERE culture IS NOT NULL
              GROUP BY culture ORDER BY count DESC LIMIT 10",
    },
    Chart {
        key: "century",
        title: "Artifacts by Century",
        kind: ChartKind::Bar,
        sql: "SELECT century, COUNT(*) AS count FROM artifact_metadata
              WHERE century IS NOT NULL
              GROUP BY century ORDER BY count DESC LIMIT 10",
    },
    Chart {
        key: "hue",
        title: "Color Hue Distribution",
        kind: ChartKind::Bar,
        sql: "SELECT hue, COUNT(*) AS frequency FROM artifact_colors
              WHERE hue IS NOT NULL
              GROUP BY hue ORDER BY frequency DESC",
    },
    Chart {
        key: "department",
        title: "Artifacts by Department",
        kind: ChartKind::Treemap,
        sql: "SELECT department, COUNT(*) AS count FROM artifact_metadata
              WHERE department IS NOT NULL
              GROUP BY department ORDER BY count DESC",
    },
];

pub fn find_chart(key: &str) -> Option<&'static Chart> {
    CHARTS.iter().find(|c| c.key.eq_ignore_ascii_case(key.trim()))
}

/// Runs the chart's query and renders it. Empty string when there is no data.
pub fn draw(store: &ArtifactStore, chart: &Chart, width: usize) -> Result<String> {
    let data = store.query(chart.sql)?;
    render(chart, &data, width)
}

/// Expects a label column followed by a count column.
pub fn render(chart: &Chart, data: &QueryResult, width: usize) -> Result<String> {
    if data.columns.len() < 2 {
        return Err(HarvestError::Query(format!(
            "chart '{}' needs a label and a value column",
            chart.key
        )));
    }
    if data.is_empty() {
        return Ok(String::new());
    }

    let points: Vec<(String, f64)> = data
        .rows
        .iter()
        .map(|row| {
            let value = match &row[1] {
                Value::Integer(i) => *i as f64,
                Value::Real(f) => *f,
                _ => 0.0,
            };
            (value_to_text(&row[0]), value)
        })
        .collect();

    let max = points.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let sum: f64 = points.iter().map(|(_, v)| *v).sum();
    let label_width = points.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    writeln!(out, "{}", chart.title)?;
    for (label, value) in &points {
        let len = if max > 0.0 {
            ((value / max) * width as f64).round() as usize
        } else {
            0
        };
        let bar = "█".repeat(len);
        match chart.kind {
            ChartKind::Bar => writeln!(out, "{label:<label_width$} │{bar} {value}")?,
            ChartKind::Pie | ChartKind::Treemap => {
                let share = if sum > 0.0 { value / sum * 100.0 } else { 0.0 };
                writeln!(out, "{label:<label_width$} │{bar} {value} ({share:.1}%)")?
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repo::tests::record;

    #[test]
    fn test_every_chart_draws() -> anyhow::Result<()> {
        let mut store = ArtifactStore::open_in_memory()?;
        for id in 1..=4 {
            store.upsert(&record(id, if id == 1 { "Prints" } else { "Coins" }, 2))?;
        }
        for chart in CHARTS {
            let text = draw(&store, chart, 20)?;
            assert!(text.starts_with(chart.title), "{}", chart.key);
        }
        Ok(())
    }

    #[test]
    fn test_bars_scale_to_width() -> anyhow::Result<()> {
        let chart = find_chart("department").expect("chart");
        let data = QueryResult {
            columns: vec!["department".into(), "count".into()],
            rows: vec![
                vec![Value::Text("Coins".into()), Value::Integer(3)],
                vec![Value::Text("Prints".into()), Value::Integer(1)],
            ],
        };
        let text = render(chart, &data, 12)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].matches('█').count(), 12);
        assert_eq!(lines[2].matches('█').count(), 4);
        assert!(lines[1].ends_with("(75.0%)"));
        Ok(())
    }

    #[test]
    fn test_render_failure_is_an_error() {
        let err = HarvestError::from(std::fmt::Error);
        assert!(matches!(err, HarvestError::Render(_)));
        assert!(err.to_string().starts_with("render error"));
    }

    #[test]
    fn test_empty_store_draws_nothing() -> anyhow::Result<()> {
        let store = ArtifactStore::open_in_memory()?;
        assert_eq!(draw(&store, &CHARTS[0], 10)?, "");
        Ok(())
    }
}
