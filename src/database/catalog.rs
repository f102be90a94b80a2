//! The fixed set of analysis queries.
//!
//! Literals a caller may want to vary are named parameters with defaults and
//! are always bound, never spliced into the SQL text.

use rusqlite::types::Value;

use crate::database::repo::{ArtifactStore, QueryResult};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Text(&'static str),
    Int(i64),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Literal,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery {
    pub id: u8,
    pub label: &'static str,
    pub sql: &'static str,
    pub params: &'static [ParamSpec],
}

impl CatalogQuery {
    /// Binds overrides (by parameter name) over the defaults.
    pub fn bind(&self, overrides: &[(String, String)]) -> Result<Vec<(String, Value)>> {
        for (name, _) in overrides {
            let name = name.trim_start_matches(':');
            if !self.params.iter().any(|p| p.name == name) {
                return Err(HarvestError::Query(format!(
                    "query {} has no parameter '{}'",
                    self.id, name
                )));
            }
        }

        self.params
            .iter()
            .map(|param| {
                let supplied = overrides
                    .iter()
                    .rev()
                    .find(|(n, _)| n.trim_start_matches(':') == param.name)
                    .map(|(_, v)| v.as_str());
                let value = match (param.default, supplied) {
                    (Literal::Text(d), None) => Value::Text(d.to_string()),
                    (Literal::Int(d), None) => Value::Integer(d),
                    (Literal::Text(_), Some(v)) => Value::Text(v.to_string()),
                    (Literal::Int(_), Some(v)) => {
                        Value::Integer(v.trim().parse().map_err(|_| {
                            HarvestError::Query(format!(
                                "parameter '{}' expects an integer, got '{}'",
                                param.name, v
                            ))
                        })?)
                    }
                };
                Ok((param.name.to_string(), value))
            })
            .collect()
    }
}

const CULTURE: ParamSpec = ParamSpec { name: "culture", default: Literal::Text("Byzantine") };

pub const CATALOG: &[CatalogQuery] = &[
    CatalogQuery {
        id: 1,
        label: "Byzantine artifacts from 11th century",
        sql: "SELECT id, title, culture, century, period
              FROM artifact_metadata
              WHERE century = :century AND culture = :culture
              LIMIT 20",
        params: &[
            ParamSpec { name: "century", default: Literal::Text("11th century") },
            CULTURE,
        ],
    },
    CatalogQuery {
        id: 2,
        label: "All unique cultures",
        sql: "SELECT culture, COUNT(*) AS count
              FROM artifact_metadata
              WHERE culture IS NOT NULL
              GROUP BY culture
              ORDER BY count DESC",
        params: &[],
    },
    CatalogQuery {
        id: 3,
        label: "Artifacts from Archaic Period",
        sql: "SELECT id, title, culture, period
              FROM artifact_metadata
              WHERE period LIKE '%' || :period || '%'
              LIMIT 20",
        params: &[ParamSpec { name: "period", default: Literal::Text("Archaic") }],
    },
    CatalogQuery {
        id: 4,
        label: "Artifacts by accession year",
        sql: "SELECT title, accessionyear, accessionmethod
              FROM artifact_metadata
              WHERE accessionyear IS NOT NULL
              ORDER BY accessionyear DESC
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 5,
        label: "Artifacts per department",
        sql: "SELECT department, COUNT(*) AS count
              FROM artifact_metadata
              WHERE department IS NOT NULL
              GROUP BY department
              ORDER BY count DESC",
        params: &[],
    },
    CatalogQuery {
        id: 6,
        label: "Artifacts with multiple images",
        sql: "SELECT m.title, a.imagecount
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE a.imagecount > 1
              ORDER BY a.imagecount DESC
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 7,
        label: "Average artifact rank",
        sql: "SELECT AVG(rank) AS avg_rank, COUNT(*) AS total
              FROM artifact_media
              WHERE rank > 0",
        params: &[],
    },
    CatalogQuery {
        id: 8,
        label: "More colors than media",
        sql: "SELECT m.title, a.colorcount, a.mediacount
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE a.colorcount > a.mediacount
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 9,
        label: "Artifacts from 1500-1600",
        sql: "SELECT m.title, a.datebegin, a.dateend
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE a.datebegin >= :begin AND a.dateend <= :end
              LIMIT 20",
        params: &[
            ParamSpec { name: "begin", default: Literal::Int(1500) },
            ParamSpec { name: "end", default: Literal::Int(1600) },
        ],
    },
    CatalogQuery {
        id: 10,
        label: "Artifacts with no media",
        sql: "SELECT m.title, a.mediacount
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE a.mediacount = 0
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 11,
        label: "All color hues used",
        sql: "SELECT hue, COUNT(*) AS frequency
              FROM artifact_colors
              WHERE hue IS NOT NULL
              GROUP BY hue
              ORDER BY frequency DESC",
        params: &[],
    },
    CatalogQuery {
        id: 12,
        label: "Top 5 colors by frequency",
        sql: "SELECT color, COUNT(*) AS frequency
              FROM artifact_colors
              GROUP BY color
              ORDER BY frequency DESC
              LIMIT 5",
        params: &[],
    },
    CatalogQuery {
        id: 13,
        label: "Average color coverage by hue",
        sql: "SELECT hue, AVG(percent) AS avg_coverage
              FROM artifact_colors
              WHERE hue IS NOT NULL
              GROUP BY hue
              ORDER BY avg_coverage DESC",
        params: &[],
    },
    CatalogQuery {
        id: 14,
        label: "Colors for sample artifacts",
        sql: "SELECT c.objectid, m.title, c.color, c.hue, c.percent
              FROM artifact_colors c
              JOIN artifact_metadata m ON c.objectid = m.id
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 15,
        label: "Total color entries",
        sql: "SELECT COUNT(*) AS total_colors,
                     COUNT(DISTINCT objectid) AS artifacts_with_colors
              FROM artifact_colors",
        params: &[],
    },
    CatalogQuery {
        id: 16,
        label: "Byzantine artifacts with hues",
        sql: "SELECT m.title, GROUP_CONCAT(DISTINCT c.hue) AS hues
              FROM artifact_metadata m
              JOIN artifact_colors c ON m.id = c.objectid
              WHERE m.culture = :culture
              GROUP BY m.id, m.title
              LIMIT 15",
        params: &[CULTURE],
    },
    CatalogQuery {
        id: 17,
        label: "Artifacts with their hues",
        sql: "SELECT m.title, COUNT(DISTINCT c.hue) AS unique_hues
              FROM artifact_metadata m
              JOIN artifact_colors c ON m.id = c.objectid
              GROUP BY m.id, m.title
              ORDER BY unique_hues DESC
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 18,
        label: "Media ranks (period not null)",
        sql: "SELECT m.title, m.period, a.rank
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE m.period IS NOT NULL
              ORDER BY a.rank
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 19,
        label: "Top 10 ranked Grey artifacts",
        sql: "SELECT m.title, a.rank
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              JOIN artifact_colors c ON m.id = c.objectid
              WHERE c.hue = :hue
              ORDER BY a.rank
              LIMIT 10",
        params: &[ParamSpec { name: "hue", default: Literal::Text("Grey") }],
    },
    CatalogQuery {
        id: 20,
        label: "Classification stats",
        sql: "SELECT m.classification,
                     COUNT(*) AS count,
                     AVG(a.mediacount) AS avg_media
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              GROUP BY m.classification
              ORDER BY count DESC",
        params: &[],
    },
    CatalogQuery {
        id: 21,
        label: "Most colorful artifacts",
        sql: "SELECT m.title, a.colorcount
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              ORDER BY a.colorcount DESC
              LIMIT 15",
        params: &[],
    },
    CatalogQuery {
        id: 22,
        label: "Culture and department analysis",
        sql: "SELECT department, culture, COUNT(*) AS count
              FROM artifact_metadata
              WHERE department IS NOT NULL AND culture IS NOT NULL
              GROUP BY department, culture
              ORDER BY count DESC
              LIMIT 20",
        params: &[],
    },
    CatalogQuery {
        id: 23,
        label: "Artifacts by century stats",
        sql: "SELECT century, COUNT(*) AS artifacts, AVG(a.imagecount) AS avg_images
              FROM artifact_metadata m
              JOIN artifact_media a ON m.id = a.objectid
              WHERE century IS NOT NULL
              GROUP BY century
              ORDER BY artifacts DESC",
        params: &[],
    },
    CatalogQuery {
        id: 24,
        label: "Accession method analysis",
        sql: "SELECT accessionmethod, COUNT(*) AS count
              FROM artifact_metadata
              WHERE accessionmethod IS NOT NULL
              GROUP BY accessionmethod
              ORDER BY count DESC",
        params: &[],
    },
    CatalogQuery {
        id: 25,
        label: "Color diversity by classification",
        sql: "SELECT m.classification, COUNT(DISTINCT c.hue) AS color_diversity
              FROM artifact_metadata m
              JOIN artifact_colors c ON m.id = c.objectid
              GROUP BY m.classification
              ORDER BY color_diversity DESC",
        params: &[],
    },
];

/// Looks an entry up by number ("5") or by case-insensitive label.
pub fn find(key: &str) -> Option<&'static CatalogQuery> {
    let key = key.trim();
    match key.parse::<u8>() {
        Ok(id) => CATALOG.iter().find(|q| q.id == id),
        Err(_) => CATALOG.iter().find(|q| q.label.eq_ignore_ascii_case(key)),
    }
}

pub fn run_catalog_query(
    store: &ArtifactStore,
    key: &str,
    overrides: &[(String, String)],
) -> Result<QueryResult> {
    let query = find(key).ok_or_else(|| HarvestError::Query(format!("no catalog query '{key}'")))?;
    let bound = query.bind(overrides)?;
    tracing::debug!(id = query.id, label = query.label, "Running catalog query");
    store.query_with_params(query.sql, &bound)
}

/// What to run: a catalog entry (by number or label) or ad-hoc SQL.
#[derive(Debug, Clone, Copy)]
pub enum QuerySpec<'a> {
    Catalog(&'a str),
    Sql(&'a str),
}

/// Runs a catalog entry with overrides, or ad-hoc SQL with every supplied
/// value bound as text.
pub fn run_query(
    store: &ArtifactStore,
    spec: QuerySpec<'_>,
    params: &[(String, String)],
) -> Result<QueryResult> {
    match spec {
        QuerySpec::Catalog(key) => run_catalog_query(store, key, params),
        QuerySpec::Sql(sql) => {
            let bound: Vec<(String, Value)> = params
                .iter()
                .map(|(k, v)| (k.clone(), Value::Text(v.clone())))
                .collect();
            store.query_with_params(sql, &bound)
        }
    }
}
