//! Turns one raw API object into the rows stored for it.
//!
//! Parsing is lenient field by field: a value of the wrong shape becomes
//! `None` rather than failing the whole object. Only a missing or unusable
//! `id` rejects the record.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::database::repo::{ArtifactColor, ArtifactMedia, ArtifactMetadata, ArtifactRecord};
use crate::error::{HarvestError, Result};

/// Raw artifact as sent by the API, before any validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawArtifact {
    #[serde(deserialize_with = "lenient_int")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub culture: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub period: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub century: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub medium: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub dimensions: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub department: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub classification: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub accessionyear: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub accessionmethod: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub imagecount: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub mediacount: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub colorcount: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub rank: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub datebegin: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub dateend: Option<i64>,
    #[serde(deserialize_with = "lenient_colors")]
    pub colors: Vec<RawColor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawColor {
    #[serde(deserialize_with = "lenient_text")]
    pub color: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub spectrum: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub hue: Option<String>,
    #[serde(deserialize_with = "lenient_float")]
    pub percent: Option<f64>,
    #[serde(deserialize_with = "lenient_text")]
    pub css3: Option<String>,
}

impl RawArtifact {
    pub fn parse(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(HarvestError::ValidationSkip("record is not a JSON object".into()));
        }
        RawArtifact::deserialize(value)
            .map_err(|e| HarvestError::ValidationSkip(format!("unreadable record: {e}")))
    }
}

impl RawColor {
    /// A color is usable only with all five attributes present.
    fn complete(self) -> Option<ArtifactColor> {
        let percent = self.percent.filter(|p| p.is_finite())?;
        Some(ArtifactColor {
            color: self.color?,
            spectrum: self.spectrum?,
            hue: self.hue?,
            percent,
            css3: self.css3?,
        })
    }
}

/// Maps one raw API object to its metadata, media and color rows.
pub fn normalize(value: &Value) -> Result<ArtifactRecord> {
    normalize_raw(RawArtifact::parse(value)?)
}

pub fn normalize_raw(raw: RawArtifact) -> Result<ArtifactRecord> {
    let id = raw
        .id
        .ok_or_else(|| HarvestError::ValidationSkip("record has no usable id".into()))?;

    let media = ArtifactMedia {
        image_count: raw.imagecount,
        media_count: raw.mediacount,
        color_count: raw.colorcount,
        rank: raw.rank,
        date_begin: raw.datebegin,
        date_end: raw.dateend,
    };
    let has_media = [
        media.image_count,
        media.media_count,
        media.color_count,
        media.rank,
        media.date_begin,
        media.date_end,
    ]
    .iter()
    .any(Option::is_some);

    let mut seen = HashSet::new();
    let colors = raw
        .colors
        .into_iter()
        .filter_map(RawColor::complete)
        .filter(|c| seen.insert((c.color.clone(), c.hue.clone())))
        .collect();

    Ok(ArtifactRecord {
        metadata: ArtifactMetadata {
            id,
            title: raw.title,
            culture: raw.culture,
            period: raw.period,
            century: raw.century,
            medium: raw.medium,
            dimensions: raw.dimensions,
            description: raw.description,
            department: raw.department,
            classification: raw.classification,
            accession_year: raw.accessionyear,
            accession_method: raw.accessionmethod,
        },
        media: has_media.then_some(media),
        colors,
    })
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(as_int(&Value::deserialize(d)?))
}

fn lenient_float<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_colors<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<RawColor>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .filter_map(|item| RawColor::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn color(hue: &str) -> Value {
        json!({
            "color": "#c8c8c8",
            "spectrum": "#955ba5",
            "hue": hue,
            "percent": 0.42,
            "css3": "#c0c0c0"
        })
    }

    #[test]
    fn test_scenario_string_year_and_partial_color() -> anyhow::Result<()> {
        let raw = json!({
            "id": 42,
            "accessionyear": "1850",
            "colorcount": 2,
            "colors": [
                color("Grey"),
                { "color": "#ff0000", "spectrum": "#e0312d", "hue": "Red", "css3": "#ff0000" }
            ]
        });

        let record = normalize(&raw)?;
        assert_eq!(record.metadata.id, 42);
        assert_eq!(record.metadata.accession_year, Some(1850));
        assert_eq!(record.media.as_ref().and_then(|m| m.color_count), Some(2));
        assert_eq!(record.colors.len(), 1);
        assert_eq!(record.colors[0].hue, "Grey");
        Ok(())
    }

    #[test]
    fn test_missing_fields_stay_null() -> anyhow::Result<()> {
        let record = normalize(&json!({ "id": 7, "title": "Bowl", "imagecount": 0 }))?;
        assert_eq!(record.metadata.title.as_deref(), Some("Bowl"));
        assert_eq!(record.metadata.culture, None);
        assert_eq!(record.metadata.accession_year, None);

        let media = record.media.expect("media row");
        assert_eq!(media.image_count, Some(0));
        assert_eq!(media.media_count, None);
        assert_eq!(media.date_begin, None);
        assert_eq!(media.date_end, None);
        assert!(record.colors.is_empty());
        Ok(())
    }

    #[test]
    fn test_no_media_fields_means_no_media_row() -> anyhow::Result<()> {
        let record = normalize(&json!({ "id": 3, "title": "Coin" }))?;
        assert!(record.media.is_none());
        Ok(())
    }

    #[test]
    fn test_non_numeric_values_become_null() -> anyhow::Result<()> {
        let record = normalize(&json!({
            "id": "19",
            "accessionyear": "unknown",
            "rank": 12.0,
            "datebegin": -500,
            "dateend": 1.5,
            "mediacount": null
        }))?;
        assert_eq!(record.metadata.id, 19);
        assert_eq!(record.metadata.accession_year, None);
        let media = record.media.expect("media row");
        assert_eq!(media.rank, Some(12));
        assert_eq!(media.date_begin, Some(-500));
        assert_eq!(media.date_end, None);
        assert_eq!(media.media_count, None);
        Ok(())
    }

    #[test]
    fn test_missing_id_is_skipped() {
        for raw in [json!({ "title": "Untitled" }), json!({ "id": "abc" }), json!([1, 2])] {
            let err = normalize(&raw).unwrap_err();
            assert!(matches!(err, HarvestError::ValidationSkip(_)), "{raw}");
        }
    }

    #[test]
    fn test_text_passes_through_unmodified() -> anyhow::Result<()> {
        let record = normalize(&json!({
            "id": 1,
            "century": "  late 5th-early 4th century BCE ",
            "period": "Archaic period",
            "dimensions": 12
        }))?;
        assert_eq!(
            record.metadata.century.as_deref(),
            Some("  late 5th-early 4th century BCE ")
        );
        assert_eq!(record.metadata.period.as_deref(), Some("Archaic period"));
        assert_eq!(record.metadata.dimensions.as_deref(), Some("12"));
        Ok(())
    }

    #[test]
    fn test_colors_filtered_and_deduplicated() -> anyhow::Result<()> {
        let record = normalize(&json!({
            "id": 5,
            "colors": [
                color("Grey"),
                color("Grey"),
                color("Blue"),
                { "color": "#000", "spectrum": "#000", "hue": "Black", "percent": "0.1", "css3": "#000" },
                { "color": "#000", "spectrum": "#000", "hue": null, "percent": 0.1, "css3": "#000" },
                "not a color"
            ]
        }))?;
        let hues: Vec<&str> = record.colors.iter().map(|c| c.hue.as_str()).collect();
        assert_eq!(hues, vec!["Grey", "Blue", "Black"]);
        assert_eq!(record.colors[2].percent, 0.1);
        Ok(())
    }

    #[test]
    fn test_colors_not_an_array() -> anyhow::Result<()> {
        let record = normalize(&json!({ "id": 5, "colors": "none" }))?;
        assert!(record.colors.is_empty());
        Ok(())
    }
}
