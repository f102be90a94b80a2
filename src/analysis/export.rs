use crate::database::repo::{value_to_text, QueryResult};
use crate::error::{HarvestError, Result};

/// Formats a result set as CSV with a header row. NULL becomes an empty cell.
pub fn export_csv(result: &QueryResult) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.columns).map_err(csv_error)?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(value_to_text))
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| HarvestError::Query(format!("csv export failed: {e}")))
}

fn csv_error(err: csv::Error) -> HarvestError {
    HarvestError::Query(format!("csv export failed: {err}"))
}
