use crate::worker::csv_import::ErrorRow;

/// Serializes accumulated row failures to the stable `row,error,raw` CSV
/// format, in detection order (not sorted by row number — see the worker's
/// flush-time vs. parse-time error ordering).
pub fn build_csv(rows: &[ErrorRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["row", "error", "raw"])?;
    for row in rows {
        writer.write_record([row.row.to_string(), row.error.clone(), row.raw.clone()])?;
    }
    writer.into_inner().map_err(|e| e.into_error())
}

/// The short `error` summary stored on the job: first three messages,
/// truncated with an ellipsis marker when more were recorded.
pub fn summarize(rows: &[ErrorRow]) -> String {
    let head: Vec<&str> = rows.iter().take(3).map(|r| r.error.as_str()).collect();
    let joined = head.join(" | ");
    if rows.len() > 3 {
        format!("errors: {}; first: {} [...]", rows.len(), joined)
    } else {
        format!("errors: {}; first: {}", rows.len(), joined)
    }
}
