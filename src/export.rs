use serde::Serialize;

use crate::history::SessionHistory;

/// One tabular row for the external exporter. Missing cells serialize as
/// null / empty; actual CSV or JSON encoding happens outside the core.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub t_unix: Option<f64>,
    pub t_iso: Option<String>,
    pub proxy: Option<f64>,
    pub integrated_mass_g: Option<f64>,
    pub scale_g: Option<f64>,
}

/// Zip the three sequences by index, one row per index up to the longest
/// sequence. Rows are NOT aligned by timestamp: scale readings are
/// typically sparser than flow samples, so their column drifts relative
/// to the others. Known defect, kept as-is.
pub fn build_rows(history: &SessionHistory) -> Vec<ExportRow> {
    let rows = history
        .flow()
        .len()
        .max(history.integrated().len())
        .max(history.readings().len());
    (0..rows)
        .map(|i| {
            let flow = history.flow().get(i);
            let integrated = history.integrated().get(i);
            let reading = history.readings().get(i);
            ExportRow {
                t_unix: flow.map(|f| f.captured_at.timestamp_millis() as f64 / 1000.0),
                t_iso: flow.map(|f| f.captured_at.to_rfc3339()),
                proxy: flow.map(|f| f.smoothed),
                integrated_mass_g: integrated.map(|s| s.mass_g),
                scale_g: reading.map(|r| r.mass_g),
            }
        })
        .collect()
}
