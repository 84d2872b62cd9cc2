//! Interactive plot of stored transients.
//!
//! Renders a standalone HTML page driven by plotly.js with one scatter trace
//! per record and buttons that switch the time axis between log and linear.

use crate::store::StoredRecord;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;

/// File the plot is written to unless configured otherwise.
pub const DEFAULT_PLOT_FILE: &str = "Open-JIP_Plot.html";

const PLOTLY_SRC: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("No records to plot")]
    NoRecords,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisScale {
    #[default]
    Log,
    Linear,
}

impl AxisScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisScale::Log => "log",
            AxisScale::Linear => "linear",
        }
    }
}

#[derive(Serialize)]
struct ScatterTrace<'a> {
    x: &'a [f64],
    y: &'a [f64],
    name: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn figure(records: &[StoredRecord], scale: AxisScale) -> serde_json::Value {
    let traces: Vec<ScatterTrace<'_>> = records
        .iter()
        .map(|record| ScatterTrace {
            x: &record.time,
            y: &record.value,
            name: record.time_of_day(),
            mode: "markers",
            kind: "scatter",
        })
        .collect();

    let axis_button = |label: &str, scale: AxisScale| {
        json!({
            "label": label,
            "method": "relayout",
            "args": [{ "xaxis.type": scale.as_str() }],
        })
    };

    json!({
        "data": traces,
        "layout": {
            "title": { "text": "Open-JIP fluorescence transients" },
            "xaxis": { "title": { "text": "Time (ms)" }, "type": scale.as_str() },
            "yaxis": { "title": { "text": "Fluorescence (V)" } },
            "updatemenus": [{
                "type": "buttons",
                "direction": "left",
                "x": 0.0,
                "xanchor": "left",
                "y": 1.15,
                "buttons": [
                    axis_button("Log time", AxisScale::Log),
                    axis_button("Linear time", AxisScale::Linear),
                ],
            }],
        },
    })
}

/// Render the records as a self-contained HTML page.
pub fn render_html(records: &[StoredRecord], scale: AxisScale) -> Result<String, PlotError> {
    if records.is_empty() {
        return Err(PlotError::NoRecords);
    }

    // keep the embedded JSON from closing the script element
    let figure = serde_json::to_string(&figure(records, scale))?.replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Open-JIP transients</title>
<script src="{PLOTLY_SRC}"></script>
</head>
<body>
<div id="transients" style="width:100%;height:90vh;"></div>
<script>
const figure = {figure};
Plotly.newPlot("transients", figure.data, figure.layout);
</script>
</body>
</html>
"#
    ))
}

pub fn write_html(
    records: &[StoredRecord],
    scale: AxisScale,
    path: impl AsRef<Path>,
) -> Result<(), PlotError> {
    let html = render_html(records, scale)?;
    fs::write(path.as_ref(), html)?;
    log::info!(
        "Plotted {} transients to {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str) -> StoredRecord {
        StoredRecord {
            timestamp: timestamp.to_string(),
            time: vec![0.01, 2.0, 30.0],
            value: vec![0.1, 0.4, 0.8],
        }
    }

    #[test]
    fn test_one_trace_per_record() {
        let records = [
            record("2026-10-19 14:03:12.000001"),
            record("2026-10-19 14:05:40.000002"),
        ];
        let figure = figure(&records, AxisScale::Log);

        let data = figure["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["name"], "14:03:12.000001");
        assert_eq!(data[1]["name"], "14:05:40.000002");
        assert_eq!(data[0]["type"], "scatter");
        assert_eq!(data[0]["mode"], "markers");
        assert_eq!(data[0]["x"][1], 2.0);
    }

    #[test]
    fn test_initial_axis_and_toggle_buttons() {
        let figure = figure(&[record("2026-10-19 14:03:12.000001")], AxisScale::Linear);

        assert_eq!(figure["layout"]["xaxis"]["type"], "linear");
        let buttons = figure["layout"]["updatemenus"][0]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(buttons[0]["args"][0]["xaxis.type"], "log");
        assert_eq!(buttons[1]["args"][0]["xaxis.type"], "linear");
    }

    #[test]
    fn test_render_html_embeds_figure() {
        let html = render_html(&[record("2026-10-19 14:03:12.000001")], AxisScale::Log).unwrap();
        assert!(html.contains(PLOTLY_SRC));
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains("\"14:03:12.000001\""));
    }

    #[test]
    fn test_nothing_to_plot() {
        assert!(matches!(
            render_html(&[], AxisScale::Log),
            Err(PlotError::NoRecords)
        ));
    }
}
