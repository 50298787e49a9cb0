//! JSON output
//!
//! Exports session reports and chart history in JSON format

use anyhow::{Context, Result};
use frameperf_aggregator::buffer::ChartSnapshot;
use frameperf_shared::Report;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use tracing::info;

/// Write a session report to `output_path`
pub fn write_report(report: &Report, output_path: &str) -> Result<()> {
    write_pretty(report, output_path).context("Failed to write session report")
}

/// Write the chart history to `output_path`
pub fn write_chart(snapshot: &ChartSnapshot, output_path: &str) -> Result<()> {
    write_pretty(snapshot, output_path).context("Failed to write chart history")
}

fn write_pretty<T: Serialize>(value: &T, output_path: &str) -> Result<()> {
    info!("Generating JSON output: {}", output_path);

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path))?;

    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, value).context("Failed to serialize to JSON")?;

    info!("JSON output written to {}", output_path);

    Ok(())
}
