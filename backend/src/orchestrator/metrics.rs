//! Per-tick metrics records and sinks
//!
//! After each tick the orchestrator can emit one `MetricsRecord`. Sinks
//! decide where it goes: `TsvMetricsWriter` writes tab-separated lines
//! to any `io::Write`, `MetricsRecorder` keeps them in memory.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Header row written before the first TSV record
pub const TSV_HEADER: &str = "#block\tepoch\tprice\tsupply\tcoupons\tfaith";

/// System-wide snapshot taken at the end of a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub block: u64,
    pub epoch: i64,
    pub price: f64,
    pub total_supply: f64,
    /// Outstanding underlying plus premium coupons
    pub total_coupons: f64,
    /// Faith target of the first agent
    pub faith: f64,
}

impl MetricsRecord {
    /// Format as one TSV line (no trailing newline)
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}",
            self.block, self.epoch, self.price, self.total_supply, self.total_coupons, self.faith
        )
    }
}

/// Destination for per-tick metrics
pub trait MetricsSink {
    fn record(&mut self, record: &MetricsRecord) -> io::Result<()>;
}

/// Writes records as tab-separated lines
#[derive(Debug)]
pub struct TsvMetricsWriter<W: Write> {
    writer: W,
    write_header: bool,
    header_written: bool,
}

impl<W: Write> TsvMetricsWriter<W> {
    /// Writer that emits the header row before the first record
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            write_header: true,
            header_written: false,
        }
    }

    pub fn without_header(writer: W) -> Self {
        Self {
            writer,
            write_header: false,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricsSink for TsvMetricsWriter<W> {
    fn record(&mut self, record: &MetricsRecord) -> io::Result<()> {
        if self.write_header && !self.header_written {
            writeln!(self.writer, "{}", TSV_HEADER)?;
            self.header_written = true;
        }
        writeln!(self.writer, "{}", record.to_tsv())?;
        self.writer.flush()
    }
}

/// Keeps every record in memory
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    records: Vec<MetricsRecord>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MetricsRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&MetricsRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetricsSink for MetricsRecorder {
    fn record(&mut self, record: &MetricsRecord) -> io::Result<()> {
        self.records.push(*record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_line_format() {
        let record = MetricsRecord {
            block: 12,
            epoch: 1,
            price: 1.23456,
            total_supply: 2000.0,
            total_coupons: 0.0,
            faith: 1_000_000.0,
        };
        assert_eq!(record.to_tsv(), "12\t1\t1.23\t2000.00\t0.00\t1000000.00");
    }
}
