//! CSV report adapter implementing ReportPort.
//!
//! One row per record: `kind,timestamp,balance,profit` where `kind` is
//! `weekly`, `daily` or `final`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RebalancerError;
use crate::domain::portfolio::IntervalProfit;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    kind: &'a str,
    timestamp: String,
    balance: String,
    profit: String,
}

impl<'a> ReportRow<'a> {
    fn new(kind: &'a str, record: &IntervalProfit) -> Self {
        ReportRow {
            kind,
            timestamp: record.ts.to_rfc3339(),
            balance: format!("{:.2}", record.balance),
            profit: format!("{:.4}", record.profit),
        }
    }
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn report_err(e: impl std::fmt::Display) -> RebalancerError {
    RebalancerError::Report {
        reason: e.to_string(),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), RebalancerError> {
        let mut wtr = csv::Writer::from_path(output_path)
            .map_err(|e| report_err(format!("failed to create {output_path}: {e}")))?;

        for record in &result.weekly {
            wtr.serialize(ReportRow::new("weekly", record))
                .map_err(report_err)?;
        }
        for record in &result.daily {
            wtr.serialize(ReportRow::new("daily", record))
                .map_err(report_err)?;
        }
        let closing_ts = result
            .weekly
            .last()
            .map(|r| r.ts.to_rfc3339())
            .unwrap_or_default();
        wtr.serialize(ReportRow {
            kind: "final",
            timestamp: closing_ts,
            balance: format!("{:.2}", result.final_balance),
            profit: format!("{:.4}", result.final_profit),
        })
        .map_err(report_err)?;
        wtr.flush().map_err(report_err)?;

        info!(path = %output_path, rows = result.weekly.len() + result.daily.len() + 1, "report written");
        Ok(())
    }
}
