//! CSV file data adapters: hourly candles and the instrument list.

use crate::domain::candle::Candle;
use crate::domain::error::RebalancerError;
use crate::domain::instrument::{Instrument, InstrumentClass};
use crate::domain::intervals::parse_timestamp;
use crate::domain::universe::UniverseCriteria;
use crate::ports::instrument_port::InstrumentPort;
use crate::ports::price_port::PricePort;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Candles read from `{dir}/{instrument_id}.csv` files with a
/// `timestamp,close` header, held in memory sorted by time.
pub struct CsvCandleAdapter {
    candles: HashMap<String, Vec<Candle>>,
}

impl CsvCandleAdapter {
    /// Loads every `.csv` file in `base_path`; the file stem is the
    /// instrument id.
    pub fn load(base_path: &Path) -> Result<Self, RebalancerError> {
        let entries = fs::read_dir(base_path).map_err(|e| RebalancerError::Data {
            reason: format!("failed to read directory {}: {}", base_path.display(), e),
        })?;

        let mut candles = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| RebalancerError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let series = read_candles(&path)?;
            debug!(instrument = %id, candles = series.len(), "candles loaded");
            candles.insert(id.to_string(), series);
        }

        info!(instruments = candles.len(), dir = %base_path.display(), "candle files loaded");
        Ok(Self { candles })
    }

    pub fn from_candles(candles: HashMap<String, Vec<Candle>>) -> Self {
        let candles = candles
            .into_iter()
            .map(|(id, mut series)| {
                series.sort_by_key(|c| c.ts);
                (id, series)
            })
            .collect();
        Self { candles }
    }

    pub fn instrument_count(&self) -> usize {
        self.candles.len()
    }
}

fn read_candles(path: &Path) -> Result<Vec<Candle>, RebalancerError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| RebalancerError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut candles = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| RebalancerError::Data {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        })?;

        let ts_str = record.get(0).ok_or_else(|| RebalancerError::Data {
            reason: "missing timestamp column".into(),
        })?;
        let ts = parse_timestamp(ts_str).ok_or_else(|| RebalancerError::Data {
            reason: format!("invalid timestamp {:?} in {}", ts_str, path.display()),
        })?;

        let close: f64 = record
            .get(1)
            .ok_or_else(|| RebalancerError::Data {
                reason: "missing close column".into(),
            })?
            .trim()
            .parse()
            .map_err(|e| RebalancerError::Data {
                reason: format!("invalid close value: {}", e),
            })?;

        candles.push(Candle { ts, close });
    }

    candles.sort_by_key(|c| c.ts);
    Ok(candles)
}

impl PricePort for CsvCandleAdapter {
    /// The candle at `ts`, else the latest candle of the same calendar day
    /// within one hour either side.
    fn price_at(&self, instrument_id: &str, ts: DateTime<Utc>) -> Option<f64> {
        let series = self.candles.get(instrument_id)?;
        if let Ok(i) = series.binary_search_by_key(&ts, |c| c.ts) {
            return Some(series[i].close);
        }

        let lo = series.partition_point(|c| c.ts < ts - TimeDelta::hours(1));
        let hi = series.partition_point(|c| c.ts <= ts + TimeDelta::hours(1));
        series[lo..hi]
            .iter()
            .rev()
            .find(|c| c.ts.date_naive() == ts.date_naive())
            .map(|c| c.close)
    }

    fn candles(&self, instrument_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Candle> {
        let Some(series) = self.candles.get(instrument_id) else {
            return Vec::new();
        };
        let lo = series.partition_point(|c| c.ts < from);
        let hi = series.partition_point(|c| c.ts <= to);
        series[lo..hi.max(lo)].to_vec()
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    id: String,
    ticker: String,
    lot: u64,
    class: String,
    min_price_increment: f64,
}

/// Instrument list read from a CSV with
/// `id,ticker,lot,class,min_price_increment` columns.
pub struct CsvInstrumentAdapter {
    path: PathBuf,
}

impl CsvInstrumentAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<Vec<Instrument>, RebalancerError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| RebalancerError::Data {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut instruments = Vec::new();
        for row in rdr.deserialize::<InstrumentRow>() {
            let row = row.map_err(|e| RebalancerError::Data {
                reason: format!("CSV parse error in {}: {}", self.path.display(), e),
            })?;
            let class: InstrumentClass = row
                .class
                .parse()
                .map_err(|e: String| RebalancerError::Data { reason: e })?;
            if row.lot == 0 {
                return Err(RebalancerError::Data {
                    reason: format!("instrument {} has a zero lot size", row.id),
                });
            }
            instruments.push(Instrument {
                id: row.id,
                ticker: row.ticker,
                lot: row.lot,
                class,
                min_price_increment: row.min_price_increment,
            });
        }
        Ok(instruments)
    }
}

impl InstrumentPort for CsvInstrumentAdapter {
    fn load_instruments(
        &self,
        criteria: &UniverseCriteria,
    ) -> Result<Vec<Instrument>, RebalancerError> {
        let instruments: Vec<Instrument> = self
            .read_all()?
            .into_iter()
            .filter(|i| criteria.matches(i))
            .collect();
        if instruments.is_empty() {
            return Err(RebalancerError::NoInstruments);
        }
        Ok(instruments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn setup_candles() -> (TempDir, CsvCandleAdapter) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("SBER.csv"),
            "timestamp,close\n\
             2024-01-15 10:00:00,100.0\n\
             2024-01-15 12:00:00,102.0\n\
             2024-01-15T23:00:00Z,104.0\n\
             2024-01-16 00:30:00,90.0\n",
        )
        .unwrap();
        fs::write(dir.path().join("EMPTY.csv"), "timestamp,close\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let adapter = CsvCandleAdapter::load(dir.path()).unwrap();
        (dir, adapter)
    }

    #[test]
    fn load_reads_csv_files_only() {
        let (_dir, adapter) = setup_candles();
        assert_eq!(adapter.instrument_count(), 2);
    }

    #[test]
    fn exact_timestamp_wins() {
        let (_dir, adapter) = setup_candles();
        assert_eq!(adapter.price_at("SBER", at(15, 12)), Some(102.0));
    }

    #[test]
    fn falls_back_to_latest_same_day_candle_within_an_hour() {
        let (_dir, adapter) = setup_candles();
        // 11:00 -> candidates 10:00 and 12:00, latest is 12:00
        assert_eq!(adapter.price_at("SBER", at(15, 11)), Some(102.0));
        // 14:00 has nothing within an hour
        assert_eq!(adapter.price_at("SBER", at(15, 14)), None);
    }

    #[test]
    fn fallback_stays_within_the_day() {
        let (_dir, adapter) = setup_candles();
        // 16th 00:00: 23:00 on the 15th is a different day, 00:30 qualifies
        assert_eq!(adapter.price_at("SBER", at(16, 0)), Some(90.0));
    }

    #[test]
    fn unknown_instrument_has_no_price() {
        let (_dir, adapter) = setup_candles();
        assert_eq!(adapter.price_at("GAZP", at(15, 12)), None);
        assert_eq!(adapter.price_at("EMPTY", at(15, 12)), None);
    }

    #[test]
    fn candles_in_range_inclusive() {
        let (_dir, adapter) = setup_candles();
        let candles = adapter.candles("SBER", at(15, 12), at(15, 23));
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 104.0]);
        assert!(adapter.candles("SBER", at(20, 0), at(21, 0)).is_empty());
        assert!(adapter.candles("SBER", at(16, 0), at(15, 0)).is_empty());
    }

    #[test]
    fn load_fails_on_bad_close() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("X.csv"), "timestamp,close\n2024-01-15,abc\n").unwrap();
        assert!(matches!(
            CsvCandleAdapter::load(dir.path()),
            Err(RebalancerError::Data { .. })
        ));
    }

    #[test]
    fn load_fails_on_missing_dir() {
        assert!(CsvCandleAdapter::load(Path::new("/nonexistent/candles")).is_err());
    }

    fn instruments_file(content: &str) -> (TempDir, CsvInstrumentAdapter) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instruments.csv");
        fs::write(&path, content).unwrap();
        (dir, CsvInstrumentAdapter::new(path))
    }

    const INSTRUMENTS: &str = "id,ticker,lot,class,min_price_increment\n\
        BBG1, SBER, 10, share, 0.01\n\
        BBG2, OFZ, 1, bond, 0.001\n\
        BBG3, TMOS, 1, etf, 0.001\n";

    #[test]
    fn filters_by_class() {
        let (_dir, adapter) = instruments_file(INSTRUMENTS);
        let criteria = UniverseCriteria {
            ids: vec![],
            classes: vec![InstrumentClass::Share, InstrumentClass::Etf],
        };
        let ids: Vec<String> = adapter
            .load_instruments(&criteria)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["BBG1", "BBG3"]);
    }

    #[test]
    fn filters_by_id_and_keeps_fields() {
        let (_dir, adapter) = instruments_file(INSTRUMENTS);
        let criteria = UniverseCriteria {
            ids: vec!["BBG1".into()],
            classes: vec![],
        };
        let instruments = adapter.load_instruments(&criteria).unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].ticker, "SBER");
        assert_eq!(instruments[0].lot, 10);
        assert_eq!(instruments[0].class, InstrumentClass::Share);
    }

    #[test]
    fn no_match_is_an_error() {
        let (_dir, adapter) = instruments_file(INSTRUMENTS);
        let criteria = UniverseCriteria {
            ids: vec![],
            classes: vec![InstrumentClass::Currency],
        };
        assert!(matches!(
            adapter.load_instruments(&criteria),
            Err(RebalancerError::NoInstruments)
        ));
    }

    #[test]
    fn unknown_class_is_a_data_error() {
        let (_dir, adapter) =
            instruments_file("id,ticker,lot,class,min_price_increment\nX,X,1,crypto,0.1\n");
        let criteria = UniverseCriteria {
            ids: vec!["X".into()],
            classes: vec![],
        };
        assert!(matches!(
            adapter.load_instruments(&criteria),
            Err(RebalancerError::Data { .. })
        ));
    }
}
