//! CSV directory data adapter.
//!
//! Layout under the base directory:
//!
//! ```text
//! ohlcv/<SYMBOL>.csv        date,open,high,low,close,volume
//! indicators/<SYMBOL>.csv   date,volatility[,trend]
//! rankings.csv              date,symbol,score
//! capital.csv               date,amount,kind      (optional)
//! ```
//!
//! Everything is loaded up front; lookups never touch the filesystem.

use crate::domain::decision::Candidate;
use crate::domain::error::RotatorError;
use crate::domain::holding::Holding;
use crate::domain::ledger::{CapitalEvent, CapitalEventKind};
use crate::domain::market_data::SymbolSeries;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct IndicatorRow {
    date: NaiveDate,
    volatility: Option<f64>,
    #[serde(default)]
    trend: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RankingRow {
    date: NaiveDate,
    symbol: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct CapitalRow {
    date: NaiveDate,
    amount: f64,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct HoldingRow {
    symbol: String,
    units: i64,
    entry_price: f64,
    entry_date: NaiveDate,
    entry_stop: f64,
    #[serde(default)]
    current_stop: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Default)]
pub struct CsvAdapter {
    base_path: PathBuf,
    series: HashMap<String, SymbolSeries>,
    rankings: BTreeMap<NaiveDate, Vec<Candidate>>,
    capital: Vec<CapitalEvent>,
}

impl CsvAdapter {
    pub fn load<P: AsRef<Path>>(base_path: P) -> Result<Self, RotatorError> {
        let base_path = base_path.as_ref().to_path_buf();
        let mut series = HashMap::new();

        for (symbol, path) in csv_files(&base_path.join("ohlcv"))? {
            let rows: Vec<BarRow> = read_rows(&path)?;
            let bars = rows
                .into_iter()
                .map(|r| OhlcvBar {
                    symbol: symbol.clone(),
                    date: r.date,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                })
                .collect();
            series.insert(symbol.clone(), SymbolSeries::new(symbol, bars));
        }

        let indicator_dir = base_path.join("indicators");
        if indicator_dir.is_dir() {
            for (symbol, path) in csv_files(&indicator_dir)? {
                let rows: Vec<IndicatorRow> = read_rows(&path)?;
                let entry = series
                    .entry(symbol.clone())
                    .or_insert_with(|| SymbolSeries::new(symbol, Vec::new()));
                for row in rows {
                    if let Some(v) = row.volatility {
                        entry.volatility.insert(row.date, v);
                    }
                    if let Some(t) = row.trend {
                        entry.trend.insert(row.date, t);
                    }
                }
            }
        }

        let mut rankings: BTreeMap<NaiveDate, Vec<Candidate>> = BTreeMap::new();
        let rows: Vec<RankingRow> = read_rows(&base_path.join("rankings.csv"))?;
        for row in rows {
            rankings
                .entry(row.date)
                .or_default()
                .push(Candidate::new(row.symbol.trim(), row.score));
        }

        let capital_path = base_path.join("capital.csv");
        let capital = if capital_path.is_file() {
            let rows: Vec<CapitalRow> = read_rows(&capital_path)?;
            rows.into_iter()
                .map(|r| {
                    let kind: CapitalEventKind = r.kind.parse().map_err(|reason| {
                        RotatorError::data(format!("{}: {}", capital_path.display(), reason))
                    })?;
                    Ok(CapitalEvent {
                        date: r.date,
                        amount: r.amount,
                        kind,
                    })
                })
                .collect::<Result<Vec<_>, RotatorError>>()?
        } else {
            Vec::new()
        };

        tracing::info!(
            path = %base_path.display(),
            symbols = series.len(),
            ranking_dates = rankings.len(),
            capital_events = capital.len(),
            "loaded csv data"
        );

        Ok(Self {
            base_path,
            series,
            rankings,
            capital,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn series(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.series.get(symbol)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<OhlcvBar>, RotatorError> {
        Ok(self
            .series
            .get(symbol)
            .and_then(|s| s.get_bar(date))
            .cloned())
    }

    fn fetch_volatility(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, RotatorError> {
        Ok(self.series.get(symbol).and_then(|s| s.volatility_on(date)))
    }

    fn fetch_trend(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, RotatorError> {
        Ok(self.series.get(symbol).and_then(|s| s.trend_on(date)))
    }

    fn fetch_rankings(&self, date: NaiveDate) -> Result<Vec<Candidate>, RotatorError> {
        Ok(self.rankings.get(&date).cloned().unwrap_or_default())
    }

    fn fetch_capital_events(&self) -> Result<Vec<CapitalEvent>, RotatorError> {
        Ok(self.capital.clone())
    }

    fn list_symbols(&self) -> Result<Vec<String>, RotatorError> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Holdings file for a one-off planning cycle:
/// `symbol,units,entry_price,entry_date,entry_stop[,current_stop,score]`.
pub fn load_holdings<P: AsRef<Path>>(path: P) -> Result<Vec<Holding>, RotatorError> {
    let rows: Vec<HoldingRow> = read_rows(path.as_ref())?;
    Ok(rows
        .into_iter()
        .map(|r| {
            let mut h = Holding::open(
                r.symbol.trim(),
                r.units,
                r.entry_price,
                r.entry_date,
                r.entry_stop,
                r.score.unwrap_or(0.0),
            );
            if let Some(stop) = r.current_stop {
                h.raise_stop(stop);
            }
            h
        })
        .collect())
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, RotatorError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| RotatorError::data(format!("failed to read {}: {}", path.display(), e)))?;
    rdr.deserialize()
        .map(|row| {
            row.map_err(|e| {
                RotatorError::data(format!("CSV parse error in {}: {}", path.display(), e))
            })
        })
        .collect()
}

/// `(SYMBOL, path)` for every `*.csv` in `dir`, sorted by symbol.
fn csv_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, RotatorError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        RotatorError::data(format!("failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| RotatorError::data(format!("directory entry error: {}", e)))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            if let Some(stem) = path.file_stem() {
                files.push((stem.to_string_lossy().to_string(), path));
            }
        }
    }
    files.sort();
    Ok(files)
}
