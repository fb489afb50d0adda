//! CSV directory source.
//!
//! Layout: `{dir}/{SYMBOL}.csv`, one row per observation, oldest first.
//!
//! Header names are matched case-insensitively. The timestamp column is
//! `date`, `timestamp` or `time`; the value column is configurable (default
//! `close`). When `high` and `low` columns are present they are carried as
//! the point's range for true-range computation.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pfchart_core::PricePoint;
use rust_decimal::Decimal;

use super::{PriceSource, PriceStream, SourceError, VecStream};

const TIMESTAMP_FIELDS: [&str; 3] = ["date", "timestamp", "time"];

pub struct CsvDirSource {
    dir: PathBuf,
    price_field: String,
}

/// Header positions resolved for one file.
struct Columns {
    timestamp: usize,
    value: usize,
    range: Option<(usize, usize)>,
}

impl CsvDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            price_field: "close".to_string(),
        }
    }

    /// Use another column (e.g. `adj_close`) as the charted value.
    pub fn with_price_field(mut self, field: &str) -> Self {
        self.price_field = field.trim().to_string();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Find `{symbol}.csv`, matching the file stem case-insensitively.
    fn path_for(&self, symbol: &str) -> Result<PathBuf, SourceError> {
        let exact = self.dir.join(format!("{symbol}.csv"));
        if exact.is_file() {
            return Ok(exact);
        }
        self.csv_files()?
            .into_iter()
            .find(|(stem, _)| stem.eq_ignore_ascii_case(symbol))
            .map(|(_, path)| path)
            .ok_or_else(|| SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    fn csv_files(&self) -> Result<Vec<(String, PathBuf)>, SourceError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SourceError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| SourceError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((stem.to_string(), path.clone()));
            }
        }
        Ok(files)
    }

    fn read_points(&self, symbol: &str, path: &Path) -> Result<Vec<PricePoint>, SourceError> {
        let csv_err = |source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let columns = self.resolve_columns(symbol, &headers)?;

        let mut points = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            // header is line 1
            let line = i as u64 + 2;
            let malformed = |reason: String| SourceError::Malformed {
                symbol: symbol.to_string(),
                line,
                reason,
            };
            let field = |idx: usize| record.get(idx).unwrap_or_default();

            let timestamp = parse_timestamp(field(columns.timestamp)).map_err(&malformed)?;
            let value = parse_decimal(field(columns.value)).map_err(&malformed)?;
            let mut point = PricePoint::new(timestamp, value);
            if let Some((hi, lo)) = columns.range {
                let high = parse_decimal(field(hi)).map_err(&malformed)?;
                let low = parse_decimal(field(lo)).map_err(&malformed)?;
                point = point.with_range(high, low);
            }
            points.push(point);
        }
        Ok(points)
    }

    fn resolve_columns(
        &self,
        symbol: &str,
        headers: &csv::StringRecord,
    ) -> Result<Columns, SourceError> {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let missing = |what: &str| SourceError::Malformed {
            symbol: symbol.to_string(),
            line: 1,
            reason: format!("missing {what} column"),
        };

        let timestamp = TIMESTAMP_FIELDS
            .iter()
            .find_map(|f| find(*f))
            .ok_or_else(|| missing("date"))?;
        let field = self.price_field.as_str();
        let value = find(field).ok_or_else(|| missing(field))?;
        let range = find("high").zip(find("low"));
        Ok(Columns {
            timestamp,
            value,
            range,
        })
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("bad number '{raw}': {e}"))
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("bad timestamp '{raw}'"))
}

impl PriceSource for CsvDirSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn known_symbols(&self) -> Result<Vec<String>, SourceError> {
        let mut symbols: Vec<String> = self
            .csv_files()?
            .into_iter()
            .map(|(stem, _)| stem.to_ascii_uppercase())
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    fn open(
        &self,
        symbol: &str,
        begin: Option<NaiveDate>,
    ) -> Result<Box<dyn PriceStream>, SourceError> {
        let path = self.path_for(symbol)?;
        let points = self.read_points(symbol, &path)?;
        Ok(Box::new(VecStream::new(points, begin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn drain(stream: &mut Box<dyn PriceStream>) -> Vec<PricePoint> {
        let cancel = CancelToken::new();
        let mut out = Vec::new();
        while let Some(p) = stream.next_point(&cancel).unwrap() {
            out.push(p);
        }
        out
    }

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    #[test]
    fn reads_close_with_case_insensitive_headers() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "spy.csv",
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-02,100,105,99,104.5,1000\n\
             2024-01-03,104,106,101,102.25,1000\n",
        );
        let source = CsvDirSource::new(dir.path());
        let mut stream = source.open("SPY", None).unwrap();
        let points = drain(&mut stream);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, dec!(104.5));
        assert_eq!(points[1].range.map(|r| r.high), Some(dec!(106)));
        assert_eq!(
            points[1].timestamp.date_naive(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
        );
    }

    #[test]
    fn price_field_and_begin_date() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "QQQ.csv",
            "timestamp,adj_close\n\
             2024-01-02T14:30:00Z,10\n\
             2024-01-03 14:30:00,11\n\
             2024-01-04,12\n",
        );
        let source = CsvDirSource::new(dir.path()).with_price_field("ADJ_CLOSE");
        let mut stream = source.open("qqq", NaiveDate::from_ymd_opt(2024, 1, 3)).unwrap();
        let values: Vec<Decimal> = drain(&mut stream).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![dec!(11), dec!(12)]);
    }

    #[test]
    fn known_symbols_are_upper_cased_and_sorted() {
        let dir = TempDir::new().unwrap();
        write(&dir, "t.csv", "date,close\n");
        write(&dir, "IWR.csv", "date,close\n");
        write(&dir, "readme.md", "not data");
        let source = CsvDirSource::new(dir.path());
        assert_eq!(source.known_symbols().unwrap(), vec!["IWR", "T"]);
    }

    #[test]
    fn missing_symbol_and_columns() {
        let dir = TempDir::new().unwrap();
        write(&dir, "AAA.csv", "date,open\n2024-01-02,1\n");
        let source = CsvDirSource::new(dir.path());
        assert!(matches!(
            source.open("ZZZ", None),
            Err(SourceError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            source.open("AAA", None),
            Err(SourceError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn bad_rows_report_their_line() {
        let dir = TempDir::new().unwrap();
        write(&dir, "BAD.csv", "date,close\n2024-01-02,1\n2024-01-03,abc\n");
        let source = CsvDirSource::new(dir.path());
        let err = source.open("BAD", None).err().unwrap();
        assert!(matches!(err, SourceError::Malformed { line: 3, .. }));
    }
}
