//! JSON file store.
//!
//! Layout: `{dir}/{SYMBOL}_{box}{%}X{rev}_{scale}[_eod].json`
//!
//! Writes are atomic (write to .tmp, rename into place). Charts of distinct
//! params land on distinct paths, so no cross-thread coordination is needed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{sort_params, ChartDocument, ChartStore, StoreError};
use crate::chart::{chart_file_name, Chart};
use crate::domain::{ChartParams, Interval};

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `params` at `interval`.
    pub fn path_for(&self, params: &ChartParams, interval: Interval) -> PathBuf {
        self.dir.join(chart_file_name(params, interval, "json"))
    }

    fn read_document(path: &Path) -> Result<ChartDocument, StoreError> {
        let json = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        ChartDocument::from_json(&json)
    }
}

impl ChartStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    fn save(&self, chart: &Chart, interval: Interval) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let path = self.path_for(chart.params(), interval);
        let tmp_path = path.with_extension("json.tmp");
        let json = ChartDocument::from_chart(chart, interval).to_json()?;

        fs::write(&tmp_path, json).map_err(|e| StoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::io(&path, e)
        })?;
        Ok(())
    }

    fn load(&self, params: &ChartParams, interval: Interval) -> Result<Option<Chart>, StoreError> {
        let path = self.path_for(params, interval);
        if !path.exists() {
            return Ok(None);
        }
        let doc = Self::read_document(&path)?;
        // ATR and fixed scales share a file name; the document decides.
        if doc.params != *params || doc.interval != interval {
            return Err(StoreError::ParamsMismatch {
                expected: format!("{params} {interval}"),
                found: format!("{} {}", doc.params, doc.interval),
            });
        }
        doc.into_chart().map(Some)
    }

    fn list(&self, interval: Interval) -> Result<Vec<ChartParams>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let mut params = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path) {
                Ok(doc) if doc.interval == interval => params.push(doc.params),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable chart document"),
            }
        }
        sort_params(&mut params);
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoxScale;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn chart(symbol: &str, scale: BoxScale) -> Chart {
        let params = ChartParams::new(symbol, dec!(10), 3, scale).unwrap();
        let mut chart = Chart::with_atr_period(params, 2);
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for (i, v) in [dec!(100), dec!(131), dec!(92)].iter().enumerate() {
            chart.ingest(*v, base + Duration::days(i as i64)).unwrap();
        }
        chart
    }

    #[test]
    fn save_then_load_returns_equal_chart() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let original = chart("SPY", BoxScale::Linear);

        store.save(&original, Interval::Eod).unwrap();
        assert!(dir.path().join("SPY_10X3_linear_eod.json").exists());
        assert!(!dir.path().join("SPY_10X3_linear_eod.json.tmp").exists());

        let loaded = store.load(original.params(), Interval::Eod).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.last_box_index(), original.last_box_index());
        assert_eq!(loaded.direction(), original.direction());
    }

    #[test]
    fn missing_chart_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("not-yet"));
        let params = ChartParams::new("SPY", dec!(1), 1, BoxScale::Linear).unwrap();
        assert!(store.load(&params, Interval::Eod).unwrap().is_none());
        assert!(store.list(Interval::Eod).unwrap().is_empty());
    }

    #[test]
    fn save_overwrites_previous_version() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut c = chart("SPY", BoxScale::Linear);
        store.save(&c, Interval::Eod).unwrap();
        c.ingest(dec!(150), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
            .unwrap();
        store.save(&c, Interval::Eod).unwrap();
        let loaded = store.load(c.params(), Interval::Eod).unwrap().unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn scale_mismatch_on_shared_name_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let atr = chart("SPY", BoxScale::AtrLinear);
        store.save(&atr, Interval::Eod).unwrap();

        let fixed = ChartParams::new("SPY", dec!(10), 3, BoxScale::Linear).unwrap();
        let err = store.load(&fixed, Interval::Eod).unwrap_err();
        assert!(matches!(err, StoreError::ParamsMismatch { .. }));
    }

    #[test]
    fn list_filters_by_interval_and_sorts() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save(&chart("QQQ", BoxScale::Linear), Interval::Eod).unwrap();
        store.save(&chart("IWM", BoxScale::Linear), Interval::Eod).unwrap();
        store.save(&chart("SPY", BoxScale::Linear), Interval::Live).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let eod: Vec<String> = store
            .list(Interval::Eod)
            .unwrap()
            .iter()
            .map(|p| p.symbol().to_string())
            .collect();
        assert_eq!(eod, vec!["IWM", "QQQ"]);

        let live = store.list(Interval::Live).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].symbol(), "SPY");
    }
}
