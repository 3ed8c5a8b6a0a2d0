use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::model::Ticker;

/// Latest-price table keyed by ticker id.
pub trait PriceStore {
    /// Every item whose id contains `prefix`, ordered by id.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Ticker>>;

    /// Upserts the ticker's price. Last write wins.
    fn put(&mut self, ticker: &Ticker) -> Result<()>;
}

fn scan(items: &BTreeMap<String, f64>, prefix: &str) -> Vec<Ticker> {
    items
        .iter()
        .filter(|(id, _)| id.contains(prefix))
        .map(|(id, price)| Ticker::new(id.clone(), *price))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, f64>,
    writes: usize,
}

impl MemoryStore {
    pub fn with_tickers(tickers: &[Ticker]) -> Self {
        Self {
            items: tickers.iter().map(|t| (t.id.clone(), t.price)).collect(),
            writes: 0,
        }
    }

    pub fn price(&self, id: &str) -> Option<f64> {
        self.items.get(id).copied()
    }

    /// Number of `put` calls since construction.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PriceStore for MemoryStore {
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Ticker>> {
        Ok(scan(&self.items, prefix))
    }

    fn put(&mut self, ticker: &Ticker) -> Result<()> {
        self.items.insert(ticker.id.clone(), ticker.price);
        self.writes += 1;
        Ok(())
    }
}

/// Table persisted as a JSON array of `{"TickerName", "Price"}` items.
///
/// Nothing is cached between calls: `scan_prefix` reads the file and every
/// `put` re-reads it, upserts one row, then writes it back through a sibling
/// temp file and a rename. Rows written through other handles survive, and
/// readers only ever observe a complete table.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Fails early when an existing table cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, f64>> {
        let path = &self.path;
        match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => {
                let rows: Vec<Ticker> = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse price table {:?}", path))?;
                Ok(rows.into_iter().map(|t| (t.id, t.price)).collect())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err).with_context(|| format!("failed to read price table {:?}", path)),
        }
    }

    fn flush(&self, items: &BTreeMap<String, f64>) -> Result<()> {
        let rows: Vec<Ticker> = items
            .iter()
            .map(|(id, price)| Ticker::new(id.clone(), *price))
            .collect();
        let payload = serde_json::to_vec_pretty(&rows).context("serialize price table")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {:?}", parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).with_context(|| format!("failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace price table {:?}", self.path))?;
        Ok(())
    }
}

impl PriceStore for JsonFileStore {
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Ticker>> {
        Ok(scan(&self.load()?, prefix))
    }

    fn put(&mut self, ticker: &Ticker) -> Result<()> {
        let mut items = self.load()?;
        items.insert(ticker.id.clone(), ticker.price);
        self.flush(&items)
    }
}
