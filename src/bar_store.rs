use crate::models::Bar;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const BAR_SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct BarSnapshot {
    version: u32,
    commodity: String,
    bars: Vec<Bar>,
}

/// Ordered history of daily bars for one commodity.
///
/// The store is append-only: a bar written for a date that already has one
/// supersedes the earlier revision, and exactly one canonical bar per
/// trading date is exposed to readers. The revision counter increments on
/// every append so long-running consumers (the optimizer) can detect that
/// the history they snapshotted has been superseded.
#[derive(Debug, Clone)]
pub struct BarStore {
    commodity: String,
    revisions: Vec<Bar>,
    canonical: BTreeMap<NaiveDate, usize>,
    revision: u64,
}

impl BarStore {
    pub fn new(commodity: impl Into<String>) -> Self {
        Self {
            commodity: commodity.into(),
            revisions: Vec::new(),
            canonical: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn from_bars(commodity: impl Into<String>, bars: Vec<Bar>) -> Self {
        let mut store = Self::new(commodity);
        for bar in bars {
            store.insert(bar);
        }
        store
    }

    pub fn commodity(&self) -> &str {
        &self.commodity
    }

    /// Appends a bar. A bar for an existing date becomes the new canonical
    /// revision for that date; the previous revision stays in the log.
    pub fn insert(&mut self, bar: Bar) {
        let date = bar.date;
        self.revisions.push(bar);
        self.canonical.insert(date, self.revisions.len() - 1);
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Bar> {
        self.canonical.get(&date).map(|&idx| &self.revisions[idx])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.canonical.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.canonical.keys().next_back().copied()
    }

    /// All canonical trading dates in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.canonical.keys().copied().collect()
    }

    /// Canonical bars with date <= `date`, ascending. This is the trailing
    /// window every calculator reads from.
    pub fn bars_through(&self, date: NaiveDate) -> Vec<&Bar> {
        self.canonical
            .range(..=date)
            .map(|(_, &idx)| &self.revisions[idx])
            .collect()
    }

    /// Canonical bars within `[from, to]`, ascending. At most one bar per
    /// date, never a future-dated bar relative to `to`.
    pub fn bars_in(&self, from: NaiveDate, to: NaiveDate) -> Vec<&Bar> {
        self.canonical
            .range(from..=to)
            .map(|(_, &idx)| &self.revisions[idx])
            .collect()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create bar snapshot at {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let snapshot = BarSnapshot {
            version: BAR_SNAPSHOT_VERSION,
            commodity: self.commodity.clone(),
            bars: self
                .canonical
                .values()
                .map(|&idx| self.revisions[idx].clone())
                .collect(),
        };

        bincode::serialize_into(&mut writer, &snapshot).context("Bar snapshot encode failed")?;
        writer.flush().context("Bar snapshot flush failed")?;
        info!(
            "Wrote {} bars for {} to {}",
            snapshot.bars.len(),
            snapshot.commodity,
            path.display()
        );
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open bar snapshot at {}", path.display()))?;
        let reader = BufReader::new(file);
        let snapshot: BarSnapshot =
            bincode::deserialize_from(reader).context("Bar snapshot decode failed")?;

        if snapshot.version != BAR_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Bar snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                BAR_SNAPSHOT_VERSION
            ));
        }

        info!(
            "Loaded {} bars for {} from {}",
            snapshot.bars.len(),
            snapshot.commodity,
            path.display()
        );
        Ok(Self::from_bars(snapshot.commodity, snapshot.bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> Bar {
        Bar {
            date: date.parse().unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
            open_interest: 5_000,
            implied_volatility: None,
            net_commercial_position: None,
        }
    }

    #[test]
    fn correction_supersedes_without_losing_history() {
        let mut store = BarStore::new("CC");
        store.insert(bar("2024-03-04", 100.0));
        store.insert(bar("2024-03-05", 101.0));
        let before = store.revision();

        store.insert(bar("2024-03-04", 99.5));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("2024-03-04".parse().unwrap()).unwrap().close, 99.5);
        assert!(store.revision() > before);
    }

    #[test]
    fn trailing_window_is_ordered_and_bounded() {
        let mut store = BarStore::new("CC");
        store.insert(bar("2024-03-06", 102.0));
        store.insert(bar("2024-03-04", 100.0));
        store.insert(bar("2024-03-05", 101.0));

        let window = store.bars_through("2024-03-05".parse().unwrap());
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![100.0, 101.0]);
    }
}
