//! Runtime settings and the persisted notification-number counter.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::persist::integrity::IntegrityThresholds;
use crate::transplant::numbering::NumberingRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Issuing authority substituted into transplanted text.
    pub authority_name: String,
    /// Filename keyword identifying the notification template.
    pub template_keyword: String,
    /// Directory searched for the template before the working directory.
    pub template_dir: PathBuf,
    pub keep_backups: usize,
    pub counter_file: PathBuf,
    pub rules: NumberingRules,
    pub save_thresholds: IntegrityThresholds,
    pub fallback_save_thresholds: IntegrityThresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authority_name: "鄞州区网信办".to_string(),
            template_keyword: "通报模板".to_string(),
            template_dir: PathBuf::from("Report_Template"),
            keep_backups: 2,
            counter_file: PathBuf::from("report_counters.json"),
            rules: NumberingRules::default(),
            save_thresholds: IntegrityThresholds::NORMAL,
            fallback_save_thresholds: IntegrityThresholds::FALLBACK,
        }
    }
}

impl Settings {
    /// Loads TOML settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }
}

/// Notification-number sequence, reset each calendar year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportCounters {
    pub year: i32,
    pub next_number: u32,
}

/// JSON-file backed counter. The file is re-read before every write so two
/// sequential runs never hand out the same number.
#[derive(Debug, Clone)]
pub struct CounterStore {
    path: PathBuf,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Option<ReportCounters> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(counters) => Some(counters),
            Err(err) => {
                log::warn!("counter file {} is corrupt: {err}", self.path.display());
                None
            }
        }
    }

    /// The number the next notification of `year` should carry. A new year
    /// restarts the sequence at 1.
    pub fn peek(&self, year: i32) -> u32 {
        match self.read() {
            Some(c) if c.year == year => c.next_number,
            _ => 1,
        }
    }

    /// Records that `number` was used for `year`. Re-reads the file first so
    /// a concurrent bump is never rolled back.
    pub fn commit(&self, year: i32, number: u32) -> Result<()> {
        let current = self.read();
        let next_number = match current {
            Some(c) if c.year == year => c.next_number.max(number + 1),
            _ => number + 1,
        };
        let counters = ReportCounters { year, next_number };

        let json = serde_json::to_string_pretty(&counters)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp counter file in {}", dir.display()))?;
        std::io::Write::write_all(&mut temp, json.as_bytes())?;
        temp.persist(&self.path)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}
