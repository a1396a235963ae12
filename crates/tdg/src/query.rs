//! 🎯 Query options: which days, which accounts, which regions.
//!
//! The knobs a caller turns before a walk. Dates come in as the same strings the
//! partition layout uses (`YYYY`, `YYYY/MM`, `YYYY/MM/DD`), so what you type is what
//! we list. Accounts and regions come in three flavours each: "these ones", "all of
//! them (go look)", or "whatever the caller's identity says".

use serde::Deserialize;

/// 🎯 Everything a walk needs to know about WHAT to read.
///
/// 📐 If both a range (`start_date_path` + `end_date_path`) and `date_path` are set,
/// the range wins. Quietly. Don't lean on that beyond this sentence.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryOptions {
    /// 📅 `YYYY`, `YYYY/MM` or `YYYY/MM/DD`.
    pub date_path: String,
    /// 📅 Inclusive range start, `YYYY/MM/DD`.
    pub start_date_path: String,
    /// 📅 Inclusive range end, `YYYY/MM/DD`.
    pub end_date_path: String,
    pub accounts: Vec<String>,
    pub regions: Vec<String>,
    /// 🔭 Discover accounts by listing one level under the base prefix.
    pub all_accounts: bool,
    /// 🔭 Discover regions by listing one level under `<prefix>/<account>/CloudTrail/`.
    pub all_regions: bool,
    /// 🏷️ CloudTrail's "log file prefix", prepended to the base prefix when set.
    pub log_file_prefix: Option<String>,
}

impl QueryOptions {
    /// 📅 A query for exactly one date selector (day, month or year).
    pub fn for_date(date_path: impl Into<String>) -> Self {
        Self {
            date_path: date_path.into(),
            ..Self::default()
        }
    }

    /// 📅 A query for an inclusive range of days.
    pub fn for_range(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start_date_path: start.into(),
            end_date_path: end.into(),
            ..Self::default()
        }
    }

    pub(crate) fn has_range(&self) -> bool {
        !self.start_date_path.is_empty() && !self.end_date_path.is_empty()
    }
}
