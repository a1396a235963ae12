//! 🧮 Tallies: what people actually do with a walk. Count things, add up bytes, print a table.
//!
//! 🧠 Knowledge graph:
//! - [`EventTally`] feeds on records (from `walk_events`): event class, source, region and
//!   recipient account.
//! - [`SizeTally`] feeds on object references (from `walk_objects`): bytes per region, per
//!   account, and in total. Account and region come from the key itself,
//!   `.../<account>/CloudTrail/<region>/...`.
//! - Both render as a borderless `comfy-table`, keys sorted, blank rows between sections.
//! - Neither locks anything. `walk_objects` calls its visitor concurrently, so a
//!   `SizeTally` shared with it goes behind a mutex.

use std::collections::BTreeMap;
use std::fmt;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use serde::Serialize;

use crate::backends::ObjectRef;
use crate::progress::format_bytes;
use crate::record::Record;

/// 🔢 Event counts by class, source, region and recipient account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventTally {
    pub management_events: u64,
    pub data_events: u64,
    pub by_source: BTreeMap<String, u64>,
    pub by_region: BTreeMap<String, u64>,
    pub by_account: BTreeMap<String, u64>,
}

impl EventTally {
    pub fn add(&mut self, record: &Record) {
        if record.management_event {
            self.management_events += 1;
        } else {
            self.data_events += 1;
        }
        *self.by_source.entry(record.event_source.clone()).or_default() += 1;
        *self.by_region.entry(record.aws_region.clone()).or_default() += 1;
        *self
            .by_account
            .entry(record.recipient_account_id.clone())
            .or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.management_events + self.data_events
    }

    pub fn to_table(&self) -> Table {
        let mut the_table = tally_table("Count");
        section(
            &mut the_table,
            "Event Type",
            [
                ("Management Event", self.management_events),
                ("Data Event", self.data_events),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        section(&mut the_table, "Event Source", counts(&self.by_source));
        section(&mut the_table, "Region", counts(&self.by_region));
        section(&mut the_table, "Recipient Account ID", counts(&self.by_account));
        the_table
    }
}

impl fmt::Display for EventTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_table())
    }
}

/// 📦 Bytes of trail logs per region, per account, and overall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SizeTally {
    pub total_bytes: u64,
    pub objects: u64,
    pub by_region: BTreeMap<String, u64>,
    pub by_account: BTreeMap<String, u64>,
    /// 🤷 Objects whose key does not look like a trail log. Counted in the total only.
    pub unattributed_objects: u64,
}

impl SizeTally {
    pub fn add(&mut self, object: &ObjectRef) {
        self.objects += 1;
        self.total_bytes += object.size;
        match account_and_region(&object.key) {
            Some((account, region)) => {
                *self.by_account.entry(account.to_string()).or_default() += object.size;
                *self.by_region.entry(region.to_string()).or_default() += object.size;
            }
            None => self.unattributed_objects += 1,
        }
    }

    pub fn to_table(&self) -> Table {
        let mut the_table = tally_table("Size");
        section(&mut the_table, "Region", sizes(&self.by_region));
        section(&mut the_table, "Account ID", sizes(&self.by_account));
        the_table.add_row(vec![
            Cell::new("Total"),
            Cell::new(""),
            Cell::new(human_size(self.total_bytes)).set_alignment(CellAlignment::Right),
        ]);
        the_table
    }
}

impl fmt::Display for SizeTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_table())
    }
}

/// 🔍 `AWSLogs/123456789012/CloudTrail/ap-northeast-1/2022/...` → `("123456789012", "ap-northeast-1")`.
pub fn account_and_region(key: &str) -> Option<(&str, &str)> {
    let (the_before, the_after) = key.split_once("/CloudTrail/")?;
    let the_account = the_before.rsplit('/').next()?;
    let (the_region, _) = the_after.split_once('/')?;
    let is_account = !the_account.is_empty() && the_account.bytes().all(|b| b.is_ascii_digit());
    (is_account && !the_region.is_empty()).then_some((the_account, the_region))
}

fn human_size(bytes: u64) -> String {
    format!("{} ({}B)", format_bytes(bytes), bytes)
}

fn counts(map: &BTreeMap<String, u64>) -> impl Iterator<Item = (String, String)> + '_ {
    map.iter().map(|(k, v)| (k.clone(), v.to_string()))
}

fn sizes(map: &BTreeMap<String, u64>) -> impl Iterator<Item = (String, String)> + '_ {
    map.iter().map(|(k, v)| (k.clone(), human_size(*v)))
}

fn tally_table(value_header: &str) -> Table {
    let mut the_table = Table::new();
    the_table.load_preset(NOTHING);
    the_table.set_content_arrangement(ContentArrangement::Dynamic);
    the_table.set_header(vec![
        Cell::new(""),
        Cell::new(""),
        Cell::new(value_header).set_alignment(CellAlignment::Right),
    ]);
    the_table
}

// 🍽️ One block of rows: the section name once, then `key:` / value pairs, then a blank row.
fn section(table: &mut Table, title: &str, rows: impl Iterator<Item = (String, String)>) {
    for (i, (key, value)) in rows.enumerate() {
        table.add_row(vec![
            Cell::new(if i == 0 { title } else { "" }),
            Cell::new(format!("{key}:")),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec!["", "", ""]);
}
