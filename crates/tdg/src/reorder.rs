//! 🔀 The Chronological Reorder Buffer: where records scattered across a hundred unordered
//! objects wait in line until it is safe to hand them out in time order.
//!
//! 🎬 *[a record timestamped 23:59:59 on the 28th arrives... inside the 1st of March's partition]*
//! *[it is not lost. it is merely early for a party that hasn't been drained yet.]*
//!
//! 🧠 Knowledge graph:
//! - One [`DayBuffer`] per calendar day in flight. Records go to the buffer of the day their
//!   OWN timestamp falls on, not the day of the partition they were found in.
//! - Day D-1 is drained only after day D's partitions are fully scanned (one-day lookahead).
//! - Keys are `(seconds, xxh3(eventID))`. Distinct events that share a key are all kept, in
//!   event-id order. The same event delivered twice is stored once.
//! - Records outside the requested window are discarded. Records for a day that has already
//!   been drained are late; they cannot be emitted in order, so they are discarded too and
//!   the caller gets told.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::dates::Day;
use crate::record::{OrderingKey, Record};

/// 📅 The ordered records of one day, awaiting drain.
#[derive(Debug, Default)]
pub struct DayBuffer {
    entries: BTreeMap<OrderingKey, Vec<Record>>,
    len: usize,
}

impl DayBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 📥 Store a record. Returns `false` if it replaced an identical event already stored.
    pub fn insert(&mut self, record: Record) -> bool {
        self.insert_keyed(record.ordering_key(), record)
    }

    pub(crate) fn insert_keyed(&mut self, key: OrderingKey, record: Record) -> bool {
        let the_slot = self.entries.entry(key).or_default();
        match the_slot.binary_search_by(|r| r.event_id.cmp(&record.event_id)) {
            Ok(i) => {
                the_slot[i] = record;
                false
            }
            Err(i) => {
                the_slot.insert(i, record);
                self.len += 1;
                true
            }
        }
    }

    /// 🚰 Drain: every record, ascending key order, ties in event-id order.
    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.entries.into_values().flatten()
    }
}

/// 🏷️ What happened to a record handed to [`ReorderBuffer::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Buffered,
    /// 🔁 Same key, same event id: the stored copy was replaced.
    Duplicate,
    OutOfWindow,
    /// ⏰ Its day was already drained.
    Late,
}

/// 🔀 All day buffers of one walk, plus the requested window.
#[derive(Debug)]
pub struct ReorderBuffer {
    first: NaiveDate,
    last: NaiveDate,
    days: BTreeMap<NaiveDate, DayBuffer>,
    drained_through: Option<NaiveDate>,
}

impl ReorderBuffer {
    /// 🏗️ `first..=last` is the requested window; the trailing day is NOT part of it.
    pub fn new(first: Day, last: Day) -> Self {
        Self {
            first: first.date(),
            last: last.date(),
            days: BTreeMap::new(),
            drained_through: None,
        }
    }

    /// 📂 Make sure `day` has a buffer before its partitions are scanned.
    pub fn open_day(&mut self, day: Day) {
        if self.drained_through.is_none_or(|d| day.date() > d) {
            self.days.entry(day.date()).or_default();
        }
    }

    /// 📥 File a record under the day its timestamp belongs to.
    pub fn place(&mut self, record: Record) -> Placement {
        let the_day = record.event_day();
        if the_day < self.first || the_day > self.last {
            return Placement::OutOfWindow;
        }
        if self.drained_through.is_some_and(|d| the_day <= d) {
            return Placement::Late;
        }
        if self.days.entry(the_day).or_default().insert(record) {
            Placement::Buffered
        } else {
            Placement::Duplicate
        }
    }

    /// 🚰 Hand over `day`'s buffer for draining. From now on, records for `day` (or earlier)
    /// are late. Returns `None` if no buffer was ever opened for it.
    pub fn take_day(&mut self, day: Day) -> Option<DayBuffer> {
        let the_day = day.date();
        self.drained_through = Some(self.drained_through.map_or(the_day, |d| d.max(the_day)));
        self.days.remove(&the_day)
    }

    /// 🔢 Day buffers currently alive.
    pub fn live_days(&self) -> usize {
        self.days.len()
    }
}
