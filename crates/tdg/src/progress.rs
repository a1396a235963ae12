//! 📊 progress.rs: "Are we there yet?" Every walk, every time, forever.
//!
//! 🚀 A spinner on stderr that says which day is being dug up, how many objects have been
//! visited and how many bytes came down the pipe. Hidden unless asked for, so tests and
//! pipes stay quiet.
//!
//! ⚠️ Watching this spinner will not make S3 go faster. We've tried. Science says no.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::dates::Day;

const KIB: f64 = 1024.0;
const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// 📦 Bytes for humans: `512B`, `1.50KiB`, `3.25GiB`. Binary units, because pedants.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut the_value = bytes as f64 / KIB;
    let mut the_unit = 0;
    while the_value >= KIB && the_unit < UNITS.len() - 1 {
        the_value /= KIB;
        the_unit += 1;
    }
    format!("{:.2}{}", the_value, UNITS[the_unit])
}

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// 📊 Counters and a spinner. Shared by every scan unit of a walk, hence the atomics.
pub(crate) struct ScanProgress {
    spinner: ProgressBar,
    objects: AtomicU64,
    bytes: AtomicU64,
    records: AtomicU64,
}

impl std::fmt::Debug for ScanProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ScanProgress")
            .field("objects", &self.objects.load(Ordering::Relaxed))
            .field("bytes", &self.bytes.load(Ordering::Relaxed))
            .finish()
    }
}

impl ScanProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        let spinner = if enabled {
            let the_spinner = ProgressBar::new_spinner();
            the_spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} [{elapsed}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            the_spinner.enable_steady_tick(Duration::from_millis(120));
            the_spinner
        } else {
            ProgressBar::hidden()
        };
        Self {
            spinner,
            objects: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            records: AtomicU64::new(0),
        }
    }

    pub(crate) fn start_day(&self, day: Day, prefixes: usize) {
        self.spinner.set_prefix(day.path());
        self.spinner
            .set_message(format!("🔦 digging {day} across {prefixes} partitions"));
    }

    pub(crate) fn object_visited(&self, bytes: u64) {
        let the_objects = self.objects.fetch_add(1, Ordering::Relaxed) + 1;
        let the_bytes = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.spinner.set_message(format!(
            "🔦 {} · {} objects · {}",
            self.spinner.prefix(),
            format_number(the_objects),
            format_bytes(the_bytes)
        ));
    }

    pub(crate) fn records_emitted(&self, count: u64) {
        self.records.fetch_add(count, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_with_message(format!(
            "✅ {} objects · {} · {} records",
            format_number(self.objects.load(Ordering::Relaxed)),
            format_bytes(self.bytes.load(Ordering::Relaxed)),
            format_number(self.records.load(Ordering::Relaxed))
        ));
    }
}
