use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;

const MICROS_IN_SEC: f64 = 1_000_000.0;
const BYTE_UNITS: &[&str] = &["b", "kb", "mb", "gb", "tb", "pb", "eb"];

lazy_static! {
    static ref STATS: Stats = Stats::default();
}

#[derive(Debug, Default)]
pub struct Counter {
    bytes: AtomicU64,
    calls: AtomicU64,
    micros: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn inc_bytes(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::SeqCst);
    }

    #[inline]
    pub fn inc_time(&self, elapsed: &Duration) {
        let micros = elapsed.as_micros() as u64;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    #[inline]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    #[inline]
    pub fn micros(&self) -> u64 {
        self.micros.load(Ordering::Acquire)
    }

    #[inline]
    pub fn timer(&self) -> Timer<'_> {
        Timer(Instant::now(), self)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.calls() == 0 && self.bytes() == 0
    }
}

impl Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let secs = self.micros() as f64 / MICROS_IN_SEC;
        write!(f, "{} calls, took {:.2}s", self.calls(), secs)?;

        let num_bytes = self.bytes();
        if num_bytes > 0 {
            let per_sec = if secs > 0.0 {
                num_bytes as f64 / secs
            } else {
                num_bytes as f64
            };
            write!(f, ", {} ({}/s)", pretty_bytes(num_bytes as f64), pretty_bytes(per_sec))?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct Timer<'a>(Instant, &'a Counter);

impl<'a> Drop for Timer<'a> {
    #[inline]
    fn drop(&mut self) {
        let duration = self.0.elapsed();
        self.1.inc_time(&duration);
    }
}

/// Process-wide transfer counters, printed by the CLI on exit.
#[derive(Debug, Default)]
pub struct Stats {
    listing: Counter,
    upload: Counter,
    download: Counter,
}

impl Stats {
    #[inline]
    pub fn current() -> &'static Self {
        &STATS
    }

    #[inline]
    pub fn listing(&self) -> &Counter {
        &self.listing
    }

    #[inline]
    pub fn upload(&self) -> &Counter {
        &self.upload
    }

    #[inline]
    pub fn download(&self) -> &Counter {
        &self.download
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if !self.listing.is_empty() {
            write!(f, "listing: {}; ", self.listing)?;
        }

        if !self.upload.is_empty() {
            write!(f, "upload: {}; ", self.upload)?;
        }

        if !self.download.is_empty() {
            write!(f, "download: {}; ", self.download)?;
        }

        Ok(())
    }
}

fn pretty_bytes(num: f64) -> String {
    let mut num = num;
    let mut unit = 0;

    while num >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        num /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{}{}", num as u64, BYTE_UNITS[0])
    } else {
        format!("{:.2}{}", num, BYTE_UNITS[unit])
    }
}
