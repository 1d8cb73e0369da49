//! Progress throttling.
//!
//! Decides which chunk writes are worth reporting so fast links do not flood
//! the consumer with events.

pub const DEFAULT_UNKNOWN_SIZE_STEP: u64 = 1024 * 1024;

/// What was last reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emitted {
    pub bytes: u64,
    pub percent: u8,
}

/// Whole percent of `downloaded` over `total`, capped at 100.
pub fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = u128::from(downloaded) * 100 / u128::from(total);
    pct.min(100) as u8
}

/// Emission predicate.
///
/// With a known total, report every whole-percent advance and the chunk that
/// completes the transfer. Without one, report every `unknown_step` bytes and
/// any short read.
pub fn should_emit(
    last: Emitted,
    downloaded: u64,
    total: Option<u64>,
    short_read: bool,
    unknown_step: u64,
) -> bool {
    match total {
        Some(total) => {
            downloaded == total || percent_of(downloaded, total) > last.percent
        }
        None => short_read || downloaded.saturating_sub(last.bytes) >= unknown_step,
    }
}

/// Stateful wrapper around [`should_emit`] for one transfer.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last: Emitted,
    total: Option<u64>,
    unknown_step: u64,
}

impl ProgressThrottle {
    pub fn new(total: Option<u64>, unknown_step: u64) -> Self {
        Self {
            last: Emitted::default(),
            total,
            unknown_step,
        }
    }

    /// Record `downloaded` as reported if it passes the predicate.
    pub fn should_emit(&mut self, downloaded: u64, short_read: bool) -> bool {
        if !should_emit(self.last, downloaded, self.total, short_read, self.unknown_step) {
            return false;
        }
        self.last = Emitted {
            bytes: downloaded,
            percent: self.total.map_or(0, |t| percent_of(downloaded, t)),
        };
        true
    }
}
