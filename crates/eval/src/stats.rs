//! Time accounting for one run.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub compiling: Duration,
    pub decoding: Duration,
    pub executing: Duration,
    pub total: Duration,
    /// Evaluation passes run, ticks included
    pub passes: u64,
}

impl Stats {
    /// Run `f`, adding its wall time to `slot`.
    pub fn timed<T>(slot: &mut Duration, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        *slot += start.elapsed();
        out
    }

    pub fn log(&self) {
        tracing::info!(
            compiling = ?self.compiling,
            decoding = ?self.decoding,
            executing = ?self.executing,
            total = ?self.total,
            passes = self.passes,
            "stats"
        );
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Compiling: {:?}, Decoding: {:?}, Executing: {:?}, Total: {:?}",
            self.compiling, self.decoding, self.executing, self.total
        )
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_accumulates() {
        let mut stats = Stats::default();
        let v = Stats::timed(&mut stats.executing, || 41 + 1);
        assert_eq!(v, 42);
        let before = stats.executing;
        Stats::timed(&mut stats.executing, || std::thread::sleep(Duration::from_millis(2)));
        assert!(stats.executing >= before + Duration::from_millis(2));
        assert!(stats.to_string().starts_with("Compiling: 0ns"));
    }
}
