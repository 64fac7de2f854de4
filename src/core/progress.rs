//! Byte progress of a transfer

use serde::{Deserialize, Serialize};

/// Rounded integer percentage of `loaded` over `total`
///
/// A zero total counts as done. The result never exceeds 100.
pub fn percentage(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (loaded as f64 * 100.0 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Snapshot of transferred bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
    pub percentage: u8,
}

impl Progress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self {
            loaded,
            total,
            percentage: percentage(loaded, total),
        }
    }

    /// Nothing transferred yet, 0% even for a zero total
    pub fn pending(total: u64) -> Self {
        Self {
            loaded: 0,
            total,
            percentage: 0,
        }
    }

    /// Update both counters and recompute the percentage
    pub fn set(&mut self, loaded: u64, total: u64) {
        *self = Self::new(loaded, total);
    }

    pub fn is_complete(&self) -> bool {
        self.percentage == 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 200), 1);
        assert_eq!(percentage(60, 60), 100);
    }

    #[test]
    fn test_zero_total_is_complete() {
        assert_eq!(percentage(0, 0), 100);
        assert!(Progress::new(0, 0).is_complete());
        assert!(!Progress::pending(0).is_complete());
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(percentage(150, 100), 100);
    }

    #[test]
    fn test_set_recomputes() {
        let mut progress = Progress::pending(60);
        progress.set(10, 60);
        assert_eq!(progress.percentage, 17);
        assert_eq!(progress.loaded, 10);
    }
}
