/// Alignment statistics shared across worker threads
use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

use crate::classify::{MatchClass, MatchCoverage, Occurrence};

/// Counters for an alignment run. All updates are relaxed atomic adds so one
/// collector can be shared by every query thread.
#[derive(Debug, Default)]
pub struct MatchMetrics {
    /// Queries seen
    pub queries: AtomicU64,
    /// Queries with at least one record
    pub aligned: AtomicU64,
    /// Queries rejected before chaining (too short or homopolymer)
    pub rejected: AtomicU64,
    /// Rejected queries longer than the aligner accepts
    pub oversized: AtomicU64,
    /// Queries resolved by a verified perfect chain
    pub perfect: AtomicU64,
    /// Queries resolved by split assembly
    pub split: AtomicU64,
    /// Smith-Waterman alignments computed
    pub sw_runs: AtomicU64,
    /// Records written
    pub records: AtomicU64,
    classes: [[AtomicU64; 3]; 6],
}

impl MatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_query(&self, n_records: usize) {
        Self::bump(&self.queries, 1);
        if n_records > 0 {
            Self::bump(&self.aligned, 1);
        }
        Self::bump(&self.records, n_records as u64);
    }

    pub fn record_rejected(&self) {
        Self::bump(&self.rejected, 1);
    }

    pub fn record_oversized(&self) {
        Self::bump(&self.oversized, 1);
    }

    pub fn record_perfect(&self) {
        Self::bump(&self.perfect, 1);
    }

    pub fn record_split(&self) {
        Self::bump(&self.split, 1);
    }

    pub fn record_sw_runs(&self, n: usize) {
        Self::bump(&self.sw_runs, n as u64);
    }

    pub fn record_class(&self, class: MatchClass) {
        Self::bump(
            &self.classes[class.coverage.index()][class.occurrence.index()],
            1,
        );
    }

    /// Queries counted under `class`.
    pub fn class_count(&self, class: MatchClass) -> u64 {
        self.classes[class.coverage.index()][class.occurrence.index()].load(Ordering::Relaxed)
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn aligned_percent(&self) -> f64 {
        let total = Self::get(&self.queries);
        if total == 0 {
            0.0
        } else {
            100.0 * Self::get(&self.aligned) as f64 / total as f64
        }
    }

    /// Print summary statistics to log
    pub fn print_summary(&self) {
        let total = Self::get(&self.queries);
        if total == 0 {
            info!("No queries processed");
            return;
        }

        info!("=== Alignment Summary ===");
        info!("Number of input queries: {}", total);
        info!(
            "Aligned queries: {} ({:.2}%)",
            Self::get(&self.aligned),
            self.aligned_percent()
        );
        info!("Rejected queries: {}", Self::get(&self.rejected));
        info!("  of which too long: {}", Self::get(&self.oversized));
        info!("Perfect-match fast path: {}", Self::get(&self.perfect));
        info!("Split assemblies: {}", Self::get(&self.split));
        info!("Smith-Waterman alignments: {}", Self::get(&self.sw_runs));
        info!("Records written: {}", Self::get(&self.records));

        for coverage in MatchCoverage::ALL {
            for occurrence in Occurrence::ALL {
                let class = MatchClass {
                    coverage,
                    occurrence,
                };
                let n = self.class_count(class);
                if n > 0 {
                    info!("Match class {}: {}", class, n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let m = MatchMetrics::new();
        assert_eq!(m.queries.load(Ordering::Relaxed), 0);
        assert_eq!(m.aligned_percent(), 0.0);
    }

    #[test]
    fn test_record_queries() {
        let m = MatchMetrics::new();
        m.record_query(2);
        m.record_query(0);
        m.record_query(1);
        assert_eq!(m.queries.load(Ordering::Relaxed), 3);
        assert_eq!(m.aligned.load(Ordering::Relaxed), 2);
        assert_eq!(m.records.load(Ordering::Relaxed), 3);
        assert!((m.aligned_percent() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_class_counters() {
        let m = MatchMetrics::new();
        let class = MatchClass {
            coverage: MatchCoverage::SecondQuartile,
            occurrence: Occurrence::Low,
        };
        m.record_class(class);
        m.record_class(class);
        assert_eq!(m.class_count(class), 2);
        assert_eq!(
            m.class_count(MatchClass {
                coverage: MatchCoverage::PerfectMatch,
                occurrence: Occurrence::Low,
            }),
            0
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let m = MatchMetrics::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        m.record_query(1);
                        m.record_sw_runs(2);
                    }
                });
            }
        });
        assert_eq!(m.queries.load(Ordering::Relaxed), 4000);
        assert_eq!(m.sw_runs.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn test_empty_summary() {
        let m = MatchMetrics::new();
        m.print_summary();
    }
}
