use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PolicyConfig;
use crate::state::{DetectionCell, DetectionSnapshot};

/// Anything that scores a compressed frame as a fire probability.
pub trait Classifier {
    fn predict(&mut self, jpeg: &[u8]) -> f32;
}

impl<F: FnMut(&[u8]) -> f32> Classifier for F {
    fn predict(&mut self, jpeg: &[u8]) -> f32 {
        self(jpeg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Decimated away; shared state untouched.
    Skipped { index: u64 },
    Classified {
        index: u64,
        snapshot: DetectionSnapshot,
    },
}

impl FrameOutcome {
    pub fn index(&self) -> u64 {
        match *self {
            Self::Skipped { index } | Self::Classified { index, .. } => index,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Classified { .. })
    }
}

/// Frame decimation plus the fire threshold.
#[derive(Debug)]
pub struct SamplingPolicy {
    decimation: u64,
    threshold: f32,
    counter: AtomicU64,
}

impl SamplingPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            decimation: config.decimation.max(1),
            threshold: config.threshold,
            counter: AtomicU64::new(0),
        }
    }

    pub fn decimation(&self) -> u64 {
        self.decimation
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Frames seen so far.
    pub fn frames(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Counts one frame. Returns its index and whether it is due for
    /// classification (every `decimation`-th frame, starting with the first).
    pub fn admit(&self) -> (u64, bool) {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let due = index.is_multiple_of(self.decimation);
        if !due {
            tracing::trace!(index, "frame skipped");
        }
        (index, due)
    }

    /// Applies the threshold to `score` and overwrites `cell` with the result
    /// for frame `index`.
    pub fn record(&self, cell: &DetectionCell, index: u64, score: f32) -> FrameOutcome {
        let snapshot = DetectionSnapshot {
            fire: score > self.threshold,
            score,
        };
        cell.publish(snapshot);
        if snapshot.fire {
            tracing::warn!(index, score, "fire detected");
        } else {
            tracing::debug!(index, score, "frame classified");
        }
        FrameOutcome::Classified { index, snapshot }
    }

    /// Counts one frame and, when it is due, runs `classify` and records the
    /// result.
    pub fn on_frame(&self, cell: &DetectionCell, classify: impl FnOnce() -> f32) -> FrameOutcome {
        match self.admit() {
            (index, false) => FrameOutcome::Skipped { index },
            (index, true) => self.record(cell, index, classify()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameOutcome, SamplingPolicy};
    use crate::config::PolicyConfig;
    use crate::state::{DetectionCell, DetectionSnapshot};

    #[test]
    fn classifies_every_third_frame() {
        let policy = SamplingPolicy::new(PolicyConfig::default());
        let cell = DetectionCell::new();
        let mut calls = Vec::new();
        for frame in 0..12u64 {
            let before = cell.read();
            let outcome = policy.on_frame(&cell, || {
                calls.push(frame);
                0.5 + frame as f32 / 100.0
            });
            assert_eq!(outcome.index(), frame);
            if !outcome.is_classified() {
                assert_eq!(cell.read(), before, "frame {frame} changed state");
            }
        }
        assert_eq!(calls, vec![0, 3, 6, 9]);
        assert_eq!(policy.frames(), 12);
    }

    #[test]
    fn admit_marks_decimated_frames() {
        let policy = SamplingPolicy::new(PolicyConfig {
            decimation: 2,
            ..PolicyConfig::default()
        });
        let admitted: Vec<_> = (0..5).map(|_| policy.admit()).collect();
        assert_eq!(
            admitted,
            vec![(0, true), (1, false), (2, true), (3, false), (4, true)]
        );
    }

    #[test]
    fn fire_flag_follows_latest_score() {
        let policy = SamplingPolicy::new(PolicyConfig {
            decimation: 1,
            ..PolicyConfig::default()
        });
        let cell = DetectionCell::new();

        policy.on_frame(&cell, || 0.85);
        assert_eq!(
            cell.read(),
            DetectionSnapshot {
                fire: true,
                score: 0.85
            }
        );
        policy.on_frame(&cell, || 0.10);
        assert_eq!(
            cell.read(),
            DetectionSnapshot {
                fire: false,
                score: 0.10
            }
        );
    }

    #[test]
    fn threshold_is_strict() {
        let policy = SamplingPolicy::new(PolicyConfig {
            decimation: 0,
            threshold: 0.6,
        });
        assert_eq!(policy.decimation(), 1);
        let cell = DetectionCell::new();
        let outcome = policy.on_frame(&cell, || 0.6);
        assert_eq!(
            outcome,
            FrameOutcome::Classified {
                index: 0,
                snapshot: DetectionSnapshot {
                    fire: false,
                    score: 0.6
                }
            }
        );
    }
}
