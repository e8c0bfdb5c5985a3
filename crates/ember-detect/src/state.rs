use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionSnapshot {
    pub fire: bool,
    pub score: f32,
}

const FIRE_BIT: u64 = 1 << 32;

impl DetectionSnapshot {
    fn pack(self) -> u64 {
        let fire = if self.fire { FIRE_BIT } else { 0 };
        fire | self.score.to_bits() as u64
    }

    fn unpack(word: u64) -> Self {
        Self {
            fire: word & FIRE_BIT != 0,
            score: f32::from_bits(word as u32),
        }
    }
}

/// Latest detection result, shared between the classifying task and any
/// number of readers.
///
/// Both fields live in one atomic word, so a reader sees either the previous
/// or the new snapshot, never a mix.
#[derive(Debug)]
pub struct DetectionCell {
    word: AtomicU64,
}

impl Default for DetectionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionCell {
    /// Starts at `{fire: false, score: 0.0}`.
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(DetectionSnapshot::default().pack()),
        }
    }

    pub fn publish(&self, snapshot: DetectionSnapshot) {
        self.word.store(snapshot.pack(), Ordering::Release);
    }

    pub fn read(&self) -> DetectionSnapshot {
        DetectionSnapshot::unpack(self.word.load(Ordering::Acquire))
    }
}
