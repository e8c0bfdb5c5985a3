//! Fixed deployment parameters.
//!
//! The firmware consumes these once at construction; the structs only exist
//! so a host harness can override them from a JSON file.

use serde::{Deserialize, Serialize};

pub const SOURCE_WIDTH: usize = 320;
pub const SOURCE_HEIGHT: usize = 240;
pub const TENSOR_WIDTH: usize = 96;
pub const TENSOR_HEIGHT: usize = 96;
pub const TENSOR_CHANNELS: usize = 3;
pub const ARENA_SIZE: usize = 250 * 1024;
/// Aggressive correction tuned for low-light sensor output.
pub const GAMMA: f32 = 12.0;
pub const FIRE_THRESHOLD: f32 = 0.60;
pub const DECIMATION: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub source_width: usize,
    pub source_height: usize,
    pub tensor_width: usize,
    pub tensor_height: usize,
    pub arena_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_width: SOURCE_WIDTH,
            source_height: SOURCE_HEIGHT,
            tensor_width: TENSOR_WIDTH,
            tensor_height: TENSOR_HEIGHT,
            arena_size: ARENA_SIZE,
        }
    }
}

impl EngineConfig {
    /// Shape the model input must have: `[1, height, width, 3]`.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.tensor_height, self.tensor_width, TENSOR_CHANNELS]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Classify every Nth frame; 0 is treated as 1.
    pub decimation: u64,
    /// Scores strictly above this raise the fire flag.
    pub threshold: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            decimation: DECIMATION,
            threshold: FIRE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub gamma: f32,
    pub engine: EngineConfig,
    pub policy: PolicyConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            gamma: GAMMA,
            engine: EngineConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}
