/// Exponent used when a non-positive or non-finite gamma is configured.
pub const DEFAULT_GAMMA_FLOOR: f32 = 0.1;

/// 256-entry gamma lookup: `table[v] = trunc((v / 255)^gamma * 255)`.
///
/// Built once at boot and shared read-only by every preprocessing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaTable {
    lut: [u8; 256],
}

impl GammaTable {
    pub fn new(gamma: f32) -> Self {
        let gamma = if gamma.is_finite() && gamma > 0.0 {
            gamma
        } else {
            DEFAULT_GAMMA_FLOOR
        };

        let mut lut = [0u8; 256];
        for (i, out) in lut.iter_mut().enumerate() {
            let norm = i as f32 / 255.0;
            let res = norm.powf(gamma) * 255.0;
            *out = res.clamp(0.0, 255.0) as u8;
        }
        Self { lut }
    }

    /// Identity mapping, useful when a model was trained on raw sensor output.
    pub fn identity() -> Self {
        let mut lut = [0u8; 256];
        for (i, out) in lut.iter_mut().enumerate() {
            *out = i as u8;
        }
        Self { lut }
    }

    #[inline(always)]
    pub fn apply(&self, v: u8) -> u8 {
        self.lut[v as usize]
    }

    pub fn as_slice(&self) -> &[u8; 256] {
        &self.lut
    }
}
