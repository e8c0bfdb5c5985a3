use serde::Serialize;

use crate::state::DetectionSnapshot;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";
pub const CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, max-age=0";
pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "*";
pub const CAPTURE_CONTENT_DISPOSITION: &str = "inline; filename=capture.jpg";

/// Headers for the status response.
pub const STATUS_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", CONTENT_TYPE_JSON),
    ("Cache-Control", CACHE_CONTROL),
    ("Access-Control-Allow-Origin", ACCESS_CONTROL_ALLOW_ORIGIN),
];

/// Headers for the capture response.
pub const CAPTURE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", CONTENT_TYPE_JPEG),
    ("Content-Disposition", CAPTURE_CONTENT_DISPOSITION),
    ("Cache-Control", CACHE_CONTROL),
    ("Access-Control-Allow-Origin", ACCESS_CONTROL_ALLOW_ORIGIN),
];

/// Body of the status response: the score as a percentage with one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    pub fire: bool,
    pub score: f32,
}

impl From<DetectionSnapshot> for StatusReport {
    fn from(s: DetectionSnapshot) -> Self {
        let percent = if s.score.is_finite() {
            s.score.clamp(0.0, 1.0) * 100.0
        } else {
            0.0
        };
        Self {
            fire: s.fire,
            score: (percent * 10.0).round() / 10.0,
        }
    }
}

impl StatusReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"fire":{},"score":{:.1}}}"#, self.fire, self.score))
    }
}
