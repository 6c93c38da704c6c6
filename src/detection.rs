//! Detector response model
//!
//! The backend answers an upload with a JSON document listing the circles it
//! found:
//!
//! ```json
//! { "circles": [ {"radius": 12, "status": "filled", "x": 40, "y": 61} ],
//!   "message": "Image capture_20250101_120000.jpg uploaded successfully" }
//! ```
//!
//! Any field may be missing; missing fields take their defaults.

use serde::{Deserialize, Serialize};

/// One detected circle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Circle {
    pub radius: i32,
    pub status: String,
    pub x: i32,
    pub y: i32,
}

/// Parsed detector response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionResult {
    #[serde(rename = "circles")]
    pub detections: Vec<Circle>,
    pub message: String,
}

impl DetectionResult {
    /// Decode a response body
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Decode a response body, logging and defaulting on failure
    pub fn from_body_lossy(body: &[u8]) -> Self {
        match Self::from_body(body) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Response body is not a detection result: {}", e);
                DetectionResult::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.message.is_empty()
    }

    /// Write a human-readable summary to the log
    pub fn log_summary(&self) {
        log::info!("{} circles found", self.detections.len());
        for (i, circle) in self.detections.iter().enumerate() {
            log::info!(
                "circle[{}] radius={} status={} position=({}, {})",
                i + 1,
                circle.radius,
                circle.status,
                circle.x,
                circle.y
            );
        }
        if !self.message.is_empty() {
            log::info!("response message: {}", self.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full() {
        let body = br#"{"circles":[{"radius":12,"status":"filled","x":40,"y":61},
                        {"radius":7,"status":"empty","x":1,"y":2}],"message":"ok"}"#;
        let result = DetectionResult::from_body(body).unwrap();
        assert_eq!(result.detections.len(), 2);
        assert_eq!(
            result.detections[0],
            Circle {
                radius: 12,
                status: "filled".to_string(),
                x: 40,
                y: 61
            }
        );
        assert_eq!(result.detections[1].status, "empty");
        assert_eq!(result.message, "ok");
    }

    #[test]
    fn test_decode_message_only() {
        let result = DetectionResult::from_body(br#"{"message":"Image a.jpg uploaded"}"#).unwrap();
        assert!(result.detections.is_empty());
        assert_eq!(result.message, "Image a.jpg uploaded");
    }

    #[test]
    fn test_lossy_defaults() {
        assert!(DetectionResult::from_body_lossy(b"<html>502</html>").is_empty());
        assert!(DetectionResult::from_body_lossy(b"").is_empty());
    }
}
