use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::camera::{CameraController, StreamHandle};
use crate::error::FlowError;

/// Biometric attributes as returned by the service. The field set is not
/// fixed, so it stays an open map.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub access_token: String,
    pub biometric_data: Attributes,
    pub timestamp: DateTime<Utc>,
}

/// The single terminal result of a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(ValidationResult),
    Failure(FlowError),
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Releases the camera, then hands the outcome over. Nothing reaches the
/// host while a stream is still open.
pub struct ResultReporter<'a> {
    camera: &'a mut CameraController,
}

impl<'a> ResultReporter<'a> {
    pub fn new(camera: &'a mut CameraController) -> Self {
        Self { camera }
    }

    pub fn finish(self, stream: Option<StreamHandle>, outcome: Outcome) -> Outcome {
        if let Some(handle) = stream {
            self.camera.release(&handle);
        }
        self.camera.shutdown();

        match &outcome {
            Outcome::Success(result) => info!(
                "Validation succeeded with {} attribute(s)",
                result.biometric_data.len()
            ),
            Outcome::Failure(err) => info!("Validation failed: {}", err),
            Outcome::Cancelled => info!("Validation cancelled"),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::VideoSource;
    use crate::error::{CameraError, ErrorCode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FlagSource(Arc<AtomicBool>);

    impl VideoSource for FlagSource {
        fn open(&mut self) -> Result<(), CameraError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
            Ok(vec![1])
        }

        fn close(&mut self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn finish_releases_before_returning() {
        let open = Arc::new(AtomicBool::new(false));
        let mut camera = CameraController::new(Box::new(FlagSource(Arc::clone(&open))));
        let handle = camera.acquire().unwrap();
        assert!(open.load(Ordering::SeqCst));

        let outcome = ResultReporter::new(&mut camera).finish(
            Some(handle),
            Outcome::Failure(FlowError::new(ErrorCode::CameraError, "gone")),
        );

        assert!(!open.load(Ordering::SeqCst));
        assert!(!camera.is_streaming());
        assert!(!outcome.is_success());
    }

    #[test]
    fn result_serializes_camel_case() {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), serde_json::json!("X"));
        let result = ValidationResult {
            access_token: "tok".into(),
            biometric_data: attrs,
            timestamp: DateTime::parse_from_rfc3339("2026-10-18T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["accessToken"], "tok");
        assert_eq!(value["biometricData"], serde_json::json!({"name": "X"}));
        assert!(value["timestamp"].as_str().unwrap().starts_with("2026-10-18T10:00:00"));
    }
}
