use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use serde::Serialize;

use crate::auth::build_agent;
use crate::config::HttpSettings;
use crate::error::SubmitError;
use crate::report::Attributes;

/// One captured frame and the identifiers it is checked against.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission<'a> {
    pub endpoint: &'a str,
    pub subject_id: &'a str,
    pub secondary_id: &'a str,
    pub jpeg: &'a [u8],
    pub token: &'a str,
}

pub trait BiometricValidator: Send + Sync {
    fn submit(&self, submission: &FrameSubmission<'_>) -> Result<Attributes, SubmitError>;
}

#[derive(Serialize)]
struct ValidationBody<'a> {
    cedula: &'a str,
    cod_dactilar: &'a str,
    img_base64: String,
    token: &'a str,
}

pub struct HttpValidationClient {
    agent: ureq::Agent,
}

impl HttpValidationClient {
    pub fn new(settings: &HttpSettings) -> Self {
        Self { agent: build_agent(settings) }
    }
}

impl BiometricValidator for HttpValidationClient {
    fn submit(&self, submission: &FrameSubmission<'_>) -> Result<Attributes, SubmitError> {
        info!(
            "Submitting {} byte frame for {} to {}",
            submission.jpeg.len(),
            submission.subject_id,
            submission.endpoint
        );

        let body = ValidationBody {
            cedula: submission.subject_id,
            cod_dactilar: submission.secondary_id,
            img_base64: general_purpose::STANDARD.encode(submission.jpeg),
            token: submission.token,
        };

        let (status, text) = match self.agent.post(submission.endpoint).send_json(&body) {
            Ok(resp) => {
                let status = resp.status();
                let text = resp
                    .into_string()
                    .map_err(|e| SubmitError::Network(e.to_string()))?;
                (status, text)
            }
            Err(ureq::Error::Status(status, resp)) => (status, resp.into_string().unwrap_or_default()),
            Err(ureq::Error::Transport(t)) => {
                warn!("Validation request failed: {}", t);
                return Err(SubmitError::Network(t.to_string()));
            }
        };

        interpret_response(status, &text)
    }
}

/// Maps a validation response onto the biometric attributes or a
/// user-facing failure.
pub fn interpret_response(status: u16, body: &str) -> Result<Attributes, SubmitError> {
    if !(200..300).contains(&status) {
        warn!("Validation endpoint answered HTTP {}", status);
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| server_message(&v));
        return Err(match message {
            Some(message) => SubmitError::Declined(message),
            None => SubmitError::Status(status),
        });
    }

    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|_| SubmitError::InvalidResponse)?;

    if json.get("status").and_then(|s| s.as_str()) != Some("success") {
        let message = server_message(&json).unwrap_or_else(|| "Validation failed".to_string());
        debug!("Validation declined: {}", message);
        return Err(SubmitError::Declined(message));
    }

    match json {
        serde_json::Value::Object(mut fields) => match fields.remove("datos_RC") {
            Some(serde_json::Value::Object(attributes)) => Ok(attributes),
            Some(_) | None => Ok(fields),
        },
        _ => Err(SubmitError::InvalidResponse),
    }
}

fn server_message(json: &serde_json::Value) -> Option<String> {
    json.get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
