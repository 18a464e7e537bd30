//! Host-facing contract: a start request goes in, exactly one reply comes out.

use async_channel::{Receiver, Sender};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::camera::VideoSource;
use crate::config::{EndpointSettings, SessionConfig, Settings};
use crate::error::{CameraError, ErrorCode, FlowError};
use crate::flow::{FlowView, UserAction};
use crate::report::{Outcome, ValidationResult};
use crate::session::Session;

/// What the host sends to start a flow. Endpoints and credentials fall back
/// to the configured defaults when left out.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default, alias = "cedula")]
    pub subject_id: Option<String>,
    #[serde(default, alias = "codDactilar")]
    pub secondary_id: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub validation_endpoint: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn present(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn is_cedula(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

/// One letter, four digits, one letter, four digits.
fn is_cod_dactilar(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[0].is_ascii_uppercase()
        && bytes[1..5].iter().all(u8::is_ascii_digit)
        && bytes[5].is_ascii_uppercase()
        && bytes[6..].iter().all(u8::is_ascii_digit)
}

/// Merges defaults into the request and checks it before any flow exists.
pub fn prepare(request: &StartRequest, defaults: &EndpointSettings) -> Result<SessionConfig, FlowError> {
    let username = present(request.username.as_ref()).or_else(|| present(defaults.username.as_ref()));
    let password = present(request.password.as_ref()).or_else(|| present(defaults.password.as_ref()));
    let (Some(username), Some(password)) = (username, password) else {
        return Err(FlowError::new(
            ErrorCode::CredentialsNotConfigured,
            "Credentials must be configured before validating",
        ));
    };

    let subject_id = present(request.subject_id.as_ref());
    let secondary_id = present(request.secondary_id.as_ref());
    let (Some(subject_id), Some(secondary_id)) = (subject_id, secondary_id) else {
        return Err(FlowError::new(
            ErrorCode::InvalidParams,
            "Subject id and secondary id are required",
        ));
    };

    if !is_cedula(&subject_id) {
        return Err(FlowError::new(
            ErrorCode::InvalidCedula,
            "Subject id must be exactly 10 digits",
        ));
    }

    let secondary_id = secondary_id.to_uppercase();
    if !is_cod_dactilar(&secondary_id) {
        return Err(FlowError::new(
            ErrorCode::InvalidCodDactilar,
            "Secondary id must have 10 characters (e.g. V3331V2222)",
        ));
    }

    Ok(SessionConfig {
        subject_id,
        secondary_id,
        token_endpoint: present(request.token_endpoint.as_ref())
            .unwrap_or_else(|| defaults.token.clone()),
        validation_endpoint: present(request.validation_endpoint.as_ref())
            .unwrap_or_else(|| defaults.validation.clone()),
        username,
        password,
    })
}

/// Runs a whole request: request checks, camera preflight, then the flow.
pub async fn run_request(
    request: &StartRequest,
    settings: &Settings,
    source: Box<dyn VideoSource>,
    actions: Receiver<UserAction>,
    observer: Option<Sender<FlowView>>,
) -> Outcome {
    let config = match prepare(request, &settings.endpoints) {
        Ok(config) => config,
        Err(err) => {
            warn!("Rejected start request: {}", err);
            return Outcome::Failure(err);
        }
    };

    if let Err(CameraError::PermissionDenied(device)) = source.preflight() {
        warn!("No permission to use {}", device);
        return Outcome::Failure(FlowError::new(
            ErrorCode::CameraPermissionDenied,
            "Camera permission is required",
        ));
    }

    info!("Validation requested for {}", config.subject_id);
    let mut session = Session::new(config, settings, source, actions);
    if let Some(observer) = observer {
        session = session.with_observer(observer);
    }
    session.run().await
}

pub fn encode_reply(outcome: &Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Success(result) => json!({
            "accessToken": result.access_token,
            "biometricData": result.biometric_data,
            "timestamp": result.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }),
        Outcome::Failure(err) => json!({
            "code": err.code,
            "message": err.message,
        }),
        Outcome::Cancelled => json!({ "code": ErrorCode::Cancelled }),
    }
}

pub fn parse_reply(text: &str) -> Result<Outcome, FlowError> {
    let parse_error = |detail: String| FlowError::new(ErrorCode::ParseError, detail);

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;

    if value.get("accessToken").is_some() {
        let result: ValidationResult =
            serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;
        return Ok(Outcome::Success(result));
    }

    match value.get("code") {
        Some(code) if code == "CANCELLED" => Ok(Outcome::Cancelled),
        Some(_) => {
            let err: FlowError =
                serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;
            Ok(Outcome::Failure(err))
        }
        None => Err(parse_error("reply has neither accessToken nor code".to_string())),
    }
}

pub fn exit_code(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Success(_) => 0,
        Outcome::Failure(_) => 1,
        Outcome::Cancelled => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StartRequest {
        StartRequest {
            subject_id: Some("1712345678".into()),
            secondary_id: Some("v3331v2222".into()),
            token_endpoint: None,
            validation_endpoint: Some("http://127.0.0.1:9/validate".into()),
            username: Some("client".into()),
            password: Some("secret".into()),
        }
    }

    fn code_of(result: Result<SessionConfig, FlowError>) -> ErrorCode {
        result.unwrap_err().code
    }

    #[test]
    fn prepared_session_merges_defaults_and_uppercases() {
        let config = prepare(&request(), &EndpointSettings::default()).unwrap();
        assert_eq!(config.secondary_id, "V3331V2222");
        assert_eq!(config.token_endpoint, crate::config::DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(config.validation_endpoint, "http://127.0.0.1:9/validate");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn credentials_come_from_defaults_when_absent() {
        let mut req = request();
        req.username = None;
        req.password = None;
        assert_eq!(
            code_of(prepare(&req, &EndpointSettings::default())),
            ErrorCode::CredentialsNotConfigured
        );

        let defaults = EndpointSettings {
            username: Some("svc".into()),
            password: Some("pw".into()),
            ..EndpointSettings::default()
        };
        let config = prepare(&req, &defaults).unwrap();
        assert_eq!(config.username, "svc");
    }

    #[test]
    fn request_checks_run_in_order() {
        let defaults = EndpointSettings::default();

        let mut req = request();
        req.secondary_id = None;
        req.password = Some(" ".into());
        assert_eq!(code_of(prepare(&req, &defaults)), ErrorCode::CredentialsNotConfigured);

        let mut req = request();
        req.subject_id = Some(String::new());
        assert_eq!(code_of(prepare(&req, &defaults)), ErrorCode::InvalidParams);

        let mut req = request();
        req.subject_id = Some("17123456".into());
        req.secondary_id = Some("bad".into());
        assert_eq!(code_of(prepare(&req, &defaults)), ErrorCode::InvalidCedula);

        let mut req = request();
        req.secondary_id = Some("V333XV2222".into());
        assert_eq!(code_of(prepare(&req, &defaults)), ErrorCode::InvalidCodDactilar);
    }

    #[test]
    fn request_accepts_host_field_aliases() {
        let req: StartRequest =
            serde_json::from_str(r#"{"cedula":"1712345678","codDactilar":"V3331V2222"}"#).unwrap();
        assert_eq!(req.subject_id.as_deref(), Some("1712345678"));
        assert_eq!(req.secondary_id.as_deref(), Some("V3331V2222"));
    }

    #[test]
    fn cancelled_reply_has_no_message() {
        let value = encode_reply(&Outcome::Cancelled);
        assert_eq!(value, json!({"code": "CANCELLED"}));
        assert_eq!(parse_reply(&value.to_string()).unwrap(), Outcome::Cancelled);
    }

    #[test]
    fn failure_reply_carries_code_and_message() {
        let outcome = Outcome::Failure(FlowError::new(ErrorCode::TokenRequestError, "HTTP 500"));
        let value = encode_reply(&outcome);
        assert_eq!(value, json!({"code": "TOKEN_REQUEST_ERROR", "message": "HTTP 500"}));
        assert_eq!(parse_reply(&value.to_string()).unwrap(), outcome);
    }

    #[test]
    fn success_reply_keeps_biometric_data_intact() {
        let text = r#"{"accessToken":"tok","biometricData":{"name":"X","nested":{"a":[1,2]}},"timestamp":"2026-10-18T10:00:00.000Z"}"#;
        let outcome = parse_reply(text).unwrap();
        let value = encode_reply(&outcome);
        assert_eq!(value["biometricData"], json!({"name": "X", "nested": {"a": [1, 2]}}));
        assert_eq!(value["timestamp"], "2026-10-18T10:00:00.000Z");
        assert_eq!(exit_code(&outcome), 0);
    }

    #[test]
    fn malformed_reply_is_parse_error() {
        for text in ["", "[1,2]", r#"{"accessToken":"tok"}"#, r#"{"code":"NOPE","message":"x"}"#] {
            assert_eq!(parse_reply(text).unwrap_err().code, ErrorCode::ParseError, "{}", text);
        }
    }
}
