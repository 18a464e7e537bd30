use log::{debug, info, warn};
use serde::Serialize;

use crate::config::HttpSettings;
use crate::error::TokenError;

/// Obtains the bearer token used for every submission of a flow.
pub trait TokenProvider: Send + Sync {
    fn fetch_token(&self, endpoint: &str, username: &str, password: &str) -> Result<String, TokenError>;
}

#[derive(Serialize)]
struct TokenRequestBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// One POST per call. Retrying is the caller's decision.
pub struct HttpTokenClient {
    agent: ureq::Agent,
}

impl HttpTokenClient {
    pub fn new(settings: &HttpSettings) -> Self {
        Self { agent: build_agent(settings) }
    }
}

impl TokenProvider for HttpTokenClient {
    fn fetch_token(&self, endpoint: &str, username: &str, password: &str) -> Result<String, TokenError> {
        info!("Requesting access token from {}", endpoint);

        let response = self
            .agent
            .post(endpoint)
            .send_json(TokenRequestBody { username, password });

        let (status, body) = match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .into_string()
                    .map_err(|e| TokenError::Network(e.to_string()))?;
                (status, body)
            }
            Err(ureq::Error::Status(status, resp)) => {
                (status, resp.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Transport(t)) => {
                warn!("Token request to {} failed: {}", endpoint, t);
                return Err(TokenError::Network(t.to_string()));
            }
        };

        let token = parse_token_response(status, &body)?;
        debug!("Received access token ({} chars)", token.len());
        Ok(token)
    }
}

pub fn parse_token_response(status: u16, body: &str) -> Result<String, TokenError> {
    if status != 200 {
        warn!("Token endpoint answered HTTP {}", status);
        return Err(TokenError::Request(status));
    }

    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TokenError::Parse(e.to_string()))?;

    match json.get("access_token").and_then(|t| t.as_str()) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(TokenError::Missing),
    }
}

pub(crate) fn build_agent(settings: &HttpSettings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(settings.timeout())
        .build()
}
