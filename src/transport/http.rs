use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, info, warn};
use ureq::Agent;

use crate::config::{Credentials, FetchConfig};
use crate::constants::fetch::{
    CRUMB_ISSUER_PATH, DEFAULT_CRUMB_HEADER, MAX_RESPONSE_BYTES, SCRIPT_CONSOLE_PATH,
    SCRIPT_FORM_FIELD,
};
use crate::errors::TriageError;
use crate::transport::ScriptTransport;
use crate::types::Endpoint;
use crate::utils::decode_lines_lossy;

/// CSRF crumb returned by the crumb issuer.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
struct Crumb {
    crumb: String,
    #[serde(rename = "crumbRequestField", default = "default_crumb_header")]
    request_field: String,
}

fn default_crumb_header() -> String {
    DEFAULT_CRUMB_HEADER.to_string()
}

/// Jenkins script console (`POST <base>/scriptText`) over a blocking HTTP agent.
///
/// With credentials, a CSRF crumb is requested before the script is posted;
/// a 404 from the crumb issuer means CSRF protection is off.
pub struct JenkinsScriptConsole {
    agent: Agent,
    base: String,
    endpoint: Endpoint,
    authorization: Option<String>,
}

impl fmt::Debug for JenkinsScriptConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JenkinsScriptConsole")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.authorization.is_some())
            .finish()
    }
}

impl JenkinsScriptConsole {
    /// Build a transport from a fetch configuration.
    pub fn new(config: &FetchConfig) -> Self {
        Self::from_parts(config.base(), config.timeout, config.credentials.as_ref())
    }

    /// Build a transport from its individual settings.
    pub fn from_parts(base_url: &str, timeout: Duration, credentials: Option<&Credentials>) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            agent,
            endpoint: format!("{base}/{SCRIPT_CONSOLE_PATH}"),
            base,
            authorization: credentials.map(basic_authorization),
        }
    }

    fn crumb(&self) -> Result<Option<Crumb>, TriageError> {
        let Some(authorization) = &self.authorization else {
            return Ok(None);
        };
        let issuer = format!("{}/{}", self.base, CRUMB_ISSUER_PATH);
        let response = self
            .agent
            .get(issuer.as_str())
            .header("Authorization", authorization.as_str())
            .call();
        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => {
                debug!(endpoint = %issuer, "[triage:http] crumb issuer disabled");
                return Ok(None);
            }
            Err(err) => return Err(map_call_error(&issuer, err)),
        };
        let mut body = response.into_body();
        let text = body
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|err| map_call_error(&issuer, err))?;
        let crumb: Crumb =
            serde_json::from_str(&text).map_err(|err| TriageError::ServerUnreachable {
                endpoint: issuer.clone(),
                reason: format!("unparseable crumb response: {err}"),
            })?;
        Ok(Some(crumb))
    }
}

impl ScriptTransport for JenkinsScriptConsole {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn run_script(&self, script: &str) -> Result<String, TriageError> {
        let crumb = self.crumb()?;
        let mut request = self.agent.post(self.endpoint.as_str());
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization.as_str());
        }
        if let Some(crumb) = &crumb {
            request = request.header(crumb.request_field.as_str(), crumb.crumb.as_str());
        }
        info!(
            endpoint = %self.endpoint,
            script_bytes = script.len(),
            "[triage:http] submitting query script"
        );
        let response = request
            .send_form([(SCRIPT_FORM_FIELD, script)])
            .map_err(|err| map_call_error(&self.endpoint, err))?;
        let mut body = response.into_body();
        let bytes = body
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()
            .map_err(|err| map_call_error(&self.endpoint, err))?;
        let (text, repaired) = decode_lines_lossy(&bytes);
        for line in repaired {
            warn!(
                endpoint = %self.endpoint,
                line,
                "[triage:http] replaced invalid UTF-8 in response line"
            );
        }
        Ok(text)
    }

    fn fetch_text(&self, url: &str) -> Result<String, TriageError> {
        let unavailable = |reason: String| TriageError::ConsoleUnavailable {
            url: url.to_string(),
            reason,
        };
        let mut request = self.agent.get(url);
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization.as_str());
        }
        let response = request.call().map_err(|err| unavailable(err.to_string()))?;
        let mut body = response.into_body();
        let bytes = body
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()
            .map_err(|err| unavailable(err.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn basic_authorization(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.user, credentials.token);
    format!("Basic {}", STANDARD.encode(pair))
}

fn map_call_error(endpoint: &str, err: ureq::Error) -> TriageError {
    match err {
        ureq::Error::StatusCode(status) => TriageError::ServerRejected {
            endpoint: endpoint.to_string(),
            status,
        },
        other => TriageError::ServerUnreachable {
            endpoint: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}
