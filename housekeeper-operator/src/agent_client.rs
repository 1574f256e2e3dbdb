use std::time::Duration;

use housekeeper_core::protocol::{
    ErrorKind, ErrorResponse, UpgradeRequest, API_VERSION_PATH, UPGRADE_PATH,
};
use log::debug;
use reqwest::StatusCode;
use thiserror::Error;

// extra time on top of the agent deadline for the response to arrive
const RESPONSE_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AgentClientError {
    #[error("Couldn't reach the node agent! Reason: {}", .0)]
    Transport(#[from] reqwest::Error),
    #[error("Node agent rejected the upgrade ({status}, {kind}): {message}")]
    Rejected {
        status: StatusCode,
        kind: ErrorKind,
        message: String,
    },
    #[error("Node agent answered with {status}: {body}")]
    UnexpectedResponse { status: StatusCode, body: String },
}

/// Calls the node agent running next to this operator.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    upgrade_url: String,
}

impl AgentClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            upgrade_url: upgrade_url(endpoint),
        }
    }

    pub async fn upgrade(&self, request: &UpgradeRequest) -> Result<(), AgentClientError> {
        debug!("Sending upgrade request to {}: {request:?}", self.upgrade_url);

        let mut call = self.http.post(&self.upgrade_url).json(request);
        if let Some(secs) = request.timeout_seconds {
            call = call.timeout(response_timeout(secs));
        }

        let response = call.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await?;

        Err(rejection(status, body))
    }
}

fn upgrade_url(endpoint: &str) -> String {
    format!(
        "{}/{API_VERSION_PATH}/{UPGRADE_PATH}",
        endpoint.trim_end_matches('/')
    )
}

fn response_timeout(agent_timeout_secs: u64) -> Duration {
    Duration::from_secs(agent_timeout_secs).saturating_add(RESPONSE_GRACE)
}

fn rejection(status: StatusCode, body: String) -> AgentClientError {
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => AgentClientError::Rejected {
            status,
            kind: error.kind,
            message: error.message,
        },
        Err(_) => AgentClientError::UnexpectedResponse { status, body },
    }
}

#[cfg(test)]
mod tests {
    use housekeeper_core::protocol::ErrorKind;
    use reqwest::StatusCode;

    use std::time::Duration;

    use super::{rejection, response_timeout, upgrade_url, AgentClientError, RESPONSE_GRACE};

    #[test]
    fn url_is_built_from_the_endpoint() {
        assert_eq!(
            upgrade_url("http://127.0.0.1:54444/"),
            "http://127.0.0.1:54444/v1/upgrade"
        );
    }

    #[test]
    fn response_timeout_outlasts_the_agent_deadline() {
        assert_eq!(response_timeout(60), Duration::from_secs(60) + RESPONSE_GRACE);
        assert_eq!(response_timeout(u64::MAX), Duration::MAX);
    }

    #[test]
    fn agent_errors_keep_their_kind() {
        let error = rejection(
            StatusCode::BAD_REQUEST,
            r#"{"kind":"VersionParseError","message":"Couldn't parse 'x'"}"#.to_owned(),
        );

        match error {
            AgentClientError::Rejected { status, kind, .. } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(kind, ErrorKind::VersionParseError);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_bodies_are_kept_verbatim() {
        let error = rejection(StatusCode::NOT_FOUND, "not found".to_owned());

        assert!(matches!(
            error,
            AgentClientError::UnexpectedResponse { body, .. } if body == "not found"
        ));
    }
}
