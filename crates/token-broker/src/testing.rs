//! Test doubles shared by the unit tests in this crate.

use std::sync::Mutex;

use crate::error::IssuerError;
use crate::issuer::{AccessToken, BoxFuture, TokenIssuer, TokenRequest};

/// What the issuer was asked for.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: &'static str,
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
    pub had_session: bool,
}

/// Issuer that records every request and answers with a fixed result.
///
/// Successful tokens are named `token-for-<request kind>`.
pub struct RecordingIssuer {
    failure: Option<IssuerError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingIssuer {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: IssuerError) -> Self {
        Self {
            failure: Some(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TokenIssuer for RecordingIssuer {
    fn acquire<'a>(
        &'a self,
        request: TokenRequest<'a>,
    ) -> BoxFuture<'a, Result<AccessToken, IssuerError>> {
        let (client_id, had_session) = match request {
            TokenRequest::Delegated { session, .. } => (None, session.is_some()),
            TokenRequest::LocalChain { .. } => (None, false),
            TokenRequest::HostIdentity { client_id, .. } => (Some(client_id.to_string()), false),
        };
        self.calls.lock().unwrap().push(RecordedCall {
            kind: request.kind(),
            scopes: request.scopes().to_vec(),
            client_id,
            had_session,
        });

        let result = match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(AccessToken::new(format!("token-for-{}", request.kind()), None)),
        };
        Box::pin(async move { result })
    }
}
