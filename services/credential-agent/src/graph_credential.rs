//! Graph bearer tokens sourced from the token broker

use std::sync::Arc;

use common::Secret;
use directory::{BoxFuture, GraphCredential};
use token_broker::{TokenBroker, TokenOutcome};

/// Supplies directory calls with tokens for one broker resource.
pub struct BrokerGraphCredential {
    broker: Arc<TokenBroker>,
    resource: String,
}

impl BrokerGraphCredential {
    pub fn new(broker: Arc<TokenBroker>, resource: impl Into<String>) -> Self {
        Self {
            broker,
            resource: resource.into(),
        }
    }
}

impl GraphCredential for BrokerGraphCredential {
    fn bearer(&self) -> BoxFuture<'_, directory::Result<Secret<String>>> {
        Box::pin(async move {
            match self.broker.get_token(&self.resource).await {
                Ok(TokenOutcome::Acquired(token)) => Ok(token.value),
                Ok(TokenOutcome::ConsentRequired(challenge)) => {
                    Err(directory::Error::Credential(format!(
                        "resource '{}' needs user consent: {}",
                        challenge.resource, challenge.reason
                    )))
                }
                Err(e) => Err(directory::Error::Credential(e.to_string())),
            }
        })
    }
}
