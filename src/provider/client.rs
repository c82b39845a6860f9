use serde_json::Value;
use std::sync::Arc;

use super::{AuthMode, Provider, ProviderSettings};
use crate::conversation::{ParsedAnswer, append_answer_turn, ends_with_user_turn};
use crate::credentials::{TokenCache, TokenSource};
use crate::error::{IntegrationError, Result};
use crate::models::{Answer, Speaker, Turn};
use crate::retry::{AttemptOutcome, MAX_AUTH_ATTEMPTS, api_request_error, classify};
use crate::transport::{HttpRequest, Transport};

pub struct ProviderClient {
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
    token_source: Arc<dyn TokenSource>,
}

impl ProviderClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        transport: Arc<dyn Transport>,
        token_source: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            provider,
            transport,
            token_source,
        }
    }

    /// Ask the provider for the next turn of `transcript`, which must end with a question.
    pub async fn ask(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
        tokens: &TokenCache,
    ) -> Result<Answer> {
        if !ends_with_user_turn(transcript) {
            return Err(IntegrationError::Validation(
                "The conversation must end with a user question".to_string(),
            ));
        }

        let request = self.provider.build_request(transcript, settings)?;
        let body = self.send_with_auth(request, settings, tokens).await?;

        let parsed = self.provider.parse_answer(&body);
        if parsed == ParsedAnswer::Empty {
            tracing::warn!(
                provider = %self.provider.kind(),
                "Provider returned no usable candidate"
            );
        }

        let mut answered = transcript.to_vec();
        let turn = append_answer_turn(&mut answered, parsed).clone();

        let token_count = if turn.role == Speaker::Model {
            self.count_tokens(&answered, settings, tokens).await
        } else {
            None
        };

        Ok(Answer { turn, token_count })
    }

    async fn send_with_auth(
        &self,
        request: HttpRequest,
        settings: &ProviderSettings,
        tokens: &TokenCache,
    ) -> Result<Value> {
        let bearer = self.provider.auth_mode() == AuthMode::Bearer;
        let api_name = self.provider.kind().api_name();
        let mut attempt: u8 = 0;

        loop {
            attempt += 1;

            let mut req = request.clone();
            if bearer {
                let token = tokens
                    .get_or_fetch(self.token_source.as_ref(), &settings.gcloud_path)
                    .await?;
                req = req.with_bearer(&token);
            }

            let response = self.transport.send(&req).await?;
            match classify(response, api_name) {
                AttemptOutcome::Success(body) => return Ok(body),
                AttemptOutcome::Unauthorized(_) if bearer && attempt < MAX_AUTH_ATTEMPTS => {
                    tracing::warn!(attempt, "Received 401, refreshing access token");
                    tokens
                        .refresh(self.token_source.as_ref(), &settings.gcloud_path)
                        .await?;
                }
                AttemptOutcome::Unauthorized(response) if bearer => {
                    tracing::error!(attempt, "Received 401 after refreshing access token");
                    return Err(IntegrationError::AuthRetryExhausted {
                        status: response.status,
                    });
                }
                AttemptOutcome::Unauthorized(response) => {
                    return Err(api_request_error(response, api_name));
                }
                AttemptOutcome::Failed(err) => return Err(err),
            }
        }
    }

    /// Best effort: a failed count never fails the answer it belongs to.
    async fn count_tokens(
        &self,
        answered: &[Turn],
        settings: &ProviderSettings,
        tokens: &TokenCache,
    ) -> Option<u64> {
        let request = match self.provider.count_tokens_request(answered, settings)? {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Unable to build token count request: {}", e);
                return None;
            }
        };

        match self.send_with_auth(request, settings, tokens).await {
            Ok(body) => {
                let count = self.provider.parse_token_count(&body);
                if count.is_none() {
                    tracing::warn!("Token count response had no total");
                }
                count
            }
            Err(e) => {
                tracing::warn!("Token count request failed: {}", e);
                None
            }
        }
    }
}
