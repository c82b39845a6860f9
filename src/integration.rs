//! Host entry points: lookup of question entities and follow-up UI messages.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::conversation::{ends_with_user_turn, heal_pending, last_question, new_transcript};
use crate::credentials::{GcloudTokenSource, TokenCache, TokenSource};
use crate::disclaimer::{DisclaimerPolicy, DisclaimerRecord};
use crate::error::{IntegrationError, Result};
use crate::models::{
    Entity, LookupData, LookupDetails, LookupResult, MessagePayload, MessageResponse,
    OptionError, Options, Transcript, Turn,
};
use crate::provider::{Provider, ProviderClient, ProviderKind};
use crate::transport::{HttpTransport, Transport};
use crate::validation::{is_question, validate_options};

/// State shared by every call for the lifetime of the integration.
#[derive(Debug, Default)]
pub struct IntegrationState {
    pub disclaimers: DisclaimerRecord,
    pub tokens: TokenCache,
}

impl IntegrationState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Integration {
    config: Arc<Config>,
    client: ProviderClient,
    state: Arc<IntegrationState>,
}

impl Integration {
    /// Wire up the production transport and credential helper.
    pub fn startup(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.http_timeout())?);
        info!(
            provider = %config.provider.kind,
            location = %config.provider.location,
            "Starting Google AI integration"
        );
        Ok(Self::with_parts(
            config,
            transport,
            Arc::new(GcloudTokenSource),
            Arc::new(IntegrationState::new()),
        ))
    }

    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        token_source: Arc<dyn TokenSource>,
        state: Arc<IntegrationState>,
    ) -> Self {
        let provider: Arc<dyn Provider> = Arc::from(config.provider.kind.build());
        Self {
            config: Arc::new(config),
            client: ProviderClient::new(provider, transport, token_source),
            state,
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.config.provider.kind
    }

    pub fn state(&self) -> &IntegrationState {
        &self.state
    }

    pub async fn do_lookup(
        &self,
        entities: Vec<Entity>,
        options: &Options,
    ) -> Result<Vec<LookupResult>> {
        debug!(entities = entities.len(), "doLookup");
        let policy = DisclaimerPolicy::from_options(options)?;

        let questions: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| {
                let keep = is_question(&entity.value);
                if !keep {
                    debug!(value = %entity.value, "Skipping entity that is not a question");
                }
                keep
            })
            .collect();

        let results: Vec<Result<LookupResult>> = stream::iter(questions)
            .map(|entity| self.lookup_entity(entity, options, policy))
            .buffer_unordered(self.config.lookup_concurrency())
            .collect()
            .await;

        let results = results
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| error!(error = %e, "Error in doLookup"))?;
        debug!(results = results.len(), "Lookup Results");
        Ok(results)
    }

    async fn lookup_entity(
        &self,
        entity: Entity,
        options: &Options,
        policy: DisclaimerPolicy,
    ) -> Result<LookupResult> {
        let user = options.user();
        let question = entity.value.trim().to_string();
        let mut responses = new_transcript(&question);

        if self
            .state
            .disclaimers
            .check_and_stamp(policy, &user.id, Utc::now())
        {
            debug!(user_id = %user.id, "Showing disclaimer");
            return Ok(self.lookup_result(
                entity,
                LookupDetails {
                    question,
                    username: user.username.clone(),
                    show_disclaimer: true,
                    disclaimer: Some(options.disclaimer.clone()),
                    log_searches: options.log_searches,
                    responses,
                    token_count: None,
                },
            ));
        }

        let mut token_count = None;
        if options
            .answer_on_lookup
            .unwrap_or(self.config.lookup.answer_on_lookup)
        {
            log_search(&question, false, options);
            let settings = self.config.provider_settings(options);
            let answer = self
                .client
                .ask(&responses, &settings, &self.state.tokens)
                .await?;
            responses.push(answer.turn);
            token_count = answer.token_count;
        }

        Ok(self.lookup_result(
            entity,
            LookupDetails {
                question,
                username: user.username.clone(),
                show_disclaimer: false,
                disclaimer: None,
                log_searches: options.log_searches,
                responses,
                token_count,
            },
        ))
    }

    fn lookup_result(&self, mut entity: Entity, details: LookupDetails) -> LookupResult {
        let summary = vec![details.question.clone()];
        entity.value = self.config.lookup.display_name.clone();
        LookupResult {
            entity,
            data: LookupData { summary, details },
        }
    }

    pub async fn on_message(
        &self,
        payload: MessagePayload,
        options: &Options,
    ) -> Result<MessageResponse> {
        match payload {
            MessagePayload::Question {
                responses,
                accepted_disclaimer,
            } => self
                .answer_question(responses, accepted_disclaimer, options)
                .await
                .inspect_err(|e| error!(error = %e, "Error in onMessage")),
            MessagePayload::DeclineDisclaimer { search } => {
                Ok(self.decline_disclaimer(&search, options))
            }
        }
    }

    async fn answer_question(
        &self,
        mut responses: Transcript,
        accepted_disclaimer: bool,
        options: &Options,
    ) -> Result<MessageResponse> {
        heal_pending(&mut responses);
        if !ends_with_user_turn(&responses) {
            return Err(IntegrationError::Validation(
                "The conversation must end with a user question".to_string(),
            ));
        }

        let question = last_question(&responses).unwrap_or_default();
        log_search(&question, accepted_disclaimer, options);

        let settings = self.config.provider_settings(options);
        let answer = self
            .client
            .ask(&responses, &settings, &self.state.tokens)
            .await?;
        responses.push(answer.turn);
        debug!(turns = responses.len(), "onMessage return data");

        Ok(MessageResponse {
            responses,
            token_count: answer.token_count,
            accepted_disclaimer: false,
            declined: false,
        })
    }

    fn decline_disclaimer(&self, search: &[Turn], options: &Options) -> MessageResponse {
        let user = options.user();
        if options.log_searches {
            info!(
                target: "search_audit",
                search = %last_question(search).unwrap_or_default(),
                search_ran = false,
                username = %user.username,
                user_id = %user.id,
                "Disclaimer Declined"
            );
        }
        self.state.disclaimers.clear(&user.id);

        MessageResponse {
            responses: Vec::new(),
            token_count: None,
            accepted_disclaimer: false,
            declined: true,
        }
    }

    pub fn validate_options(&self, options: &Options) -> Vec<OptionError> {
        validate_options(options, self.provider_kind())
    }
}

fn log_search(search: &str, viewed_disclaimer: bool, options: &Options) {
    if options.log_searches {
        let user = options.user();
        info!(
            target: "search_audit",
            search = %search,
            search_ran = true,
            viewed_disclaimer,
            username = %user.username,
            user_id = %user.id,
            "Search Ran"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;
    use crate::transport::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    // Mock Transport for testing, routed by endpoint method
    struct MockTransport {
        answer: HttpResponse,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        fn answering(text: &str) -> Self {
            Self::with_answer(HttpResponse {
                status: 200,
                body: json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] }),
            })
        }

        fn with_answer(answer: HttpResponse) -> Self {
            MockTransport {
                answer,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn generate_calls(&self) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.ends_with(":generateContent"))
                .count()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, req: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(req.clone());
            if req.url.ends_with(":countTokens") {
                return Ok(HttpResponse {
                    status: 200,
                    body: json!({ "totalTokens": 12 }),
                });
            }
            Ok(self.answer.clone())
        }
    }

    struct NoTokens;

    #[async_trait]
    impl TokenSource for NoTokens {
        async fn fetch_token(&self, _cli_path: &str) -> Result<String> {
            Err(IntegrationError::TokenRefresh("not used".to_string()))
        }
    }

    fn integration(transport: Arc<MockTransport>) -> Integration {
        Integration::with_parts(
            Config::default(),
            transport,
            Arc::new(NoTokens),
            Arc::new(IntegrationState::new()),
        )
    }

    fn options(show_disclaimer: bool, interval: &str) -> Options {
        serde_json::from_value(json!({
            "apiKey": "key",
            "showDisclaimer": show_disclaimer,
            "disclaimerInterval": { "value": interval, "display": interval },
            "logSearches": true,
            "_request": { "user": { "id": "42", "username": "analyst" } }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_then_question_end_to_end() {
        let transport = Arc::new(MockTransport::answering("APT33 is an Iranian threat group."));
        let integration = integration(transport.clone());
        let opts = options(false, "all");

        let results = integration
            .do_lookup(vec![Entity::new("What is APT33?")], &opts)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let details = serde_json::to_value(&results[0].data.details).unwrap();
        assert_eq!(
            details["responses"],
            json!([{ "role": "user", "parts": [{ "text": "What is APT33?" }] }])
        );
        assert!(details.get("showDisclaimer").is_none());
        assert_eq!(results[0].entity.value, "GoogleAI");
        assert_eq!(results[0].data.summary, vec!["What is APT33?".to_string()]);
        assert_eq!(transport.generate_calls(), 0);

        let payload: MessagePayload = serde_json::from_value(json!({
            "action": "question",
            "responses": details["responses"].clone()
        }))
        .unwrap();
        let response = integration.on_message(payload, &opts).await.unwrap();
        assert_eq!(response.responses.len(), 2);
        assert_eq!(response.responses[1].role, Speaker::Model);
        assert_eq!(response.token_count, Some(12));
        assert!(!response.accepted_disclaimer);
        assert_eq!(transport.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_disclaimer_shown_without_provider_call() {
        let transport = Arc::new(MockTransport::answering("unused"));
        let integration = integration(transport.clone());
        let opts = options(true, "all");

        for _ in 0..2 {
            let results = integration
                .do_lookup(vec![Entity::new("What is APT33?")], &opts)
                .await
                .unwrap();
            let details = &results[0].data.details;
            assert!(details.show_disclaimer);
            assert_eq!(details.disclaimer.as_deref(), Some(opts.disclaimer.as_str()));
            assert_eq!(details.responses, vec![Turn::user("What is APT33?")]);
        }
        assert!(integration.state().disclaimers.last_shown("42").is_some());
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interval_disclaimer_shown_once() {
        let transport = Arc::new(MockTransport::answering("unused"));
        let integration = integration(transport);
        let opts = options(true, "24");

        let first = integration
            .do_lookup(vec![Entity::new("What is APT33?")], &opts)
            .await
            .unwrap();
        assert!(first[0].data.details.show_disclaimer);

        let second = integration
            .do_lookup(vec![Entity::new("What is APT34?")], &opts)
            .await
            .unwrap();
        assert!(!second[0].data.details.show_disclaimer);
    }

    #[tokio::test]
    async fn test_batch_for_one_user_shows_disclaimer_once() {
        let transport = Arc::new(MockTransport::answering("unused"));
        let integration = integration(transport.clone());
        let opts = options(true, "24");

        let results = integration
            .do_lookup(
                vec![
                    Entity::new("What is APT33?"),
                    Entity::new("Who is behind Emotet?"),
                ],
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let shown = results
            .iter()
            .filter(|r| r.data.details.show_disclaimer)
            .count();
        assert_eq!(shown, 1);
        assert_eq!(integration.state().disclaimers.len(), 1);
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_then_decline() {
        let transport = Arc::new(MockTransport::answering("An answer."));
        let integration = integration(transport.clone());
        let opts = options(true, "24");

        integration
            .do_lookup(vec![Entity::new("What is APT33?")], &opts)
            .await
            .unwrap();

        let accepted = integration
            .on_message(
                MessagePayload::Question {
                    responses: vec![Turn::user("What is APT33?")],
                    accepted_disclaimer: true,
                },
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(accepted.responses.len(), 2);
        assert!(!accepted.accepted_disclaimer);

        let declined = integration
            .on_message(
                MessagePayload::DeclineDisclaimer {
                    search: accepted.responses,
                },
                &opts,
            )
            .await
            .unwrap();
        assert!(declined.declined);
        assert!(declined.responses.is_empty());
        assert!(integration.state().disclaimers.last_shown("42").is_none());

        let again = integration
            .do_lookup(vec![Entity::new("What is APT33?")], &opts)
            .await
            .unwrap();
        assert!(again[0].data.details.show_disclaimer);
    }

    #[tokio::test]
    async fn test_decline_without_record() {
        let integration = integration(Arc::new(MockTransport::answering("unused")));
        let declined = integration
            .on_message(
                MessagePayload::DeclineDisclaimer { search: vec![] },
                &options(true, "all"),
            )
            .await
            .unwrap();
        assert!(declined.declined);
        assert!(integration.state().disclaimers.is_empty());
    }

    #[tokio::test]
    async fn test_question_heals_failed_exchange() {
        let transport = Arc::new(MockTransport::answering("A2"));
        let integration = integration(transport.clone());
        let responses: Transcript = serde_json::from_value(json!([
            { "role": "user", "parts": [{ "text": "Q1" }] },
            { "role": "system-error", "parts": [], "filter": { "reason": "SAFETY" } },
            { "role": "user", "parts": [{ "text": "Q2" }] }
        ]))
        .unwrap();

        let response = integration
            .on_message(
                MessagePayload::Question {
                    responses,
                    accepted_disclaimer: false,
                },
                &options(false, "all"),
            )
            .await
            .unwrap();
        assert_eq!(
            response.responses,
            vec![Turn::user("Q2"), Turn::model("A2")]
        );
        let sent = transport.requests.lock().unwrap()[0].body.clone();
        assert_eq!(sent["contents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_question_error_propagates() {
        let transport = Arc::new(MockTransport::with_answer(HttpResponse {
            status: 500,
            body: Value::Null,
        }));
        let integration = integration(transport);
        let err = integration
            .on_message(
                MessagePayload::Question {
                    responses: vec![Turn::user("What is APT33?")],
                    accepted_disclaimer: false,
                },
                &options(false, "all"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::ApiRequest { status: 500, .. }));
        assert_eq!(err.to_readable_json()["name"], "ApiRequestError");
    }

    #[tokio::test]
    async fn test_question_requires_pending_user_turn() {
        let integration = integration(Arc::new(MockTransport::answering("unused")));
        let err = integration
            .on_message(
                MessagePayload::Question {
                    responses: vec![Turn::user("Q1"), Turn::model("A1")],
                    accepted_disclaimer: false,
                },
                &options(false, "all"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_answer_on_lookup_fans_out() {
        let transport = Arc::new(MockTransport::answering("An answer."));
        let integration = integration(transport.clone());
        let mut opts = options(false, "all");
        opts.answer_on_lookup = Some(true);

        let entities = vec![
            Entity::new("What is APT33?"),
            Entity::new("not a question"),
            Entity::new("Who is behind Emotet?"),
            Entity::new("What is CVE-2021-44228?"),
        ];
        let results = integration.do_lookup(entities, &opts).await.unwrap();
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.data.details.responses.len(), 2);
            assert_eq!(result.data.details.token_count, Some(12));
        }
        assert_eq!(transport.generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_interval_fails_lookup() {
        let integration = integration(Arc::new(MockTransport::answering("unused")));
        let err = integration
            .do_lookup(vec![Entity::new("What is APT33?")], &options(true, "often"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Validation(_)));
    }

    #[test]
    fn test_validate_options_uses_configured_provider() {
        let integration = integration(Arc::new(MockTransport::answering("unused")));
        assert!(integration.validate_options(&options(false, "all")).is_empty());
        assert_eq!(integration.validate_options(&Options::default()).len(), 1);
    }
}
