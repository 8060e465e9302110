use std::{fmt, future::Future, sync::Arc};

use shared::{
    domain::{ChatMessage, MatchResult, SessionToken},
    protocol::{InteractiveResponse, InteractiveStatus},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::match_service::{FinalizeLimits, MatchService, MatchServiceError};

const DEFAULT_START_QUESTION: &str = "Can you provide more details?";
const DEFAULT_FOLLOW_UP_QUESTION: &str = "Anything else?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStatus {
    #[default]
    Idle,
    AwaitingStart,
    NeedsMoreInput,
    AwaitingContinue,
    AwaitingFinalize,
    Ready,
    Error,
}

impl SearchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingStart => "awaiting-start-response",
            Self::NeedsMoreInput => "needs-more-input",
            Self::AwaitingContinue => "awaiting-continue-response",
            Self::AwaitingFinalize => "awaiting-finalize-response",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::AwaitingStart | Self::AwaitingContinue | Self::AwaitingFinalize
        )
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<MatchResult>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome<T, E = MatchServiceError> {
    Completed(T),
    Failed(E),
    Cancelled,
}

impl<T, E> RequestOutcome<T, E> {
    pub async fn race<F>(cancel: &CancellationToken, request: F) -> Self
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Self::Cancelled,
            result = request => match result {
                Ok(value) => Self::Completed(value),
                Err(err) => Self::Failed(err),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Ignored,
    NeedsMoreInput { question: String },
    Completed(SearchOutcome),
    Failed(String),
    /// The request was superseded by a newer one or by a reset.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    pub status: SearchStatus,
    pub messages: Vec<ChatMessage>,
    pub error: Option<String>,
    pub has_session: bool,
}

pub type ResultHandler = Arc<dyn Fn(&SearchOutcome) + Send + Sync>;

struct RequestTicket {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SearchState {
    status: SearchStatus,
    messages: Vec<ChatMessage>,
    session: Option<SessionToken>,
    error: Option<String>,
    query: String,
    generation: u64,
    inflight: Option<CancellationToken>,
}

impl SearchState {
    fn cancel_inflight(&mut self) {
        if let Some(cancel) = self.inflight.take() {
            cancel.cancel();
        }
    }

    fn clear(&mut self) {
        self.cancel_inflight();
        self.generation += 1;
        self.status = SearchStatus::Idle;
        self.messages.clear();
        self.session = None;
        self.error = None;
        self.query.clear();
    }

    fn begin_request(&mut self, status: SearchStatus) -> RequestTicket {
        self.cancel_inflight();
        self.generation += 1;
        let cancel = CancellationToken::new();
        self.inflight = Some(cancel.clone());
        self.status = status;
        RequestTicket {
            generation: self.generation,
            cancel,
        }
    }

    fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.generation == ticket.generation && !ticket.cancel.is_cancelled()
    }

    fn fail(&mut self, message: String) {
        self.inflight = None;
        self.session = None;
        self.status = SearchStatus::Error;
        self.error = Some(message);
    }

    fn complete(
        &mut self,
        results: Vec<MatchResult>,
        final_prompt: Option<String>,
    ) -> SearchOutcome {
        self.inflight = None;
        self.status = SearchStatus::Ready;
        let query = final_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| self.query.clone());
        SearchOutcome { results, query }
    }
}

pub struct InteractiveSearch {
    service: Arc<dyn MatchService>,
    limits: FinalizeLimits,
    on_results: Option<ResultHandler>,
    inner: Mutex<SearchState>,
}

impl InteractiveSearch {
    pub fn new(service: Arc<dyn MatchService>) -> Self {
        Self {
            service,
            limits: FinalizeLimits::default(),
            on_results: None,
            inner: Mutex::new(SearchState::default()),
        }
    }

    pub fn with_finalize_limits(mut self, limits: FinalizeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Called once for every session that reaches `ready`.
    pub fn with_result_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SearchOutcome) + Send + Sync + 'static,
    {
        self.on_results = Some(Arc::new(handler));
        self
    }

    pub async fn status(&self) -> SearchStatus {
        self.inner.lock().await.status
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    pub async fn snapshot(&self) -> SearchSnapshot {
        let state = self.inner.lock().await;
        SearchSnapshot {
            status: state.status,
            messages: state.messages.clone(),
            error: state.error.clone(),
            has_session: state.session.is_some(),
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let was = state.status;
        state.clear();
        debug!(from = %was, "interactive search reset");
    }

    pub async fn start(&self, query: &str) -> StepOutcome {
        if query.trim().is_empty() {
            debug!("ignoring empty search query");
            return StepOutcome::Ignored;
        }

        let ticket = {
            let mut state = self.inner.lock().await;
            state.clear();
            state.query = query.to_string();
            state.begin_request(SearchStatus::AwaitingStart)
        };
        info!(generation = ticket.generation, "starting interactive search");

        let outcome = RequestOutcome::race(&ticket.cancel, self.service.start(query)).await;
        self.apply_interactive(ticket, outcome, Some(query), DEFAULT_START_QUESTION)
            .await
    }

    pub async fn submit_answer(&self, answer: &str) -> StepOutcome {
        if answer.trim().is_empty() {
            debug!("ignoring empty answer");
            return StepOutcome::Ignored;
        }

        let (ticket, session) = {
            let mut state = self.inner.lock().await;
            let Some(session) = state.session.clone() else {
                debug!(status = %state.status, "ignoring answer without an active session");
                return StepOutcome::Ignored;
            };
            state.messages.push(ChatMessage::user(answer));
            (state.begin_request(SearchStatus::AwaitingContinue), session)
        };
        info!(generation = ticket.generation, "continuing interactive search");

        let outcome = RequestOutcome::race(
            &ticket.cancel,
            self.service.continue_session(&session, answer),
        )
        .await;
        self.apply_interactive(ticket, outcome, None, DEFAULT_FOLLOW_UP_QUESTION)
            .await
    }

    pub async fn finalize_search(&self) -> StepOutcome {
        let (ticket, session) = {
            let mut state = self.inner.lock().await;
            let Some(session) = state.session.clone() else {
                debug!(status = %state.status, "ignoring finalize without an active session");
                return StepOutcome::Ignored;
            };
            (state.begin_request(SearchStatus::AwaitingFinalize), session)
        };
        info!(generation = ticket.generation, "finalizing interactive search on request");
        self.finalize_with(ticket, session).await
    }

    async fn apply_interactive(
        &self,
        ticket: RequestTicket,
        outcome: RequestOutcome<InteractiveResponse>,
        user_turn: Option<&str>,
        default_question: &str,
    ) -> StepOutcome {
        let mut state = self.inner.lock().await;
        if !state.is_current(&ticket) {
            debug!(generation = ticket.generation, "discarding superseded response");
            return StepOutcome::Cancelled;
        }

        let response = match outcome {
            RequestOutcome::Completed(response) => response,
            RequestOutcome::Failed(err) => {
                let message = err.to_string();
                warn!(generation = ticket.generation, error = %message, "interactive search failed");
                state.fail(message.clone());
                return StepOutcome::Failed(message);
            }
            RequestOutcome::Cancelled => return StepOutcome::Cancelled,
        };

        let session = response.session;
        state.session = Some(session.clone());
        match response.status {
            InteractiveStatus::NeedsMore => {
                let question = response
                    .question
                    .filter(|question| !question.trim().is_empty())
                    .unwrap_or_else(|| default_question.to_string());
                if let Some(query) = user_turn {
                    state.messages.push(ChatMessage::user(query));
                }
                state.messages.push(ChatMessage::assistant(question.clone()));
                state.inflight = None;
                state.status = SearchStatus::NeedsMoreInput;
                info!(turns = state.messages.len(), "backend needs more input");
                StepOutcome::NeedsMoreInput { question }
            }
            InteractiveStatus::Ready => match response.results {
                Some(results) => {
                    let outcome = state.complete(results, response.final_prompt);
                    drop(state);
                    self.deliver(&outcome);
                    StepOutcome::Completed(outcome)
                }
                None => {
                    state.status = SearchStatus::AwaitingFinalize;
                    drop(state);
                    info!(generation = ticket.generation, "ready without results, finalizing");
                    self.finalize_with(ticket, session).await
                }
            },
        }
    }

    async fn finalize_with(&self, ticket: RequestTicket, session: SessionToken) -> StepOutcome {
        let outcome =
            RequestOutcome::race(&ticket.cancel, self.service.finalize(&session, self.limits))
                .await;

        let mut state = self.inner.lock().await;
        if !state.is_current(&ticket) {
            debug!(generation = ticket.generation, "discarding superseded finalize response");
            return StepOutcome::Cancelled;
        }

        match outcome {
            RequestOutcome::Completed(response) => {
                let outcome =
                    state.complete(response.results.unwrap_or_default(), response.final_prompt);
                drop(state);
                self.deliver(&outcome);
                StepOutcome::Completed(outcome)
            }
            RequestOutcome::Failed(err) => {
                let message = err.to_string();
                warn!(generation = ticket.generation, error = %message, "finalize failed");
                state.fail(message.clone());
                StepOutcome::Failed(message)
            }
            RequestOutcome::Cancelled => StepOutcome::Cancelled,
        }
    }

    fn deliver(&self, outcome: &SearchOutcome) {
        info!(
            results = outcome.results.len(),
            query = %outcome.query,
            "interactive search completed"
        );
        if let Some(handler) = &self.on_results {
            handler(outcome);
        }
    }
}

#[cfg(test)]
#[path = "tests/interactive_tests.rs"]
mod tests;
