use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::SessionToken,
    error::ApiErrorBody,
    protocol::{
        ContinueInteractiveRequest, FinalizeInteractiveRequest, FinalizeResponse,
        InteractiveResponse, StartInteractiveRequest,
    },
};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_FINALIZE_TOP_K: u32 = 30;
pub const DEFAULT_FINALIZE_TOP_N: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeLimits {
    pub top_k: u32,
    pub top_n: u32,
}

impl Default for FinalizeLimits {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_FINALIZE_TOP_K,
            top_n: DEFAULT_FINALIZE_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchServiceError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("failed to reach match service: {0}")]
    Transport(String),
    #[error("malformed match service response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MatchService: Send + Sync {
    async fn start(&self, prompt_text: &str) -> Result<InteractiveResponse, MatchServiceError>;
    async fn continue_session(
        &self,
        session: &SessionToken,
        answer_text: &str,
    ) -> Result<InteractiveResponse, MatchServiceError>;
    async fn finalize(
        &self,
        session: &SessionToken,
        limits: FinalizeLimits,
    ) -> Result<FinalizeResponse, MatchServiceError>;
}

pub struct HttpMatchService {
    http: Client,
    endpoint: String,
}

impl HttpMatchService {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_base_url)
    }

    pub fn with_client(http: Client, api_base_url: impl Into<String>) -> Self {
        let base: String = api_base_url.into();
        Self {
            http,
            endpoint: format!("{}/match/interactive", base.trim_end_matches('/')),
        }
    }

    async fn post<B, T>(&self, step: &str, body: &B) -> Result<T, MatchServiceError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{step}", self.endpoint))
            .json(body)
            .send()
            .await
            .map_err(|err| {
                warn!(step, error = %err, "interactive match request failed");
                MatchServiceError::Transport(err.to_string())
            })?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!(step, error = %err, "interactive match request rejected");
            return Err(err);
        }

        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                MatchServiceError::Decode(err.to_string())
            } else {
                MatchServiceError::Transport(err.to_string())
            }
        })
    }
}

async fn status_error(response: Response) -> MatchServiceError {
    let status = response.status().as_u16();
    let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
    let message = body
        .text()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP error! status: {status}"));
    MatchServiceError::Status { status, message }
}

#[async_trait]
impl MatchService for HttpMatchService {
    async fn start(&self, prompt_text: &str) -> Result<InteractiveResponse, MatchServiceError> {
        self.post(
            "start",
            &StartInteractiveRequest {
                prompt_text: prompt_text.to_string(),
            },
        )
        .await
    }

    async fn continue_session(
        &self,
        session: &SessionToken,
        answer_text: &str,
    ) -> Result<InteractiveResponse, MatchServiceError> {
        self.post(
            "continue",
            &ContinueInteractiveRequest {
                session: session.clone(),
                answer_text: answer_text.to_string(),
            },
        )
        .await
    }

    async fn finalize(
        &self,
        session: &SessionToken,
        limits: FinalizeLimits,
    ) -> Result<FinalizeResponse, MatchServiceError> {
        self.post(
            "finalize",
            &FinalizeInteractiveRequest {
                session: session.clone(),
                top_k: limits.top_k,
                top_n: limits.top_n,
            },
        )
        .await
    }
}
