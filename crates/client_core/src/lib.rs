use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AppId, CardId, MatchResult},
    error::{ApiErrorBody, ApiException},
    protocol::{
        ApplicationLink, BacklogCard, CardActionRequest, CardComment, CardDetail, ClickRequest,
        ClickStat, CommunityCard, CompareRequest, ComparisonResponse, CreateBacklogCardRequest,
        DropBacklogCardRequest, DropCardResponse, MatchRequest, MatchResponse, NoMatchRequest,
    },
};
use thiserror::Error;
use tracing::{info, warn};

pub mod backlog;
pub mod catalogue;
pub mod compare_selection;
pub mod interactive;
pub mod match_service;
pub mod stats;

pub use backlog::BacklogValidationError;
pub use compare_selection::{CompareSelection, SelectedApp};
pub use interactive::{
    InteractiveSearch, RequestOutcome, ResultHandler, SearchOutcome, SearchSnapshot, SearchStatus,
    StepOutcome,
};
pub use match_service::{FinalizeLimits, HttpMatchService, MatchService, MatchServiceError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Validation(#[from] BacklogValidationError),
}

#[derive(Clone)]
pub struct MarketplaceClient {
    http: Client,
    api_base_url: String,
    no_match_base_url: String,
}

impl MarketplaceClient {
    pub fn new(api_base_url: impl Into<String>, no_match_base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base_url: trim_base(api_base_url.into()),
            no_match_base_url: trim_base(no_match_base_url.into()),
        }
    }

    pub fn match_service(&self) -> HttpMatchService {
        HttpMatchService::with_client(self.http.clone(), self.api_base_url.clone())
    }

    pub async fn list_applications(&self) -> Result<Vec<ApplicationLink>, ServiceError> {
        let res = self
            .http
            .get(format!("{}/application/links", self.api_base_url))
            .send()
            .await?;
        read_json(res, "HTTP error! status").await
    }

    // A 400 from the matcher means nothing matched the prompt.
    pub async fn match_applications(
        &self,
        buyer_prompt: &str,
        limits: FinalizeLimits,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let res = self
            .http
            .post(format!("{}/matching/match", self.api_base_url))
            .json(&MatchRequest {
                buyer_prompt: buyer_prompt.to_string(),
                top_k: limits.top_k,
                top_n: limits.top_n,
            })
            .send()
            .await?;
        if res.status() == StatusCode::BAD_REQUEST {
            info!("matcher found no applications for prompt");
            return Ok(Vec::new());
        }
        let body: MatchResponse = read_json(res, "HTTP error! status").await?;
        Ok(body.results)
    }

    pub async fn track_click(&self, app_id: &AppId) -> Result<(), ServiceError> {
        let res = self
            .http
            .post(format!("{}/application/click", self.api_base_url))
            .json(&ClickRequest {
                app_id: app_id.clone(),
            })
            .send()
            .await?;
        ensure_success(res, "Failed to track click").await?;
        Ok(())
    }

    pub async fn compare_applications(
        &self,
        company_a: &str,
        company_b: &str,
    ) -> Result<ComparisonResponse, ServiceError> {
        let res = self
            .http
            .post(format!("{}/compare", self.api_base_url))
            .json(&CompareRequest {
                company_a: company_a.to_string(),
                company_b: company_b.to_string(),
            })
            .send()
            .await?;
        read_json(res, "Comparison failed").await
    }

    pub async fn create_backlog_card(
        &self,
        title: &str,
        description: &str,
    ) -> Result<BacklogCard, ServiceError> {
        backlog::validate_card(title, description)?;
        let res = self
            .http
            .post(format!("{}/backlog/cards", self.api_base_url))
            .json(&CreateBacklogCardRequest {
                title: title.to_string(),
                description: description.to_string(),
            })
            .send()
            .await?;
        let card: BacklogCard = read_json(res, "Failed to create backlog card").await?;
        info!(card_id = %card.card_id, "backlog card created");
        Ok(card)
    }

    pub async fn list_cards(&self) -> Result<Vec<CommunityCard>, ServiceError> {
        let res = self
            .http
            .get(format!("{}/cards", self.api_base_url))
            .send()
            .await?;
        read_json(res, "HTTP error! status").await
    }

    pub async fn community_cards(&self) -> Result<Vec<CommunityCard>, ServiceError> {
        Ok(catalogue::by_upvotes(self.list_cards().await?))
    }

    pub async fn upvote_card(&self, card_id: &CardId) -> Result<CommunityCard, ServiceError> {
        self.card_action("cards/upvote", card_id).await
    }

    pub async fn toggle_card_status(&self, card_id: &CardId) -> Result<CommunityCard, ServiceError> {
        self.card_action("cards/toggle-status", card_id).await
    }

    pub async fn discard_card(&self, card_id: &CardId) -> Result<DropCardResponse, ServiceError> {
        let response: DropCardResponse = self.card_action("dropcard", card_id).await?;
        info!(card_id = %card_id, "backlog card discarded");
        Ok(response)
    }

    pub async fn card_detail(&self, card_id: &CardId) -> Result<CardDetail, ServiceError> {
        let res = self
            .http
            .get(format!("{}/cards/{card_id}", self.api_base_url))
            .send()
            .await?;
        let mut detail: CardDetail = read_json(res, "HTTP error! status").await?;

        let res = self
            .http
            .get(format!("{}/cards/{card_id}/comments", self.api_base_url))
            .send()
            .await?;
        detail.comments = read_json::<Vec<CardComment>>(res, "HTTP error! status").await?;
        Ok(detail)
    }

    async fn card_action<T: DeserializeOwned>(
        &self,
        path: &str,
        card_id: &CardId,
    ) -> Result<T, ServiceError> {
        let res = self
            .http
            .post(format!("{}/{path}", self.api_base_url))
            .json(&CardActionRequest {
                card_id: card_id.clone(),
            })
            .send()
            .await?;
        read_json(res, "HTTP error! status").await
    }

    pub async fn drop_backlog_card(&self, id: &CardId) -> Result<serde_json::Value, ServiceError> {
        let res = self
            .http
            .post(format!("{}/backlog/drop", self.api_base_url))
            .json(&DropBacklogCardRequest {
                id: id.clone(),
                timestamp: Utc::now(),
            })
            .send()
            .await?;
        read_json(res, "Failed to drop backlog card").await
    }

    pub async fn submit_no_match(
        &self,
        prompt: &str,
        comment: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        let res = self
            .http
            .post(format!("{}/no-match", self.no_match_base_url))
            .json(&NoMatchRequest {
                prompt: prompt.to_string(),
                comment: comment.to_string(),
                timestamp: Utc::now(),
            })
            .send()
            .await?;
        read_json(res, "Failed to submit no-match data").await
    }

    pub async fn click_stats(&self) -> Result<Vec<ClickStat>, ServiceError> {
        let res = self
            .http
            .get(format!("{}/application/clicks/stats", self.api_base_url))
            .send()
            .await?;
        read_json(res, "HTTP error").await
    }
}

fn trim_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

async fn read_json<T: DeserializeOwned>(res: Response, failure: &str) -> Result<T, ServiceError> {
    Ok(ensure_success(res, failure).await?.json().await?)
}

async fn ensure_success(res: Response, failure: &str) -> Result<Response, ServiceError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.json::<ApiErrorBody>().await.unwrap_or_default();
    let message = match body.text() {
        Some(text) => text.to_string(),
        None => format!("{failure}: {status}"),
    };
    warn!(status = status.as_u16(), error = %message, "marketplace request rejected");
    Err(ApiException::new(status.as_u16(), message).into())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
