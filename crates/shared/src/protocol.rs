use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AppId, AttributeKind, CardId, CommentId, MatchResult, SessionToken};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInteractiveRequest {
    pub prompt_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueInteractiveRequest {
    pub session: SessionToken,
    pub answer_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeInteractiveRequest {
    pub session: SessionToken,
    pub top_k: u32,
    pub top_n: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractiveStatus {
    NeedsMore,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissingCriteria {
    #[serde(default)]
    pub labels_needed: u32,
    #[serde(default)]
    pub tags_needed: u32,
    #[serde(default)]
    pub integrations_needed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveResponse {
    pub status: InteractiveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MatchResult>>,
    pub session: SessionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingCriteria>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MatchResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub company_a: String,
    pub company_b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeItem {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    pub value: String,
    pub has: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationComparison {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeItem>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResponse {
    pub company_a: ApplicationComparison,
    pub company_b: ApplicationComparison,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBacklogCardRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogCard {
    pub card_id: CardId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropBacklogCardRequest {
    pub id: CardId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoMatchRequest {
    pub prompt: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickStat {
    pub app_id: AppId,
    pub app_name: String,
    pub click_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationLink {
    pub id: AppId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub buyer_prompt: String,
    pub top_k: u32,
    pub top_n: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(default)]
    pub results: Vec<MatchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickRequest {
    pub app_id: AppId,
}

pub const CARD_STATUS_COMPLETED: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityCard {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub upvote: u64,
    #[serde(default)]
    pub number_of_requests: u64,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub created_by_bexio: bool,
}

impl CommunityCard {
    pub fn is_completed(&self) -> bool {
        self.status == CARD_STATUS_COMPLETED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardActionRequest {
    pub card_id: CardId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropCardResponse {
    #[serde(default)]
    pub message: Option<String>,
}

// Timestamps stay as sent; the backend emits naive datetimes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardComment {
    pub id: CommentId,
    pub prompt_text: String,
    #[serde(default)]
    pub comment_text: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetail {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub number_of_requests: u64,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub comments: Vec<CardComment>,
}

impl CardDetail {
    pub fn is_completed(&self) -> bool {
        self.status == CARD_STATUS_COMPLETED
    }
}
