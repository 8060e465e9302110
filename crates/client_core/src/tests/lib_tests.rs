use super::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

impl ServerState {
    async fn record(&self, route: &'static str, body: Value) {
        self.requests.lock().await.push((route, body));
    }

    async fn bodies(&self, route: &str) -> Vec<Value> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

fn invoice_pro() -> Value {
    json!({"app_id": "7", "name": "InvoicePro", "similarity_percent": 92})
}

async fn handle_start(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.record("start", body.clone()).await;
    match body["prompt_text"].as_str().unwrap_or_default() {
        "explode" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "reject" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "prompt too short"})),
        )
            .into_response(),
        "malformed" => Json(json!({"status": "sideways"})).into_response(),
        "direct" => Json(json!({
            "status": "ready",
            "results": null,
            "session": {"id": "s-direct", "turn": 1},
        }))
        .into_response(),
        _ => Json(json!({
            "status": "needs_more",
            "question": "What's your budget?",
            "session": {"id": "s-1", "turn": 1, "criteria": ["invoicing"]},
            "missing": {"labels_needed": 1, "tags_needed": 0, "integrations_needed": 0},
        }))
        .into_response(),
    }
}

async fn handle_continue(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("continue", body).await;
    Json(json!({
        "status": "ready",
        "final_prompt": "invoicing software under 50 CHF/month",
        "results": [invoice_pro()],
        "session": {"id": "s-1", "turn": 2},
    }))
}

async fn handle_finalize(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("finalize", body).await;
    Json(json!({
        "status": "ready",
        "final_prompt": "direct match",
        "results": [invoice_pro()],
        "session": {"id": "s-direct", "turn": 2},
    }))
}

async fn handle_compare(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.record("compare", body.clone()).await;
    if body["company_a"] == "unknown" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Application 'unknown' not found"})),
        )
            .into_response();
    }
    Json(json!({
        "company_a": {
            "name": body["company_a"],
            "attributes": [{"type": "integration", "value": "Stripe", "has": true}],
            "highlights": [{"title": "Fast setup", "detail": "Onboarding in a day"}],
        },
        "company_b": {
            "name": body["company_b"],
            "attributes": [{"type": "integration", "value": "Stripe", "has": false}],
            "highlights": [],
        },
    }))
    .into_response()
}

async fn handle_create_card(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.record("backlog_cards", body.clone()).await;
    (
        StatusCode::CREATED,
        Json(json!({
            "card_id": "card-42",
            "title": body["title"],
            "description": body["description"],
        })),
    )
        .into_response()
}

async fn handle_drop_card(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.record("backlog_drop", body.clone()).await;
    if body["id"] == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"status": "dropped"})).into_response()
}

async fn handle_no_match(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("no_match", body).await;
    Json(json!({"stored": true}))
}

async fn handle_click_stats() -> Json<Value> {
    Json(json!([
        {"app_id": "1", "app_name": "Ledgerly", "click_count": 4, "tags": ["finance"]},
        {"app_id": "2", "app_name": "Crm Hub", "click_count": 11, "tags": ["sales"]},
    ]))
}

async fn handle_links() -> Json<Value> {
    Json(json!([
        {"id": 1, "name": "Ledgerly", "description": "Bookkeeping", "tags": ["finance"],
         "rating": 4.5, "url": "https://ledgerly.example"},
        {"id": 7, "name": "InvoicePro", "tags": [], "url": "https://invoicepro.example"},
    ]))
}

async fn handle_match(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    state.record("match", body.clone()).await;
    if body["buyer_prompt"] == "quantum payroll" {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "no matches"}))).into_response();
    }
    if body["buyer_prompt"] == "explode" {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"results": [
        {"app_id": 7, "name": "InvoicePro", "similarity_percent": 92.5},
        {"app_id": 1, "name": "Ledgerly", "similarity_percent": 40},
    ]}))
    .into_response()
}

async fn handle_click(State(state): State<ServerState>, Json(body): Json<Value>) -> StatusCode {
    state.record("click", body).await;
    StatusCode::NO_CONTENT
}

async fn handle_cards() -> Json<Value> {
    Json(json!([
        {"id": 1, "title": "Dark mode", "upvote": 2, "number_of_requests": 5, "status": 0},
        {"id": 2, "title": "CSV export", "upvote": 9, "status": 1, "created_by_bexio": true},
        {"id": 3, "title": "SSO login"},
    ]))
}

async fn card_action(
    state: ServerState,
    route: &'static str,
    body: Value,
    upvote: u64,
    status: i64,
) -> Response {
    state.record(route, body.clone()).await;
    if body["card_id"] == "404" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Card not found"}))).into_response();
    }
    Json(json!({"id": body["card_id"], "title": "Dark mode", "upvote": upvote, "status": status}))
        .into_response()
}

async fn handle_upvote(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    card_action(state, "upvote", body, 3, 0).await
}

async fn handle_toggle(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    card_action(state, "toggle", body, 2, 1).await
}

async fn handle_dropcard(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("dropcard", body).await;
    Json(json!({"message": "Card dropped"}))
}

async fn handle_card_detail(Path(id): Path<String>) -> Response {
    if id == "404" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "id": id,
        "title": "Dark mode",
        "description": null,
        "status": 1,
        "number_of_requests": 5,
        "created_at": "2025-03-01T10:00:00",
        "updated_at": null,
    }))
    .into_response()
}

async fn handle_card_comments(Path(_id): Path<String>) -> Json<Value> {
    Json(json!([
        {"id": 11, "prompt_text": "app with dark theme", "comment_text": "eyes hurt",
         "created_at": "2025-03-02T08:30:00"},
    ]))
}

async fn spawn_marketplace_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/v1/match/interactive/start", post(handle_start))
        .route("/api/v1/match/interactive/continue", post(handle_continue))
        .route("/api/v1/match/interactive/finalize", post(handle_finalize))
        .route("/api/v1/compare", post(handle_compare))
        .route("/api/v1/backlog/cards", post(handle_create_card))
        .route("/api/v1/backlog/drop", post(handle_drop_card))
        .route("/api/v1/application/clicks/stats", get(handle_click_stats))
        .route("/api/v1/application/links", get(handle_links))
        .route("/api/v1/application/click", post(handle_click))
        .route("/api/v1/matching/match", post(handle_match))
        .route("/api/v1/cards", get(handle_cards))
        .route("/api/v1/cards/upvote", post(handle_upvote))
        .route("/api/v1/cards/toggle-status", post(handle_toggle))
        .route("/api/v1/cards/:id", get(handle_card_detail))
        .route("/api/v1/cards/:id/comments", get(handle_card_comments))
        .route("/api/v1/dropcard", post(handle_dropcard))
        .route("/api/no-match/no-match", post(handle_no_match))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn client_for(base: &str) -> MarketplaceClient {
    MarketplaceClient::new(format!("{base}/api/v1/"), format!("{base}/api/no-match"))
}

#[tokio::test]
async fn match_service_forwards_session_token_unchanged() {
    let (base, state) = spawn_marketplace_server().await;
    let service = client_for(&base).match_service();

    let started = service.start("I need invoicing software").await.expect("start");
    service
        .continue_session(&started.session, "under 50 CHF/month")
        .await
        .expect("continue");

    assert_eq!(
        state.bodies("start").await,
        vec![json!({"prompt_text": "I need invoicing software"})]
    );
    assert_eq!(
        state.bodies("continue").await,
        vec![json!({
            "session": {"id": "s-1", "turn": 1, "criteria": ["invoicing"]},
            "answer_text": "under 50 CHF/month",
        })]
    );
}

#[tokio::test]
async fn match_service_maps_error_responses() {
    let (base, _state) = spawn_marketplace_server().await;
    let service = HttpMatchService::new(format!("{base}/api/v1"));

    assert_eq!(
        service.start("explode").await.expect_err("500"),
        MatchServiceError::Status {
            status: 500,
            message: "HTTP error! status: 500".to_string()
        }
    );
    assert_eq!(
        service.start("reject").await.expect_err("422"),
        MatchServiceError::Status {
            status: 422,
            message: "prompt too short".to_string()
        }
    );
    assert!(matches!(
        service.start("malformed").await,
        Err(MatchServiceError::Decode(_))
    ));
}

#[tokio::test]
async fn interactive_search_completes_over_http() {
    let (base, state) = spawn_marketplace_server().await;
    let delivered = Arc::new(StdMutex::new(Vec::new()));
    let sink = delivered.clone();
    let search = InteractiveSearch::new(Arc::new(client_for(&base).match_service()))
        .with_result_handler(move |outcome| sink.lock().expect("lock").push(outcome.clone()));

    let step = search.start("I need invoicing software").await;
    assert_eq!(
        step,
        StepOutcome::NeedsMoreInput {
            question: "What's your budget?".to_string()
        }
    );
    assert_eq!(search.status().await, SearchStatus::NeedsMoreInput);

    search.submit_answer("under 50 CHF/month").await;

    let delivered = delivered.lock().expect("lock").clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].query, "invoicing software under 50 CHF/month");
    assert_eq!(delivered[0].results[0].name, "InvoicePro");
    assert_eq!(delivered[0].results[0].similarity_percent, 92.0);
    assert!(state.bodies("finalize").await.is_empty());
}

#[tokio::test]
async fn interactive_search_finalizes_with_default_limits() {
    let (base, state) = spawn_marketplace_server().await;
    let search = InteractiveSearch::new(Arc::new(client_for(&base).match_service()));

    let step = search.start("direct").await;

    assert!(matches!(step, StepOutcome::Completed(ref outcome) if outcome.query == "direct match"));
    assert_eq!(
        state.bodies("finalize").await,
        vec![json!({
            "session": {"id": "s-direct", "turn": 1},
            "top_k": 30,
            "top_n": 10,
        })]
    );
}

#[tokio::test]
async fn unreachable_backend_moves_search_to_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let search = InteractiveSearch::new(Arc::new(HttpMatchService::new(format!(
        "http://{addr}/api/v1"
    ))));
    let step = search.start("I need invoicing software").await;

    let snapshot = search.snapshot().await;
    assert_eq!(snapshot.status, SearchStatus::Error);
    assert!(!snapshot.has_session);
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.error.as_deref().unwrap_or_default().is_empty());
    assert!(matches!(step, StepOutcome::Failed(_)));
}

#[tokio::test]
async fn compare_returns_both_sides() {
    let (base, state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let comparison = client
        .compare_applications("Ledgerly", "InvoicePro")
        .await
        .expect("compare");

    assert_eq!(comparison.company_a.name, "Ledgerly");
    assert!(comparison.company_a.attributes[0].has);
    assert_eq!(
        comparison.company_a.attributes[0].kind,
        shared::domain::AttributeKind::Integration
    );
    assert!(comparison.company_b.highlights.is_empty());
    assert_eq!(
        state.bodies("compare").await,
        vec![json!({"company_a": "Ledgerly", "company_b": "InvoicePro"})]
    );
}

#[tokio::test]
async fn compare_surfaces_backend_detail() {
    let (base, _state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let err = client
        .compare_applications("unknown", "InvoicePro")
        .await
        .expect_err("must fail");

    match err {
        ServiceError::Api(api) => {
            assert_eq!(api.status, 404);
            assert_eq!(api.message, "Application 'unknown' not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn backlog_card_is_validated_before_posting() {
    let (base, state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let err = client
        .create_backlog_card("ab", "A description long enough")
        .await
        .expect_err("title too short");
    assert!(matches!(
        err,
        ServiceError::Validation(BacklogValidationError::Title { actual: 2, .. })
    ));
    assert!(state.bodies("backlog_cards").await.is_empty());

    let card = client
        .create_backlog_card("Dark mode", "Please add a dark theme to the marketplace")
        .await
        .expect("create");
    assert_eq!(card.card_id, CardId::new("card-42"));
    assert_eq!(card.title, "Dark mode");
}

#[tokio::test]
async fn drop_and_no_match_carry_timestamps() {
    let (base, state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let dropped = client
        .drop_backlog_card(&CardId::new("card-42"))
        .await
        .expect("drop");
    assert_eq!(dropped, json!({"status": "dropped"}));

    let err = client
        .drop_backlog_card(&CardId::new("missing"))
        .await
        .expect_err("404");
    assert!(err.to_string().contains("Failed to drop backlog card: 404"));

    client
        .submit_no_match("tax software for Liechtenstein", "nothing fits")
        .await
        .expect("no-match");

    let drop_body = &state.bodies("backlog_drop").await[0];
    assert_eq!(drop_body["id"], "card-42");
    assert!(drop_body["timestamp"]
        .as_str()
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .is_some());

    let no_match = &state.bodies("no_match").await[0];
    assert_eq!(no_match["prompt"], "tax software for Liechtenstein");
    assert_eq!(no_match["comment"], "nothing fits");
    assert!(no_match["timestamp"].is_string());
}

#[tokio::test]
async fn click_stats_feed_the_filters() {
    let (base, _state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let stats_list = client.click_stats().await.expect("stats");

    assert_eq!(stats::stat_categories(&stats_list), vec!["finance", "sales"]);
    let ranked = stats::filter_stats(&stats_list, "", "");
    assert_eq!(ranked[0].app_name, "Crm Hub");
}

#[tokio::test]
async fn catalogue_listing_decodes_numeric_ids() {
    let (base, _state) = spawn_marketplace_server().await;
    let apps = client_for(&base).list_applications().await.expect("links");

    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].id, AppId::new("1"));
    assert_eq!(catalogue::category_of(&apps[0]), "finance");
    assert_eq!(catalogue::category_of(&apps[1]), "General");
    assert_eq!(apps[1].url.as_deref(), Some("https://invoicepro.example"));
}

#[tokio::test]
async fn one_shot_match_treats_bad_request_as_no_matches() {
    let (base, state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let results = client
        .match_applications("invoicing", FinalizeLimits::default())
        .await
        .expect("match");
    assert_eq!(results[0].app_id, AppId::new("7"));
    assert_eq!(results[1].similarity_percent, 40.0);
    assert_eq!(
        state.bodies("match").await[0],
        json!({"buyer_prompt": "invoicing", "top_k": 30, "top_n": 10})
    );

    let none = client
        .match_applications("quantum payroll", FinalizeLimits::default())
        .await
        .expect("400 is no matches");
    assert!(none.is_empty());

    let err = client
        .match_applications("explode", FinalizeLimits::default())
        .await
        .expect_err("500");
    assert!(matches!(err, ServiceError::Api(ApiException { status: 500, .. })));
}

#[tokio::test]
async fn click_tracking_posts_the_app_id() {
    let (base, state) = spawn_marketplace_server().await;

    client_for(&base)
        .track_click(&AppId::new("7"))
        .await
        .expect("click");

    assert_eq!(state.bodies("click").await, vec![json!({"app_id": "7"})]);
}

#[tokio::test]
async fn community_cards_are_ordered_by_upvotes() {
    let (base, _state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let backlog = client.list_cards().await.expect("cards");
    assert_eq!(backlog[0].id, CardId::new("1"));
    assert_eq!(backlog[2].upvote, 0);

    let community = client.community_cards().await.expect("community");
    let titles: Vec<_> = community.iter().map(|card| card.title.as_str()).collect();
    assert_eq!(titles, vec!["CSV export", "Dark mode", "SSO login"]);
    assert!(community[0].is_completed());
    assert!(community[0].created_by_bexio);
}

#[tokio::test]
async fn card_actions_send_card_id_and_return_updated_card() {
    let (base, state) = spawn_marketplace_server().await;
    let client = client_for(&base);
    let id = CardId::new("5");

    let upvoted = client.upvote_card(&id).await.expect("upvote");
    assert_eq!(upvoted.upvote, 3);

    let toggled = client.toggle_card_status(&id).await.expect("toggle");
    assert!(toggled.is_completed());

    let dropped = client.discard_card(&id).await.expect("dropcard");
    assert_eq!(dropped.message.as_deref(), Some("Card dropped"));

    assert_eq!(state.bodies("upvote").await, vec![json!({"card_id": "5"})]);
    assert_eq!(state.bodies("toggle").await, vec![json!({"card_id": "5"})]);
    assert_eq!(state.bodies("dropcard").await, vec![json!({"card_id": "5"})]);

    let err = client
        .upvote_card(&CardId::new("404"))
        .await
        .expect_err("missing card");
    assert_eq!(err.to_string(), "backend rejected request with status 404: Card not found");
}

#[tokio::test]
async fn card_detail_merges_comments() {
    let (base, _state) = spawn_marketplace_server().await;
    let client = client_for(&base);

    let detail = client.card_detail(&CardId::new("3")).await.expect("detail");
    assert_eq!(detail.id, CardId::new("3"));
    assert!(detail.is_completed());
    assert_eq!(detail.description, None);
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].comment_text.as_deref(), Some("eyes hurt"));

    let err = client
        .card_detail(&CardId::new("404"))
        .await
        .expect_err("404");
    assert!(err.to_string().contains("HTTP error! status: 404"));
}
