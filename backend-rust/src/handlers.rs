use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use schedule_types::{SlotRange, TimeOfDay};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::{AuthEngine, Caller};
use crate::booking_engine::{BookingEngine, CreateBookingRequest};
use crate::error::{AppError, AppResult, LocalizedError};
use crate::i18n::{translate, Lang};
use crate::payments::{PaymentService, WebhookNotification};
use crate::state::{Party, RecurringAvailability, SpecificAvailability};

// ─── Shared State ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub payments: Arc<PaymentService>,
    pub auth: Arc<AuthEngine>,
}

type ApiResult = Result<Response, LocalizedError>;

// ─── Extractors ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct LangParam {
    lang: Option<String>,
}

fn lang_of(parts: &Parts) -> Lang {
    let query = Query::<LangParam>::try_from_uri(&parts.uri)
        .map(|Query(p)| p.lang)
        .unwrap_or_default();
    Lang::from_request(&parts.headers, query.as_deref())
}

/// Authenticated caller plus the locale the response is written in.
pub struct Authed {
    pub caller: Caller,
    pub lang: Lang,
}

#[async_trait]
impl FromRequestParts<AppState> for Authed {
    type Rejection = LocalizedError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let lang = lang_of(parts);
        let caller = state
            .auth
            .caller_from_headers(&parts.headers)
            .map_err(|e| e.in_lang(lang))?;
        Ok(Self { caller, lang })
    }
}

// ─── Responses ────────────────────────────────────────────────────────────────

fn success<T: Serialize>(status: StatusCode, lang: Lang, key: &str, data: T) -> Response {
    (
        status,
        Json(json!({
            "message": translate(key, lang),
            "data": data,
        })),
    )
        .into_response()
}

fn ok<T: Serialize>(lang: Lang, data: T) -> Response {
    success(StatusCode::OK, lang, "common.success", data)
}

fn body<T>(lang: Lang, payload: Result<Json<T>, JsonRejection>) -> Result<T, LocalizedError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| {
            debug!("Rejected body: {e}");
            AppError::Validation("validation.invalidFormat").in_lang(lang)
        })
}

fn query<T>(lang: Lang, q: Result<Query<T>, QueryRejection>) -> Result<T, LocalizedError> {
    q.map(|Query(v)| v).map_err(|e| {
        debug!("Rejected query: {e}");
        AppError::Validation("validation.invalidFormat").in_lang(lang)
    })
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Bookings
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/me", get(my_bookings))
        .route("/api/bookings/next-service", get(next_service))
        .route("/api/bookings/today-schedule", get(today_schedule))
        .route("/api/bookings/check-availability", get(check_availability))
        .route("/api/bookings/caddie/:caddie_id/availability", get(caddie_availability))
        .route("/api/bookings/caddie/:caddie_id/alternatives", get(caddie_alternatives))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/accept", put(accept_booking))
        .route("/api/bookings/:id/reject", put(reject_booking))
        .route("/api/bookings/:id/start", post(start_booking))
        .route("/api/bookings/:id/complete", put(complete_booking))
        .route("/api/bookings/:id/cancel", put(cancel_booking))
        .route("/api/bookings/:id/rate", put(rate_caddie))
        .route("/api/bookings/:id/rate-golfer", put(rate_golfer))
        // Caddies
        .route("/api/caddies/search", get(search_caddies))
        .route("/api/caddies/me/stats", get(month_stats))
        .route("/api/caddies/me/availability", put(set_specific_availability))
        .route("/api/caddies/me/recurring-availability", put(set_recurring_availability))
        // Payments
        .route("/api/payments/webhook", post(payment_webhook))
        .route("/api/payments/pending-liquidations", get(pending_liquidations))
        .route("/api/payments/booking/:id", get(payment_for_booking))
        .route("/api/payments/:id", post(create_payment))
        .route("/api/payments/:id/liquidate", put(liquidate_payment))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "serverTime": Utc::now().timestamp_millis() }))
}

// ─── Booking Handlers ─────────────────────────────────────────────────────────

async fn create_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> ApiResult {
    let req = body(lang, payload)?;
    let booking = state
        .engine
        .create_booking(&caller, req)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::CREATED, lang, "booking.created", booking))
}

async fn my_bookings(State(state): State<AppState>, Authed { caller, lang }: Authed) -> ApiResult {
    let bookings = state
        .engine
        .bookings_for_caller(&caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, bookings))
}

async fn next_service(State(state): State<AppState>, Authed { caller, lang }: Authed) -> ApiResult {
    let next = state
        .engine
        .next_service(&caller, Utc::now())
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, next))
}

async fn today_schedule(State(state): State<AppState>, Authed { caller, lang }: Authed) -> ApiResult {
    let today = state
        .engine
        .today_schedule(&caller, Utc::now())
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, today))
}

async fn get_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let booking = state
        .engine
        .get_booking(id, &caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, booking))
}

async fn accept_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let booking = state.engine.accept(id, &caller).await.map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "booking.accepted", booking))
}

async fn reject_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let booking = state.engine.reject(id, &caller).await.map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "booking.rejected", booking))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    qr_code: Option<String>,
}

async fn start_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
    payload: Result<Json<StartBody>, JsonRejection>,
) -> ApiResult {
    let qr = body(lang, payload)?
        .qr_code
        .ok_or_else(|| AppError::Validation("validation.required").in_lang(lang))?;
    let booking = state
        .engine
        .start(id, &caller, &qr)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "booking.started", booking))
}

async fn complete_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let booking = state.engine.complete(id, &caller).await.map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "booking.completed", booking))
}

#[derive(Debug, Default, Deserialize)]
struct CancelBody {
    reason: Option<String>,
}

async fn cancel_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelBody>>,
) -> ApiResult {
    let reason = payload.and_then(|Json(b)| b.reason);
    let outcome = state
        .engine
        .cancel(id, &caller, reason, Utc::now())
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "booking.cancelled", outcome))
}

#[derive(Debug, Deserialize)]
struct RateBody {
    rating: Option<i64>,
    review: Option<String>,
}

async fn rate(state: &AppState, caller: &Caller, lang: Lang, id: Uuid, rated: Party, rb: RateBody) -> ApiResult {
    let rating = rb
        .rating
        .ok_or_else(|| AppError::Validation("validation.required").in_lang(lang))?;
    let rating = u8::try_from(rating)
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| AppError::Validation("rating.invalid").in_lang(lang))?;
    let booking = state
        .engine
        .rate(id, caller, rated, rating, rb.review)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "common.updated", booking))
}

async fn rate_caddie(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
    payload: Result<Json<RateBody>, JsonRejection>,
) -> ApiResult {
    let rb = body(lang, payload)?;
    rate(&state, &caller, lang, id, Party::Caddie, rb).await
}

async fn rate_golfer(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
    payload: Result<Json<RateBody>, JsonRejection>,
) -> ApiResult {
    let rb = body(lang, payload)?;
    rate(&state, &caller, lang, id, Party::Golfer, rb).await
}

// ─── Availability Handlers ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotQuery {
    caddie_id: Option<Uuid>,
    club_id: Option<Uuid>,
    date: Option<NaiveDate>,
    start_time: Option<String>,
    end_time: Option<String>,
}

fn window(start: &str, end: &str) -> AppResult<SlotRange> {
    let start = TimeOfDay::parse_hhmm(start).map_err(|_| AppError::Validation("booking.invalidTime"))?;
    let end = TimeOfDay::parse_hhmm(end).map_err(|_| AppError::Validation("booking.invalidTime"))?;
    SlotRange::from_times(start, end).map_err(|_| AppError::Validation("booking.invalidTimeRange"))
}

/// `(club, date, window)`; the window is mandatory.
fn full_query(q: &SlotQuery) -> AppResult<(Uuid, NaiveDate, SlotRange)> {
    match (q.club_id, q.date, q.start_time.as_deref(), q.end_time.as_deref()) {
        (Some(club), Some(date), Some(start), Some(end)) => Ok((club, date, window(start, end)?)),
        _ => Err(AppError::Validation("validation.required")),
    }
}

async fn caddie_availability(
    State(state): State<AppState>,
    Authed { lang, .. }: Authed,
    Path(caddie_id): Path<Uuid>,
    q: Result<Query<SlotQuery>, QueryRejection>,
) -> ApiResult {
    let q = query(lang, q)?;
    let (Some(club_id), Some(date)) = (q.club_id, q.date) else {
        return Err(AppError::Validation("validation.required").in_lang(lang));
    };
    let requested = match (q.start_time.as_deref(), q.end_time.as_deref()) {
        (Some(start), Some(end)) => Some(window(start, end).map_err(|e| e.in_lang(lang))?),
        _ => None,
    };
    let resolution = state
        .engine
        .resolve_availability(caddie_id, date, club_id, requested)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, resolution))
}

async fn caddie_alternatives(
    State(state): State<AppState>,
    Authed { lang, .. }: Authed,
    Path(caddie_id): Path<Uuid>,
    q: Result<Query<SlotQuery>, QueryRejection>,
) -> ApiResult {
    let q = query(lang, q)?;
    let (club_id, date, requested) = full_query(&q).map_err(|e| e.in_lang(lang))?;
    let suggestions = state
        .engine
        .suggest_alternatives(caddie_id, club_id, date, requested)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, suggestions))
}

async fn check_availability(
    State(state): State<AppState>,
    Authed { lang, .. }: Authed,
    q: Result<Query<SlotQuery>, QueryRejection>,
) -> ApiResult {
    let q = query(lang, q)?;
    let caddie_id = q
        .caddie_id
        .ok_or_else(|| AppError::Validation("validation.required").in_lang(lang))?;
    let (club_id, date, requested) = full_query(&q).map_err(|e| e.in_lang(lang))?;
    let check = state
        .engine
        .check_availability(caddie_id, club_id, date, requested)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, check))
}

async fn search_caddies(
    State(state): State<AppState>,
    Authed { lang, .. }: Authed,
    q: Result<Query<SlotQuery>, QueryRejection>,
) -> ApiResult {
    let q = query(lang, q)?;
    let (club_id, date, requested) = full_query(&q).map_err(|e| e.in_lang(lang))?;
    let caddies = state
        .engine
        .search_caddies(club_id, date, requested)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, caddies))
}

async fn month_stats(State(state): State<AppState>, Authed { caller, lang }: Authed) -> ApiResult {
    let stats = state
        .engine
        .month_stats(&caller, Utc::now())
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, stats))
}

#[derive(Debug, Deserialize)]
struct SpecificBody {
    availability: Vec<SpecificAvailability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecurringBody {
    recurring_availability: Vec<RecurringAvailability>,
}

async fn set_specific_availability(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    payload: Result<Json<SpecificBody>, JsonRejection>,
) -> ApiResult {
    let b = body(lang, payload)?;
    let caddie = state
        .engine
        .set_specific_availability(&caller, b.availability)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "common.updated", caddie))
}

async fn set_recurring_availability(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    payload: Result<Json<RecurringBody>, JsonRejection>,
) -> ApiResult {
    let b = body(lang, payload)?;
    let caddie = state
        .engine
        .set_recurring_availability(&caller, b.recurring_availability)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "common.updated", caddie))
}

// ─── Payment Handlers ─────────────────────────────────────────────────────────

async fn create_payment(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(booking_id): Path<Uuid>,
) -> ApiResult {
    let checkout = state
        .payments
        .create_payment(booking_id, &caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::CREATED, lang, "payment.created", checkout))
}

async fn payment_for_booking(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(booking_id): Path<Uuid>,
) -> ApiResult {
    let payment = state
        .payments
        .payment_for_booking(booking_id, &caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, payment))
}

/// Always answers 200 at once; the provider's retries drive eventual consistency.
async fn payment_webhook(State(state): State<AppState>, raw: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<WebhookNotification>(&raw) {
        Ok(notification) => {
            let payments = state.payments.clone();
            tokio::spawn(async move {
                match payments.process_webhook(notification).await {
                    Ok(outcome) => debug!("Webhook processed: {outcome:?}"),
                    Err(e) => error!("Webhook processing failed: {e:#}"),
                }
            });
        }
        Err(e) => warn!("Webhook body ignored: {e}"),
    }
    (StatusCode::OK, Json(json!({ "received": true })))
}

async fn pending_liquidations(State(state): State<AppState>, Authed { caller, lang }: Authed) -> ApiResult {
    let payments = state
        .payments
        .pending_liquidations(&caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(ok(lang, payments))
}

async fn liquidate_payment(
    State(state): State<AppState>,
    Authed { caller, lang }: Authed,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let payment = state
        .payments
        .mark_as_liquidated(id, &caller)
        .await
        .map_err(|e| e.in_lang(lang))?;
    Ok(success(StatusCode::OK, lang, "payment.liquidated", payment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::config::AppConfig;
    use crate::notify::RecordingSink;
    use crate::payments::DisabledGateway;
    use crate::persistence::{BookingStore, JsonFileStore};
    use crate::state::{Caddie, Club, Golfer, Role, VettingStatus};
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::Duration;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        golfer_token: String,
        caddie_token: String,
        caddie_id: Uuid,
        club_id: Uuid,
    }

    async fn harness() -> Harness {
        let config = AppConfig::default();
        let store = Arc::new(JsonFileStore::in_memory());
        let auth = Arc::new(AuthEngine::new(&config.jwt_secret));

        let club = Club { id: Uuid::new_v4(), name: "Olivos".into(), city: String::new(), time_zone: None };
        let golfer = Golfer {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: String::new(),
            handicap: None,
            rating: 0.0,
            total_ratings: 0,
        };
        let caddie = Caddie {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: String::new(),
            status: VettingStatus::Approved,
            suggested_rate: 3000,
            clubs: vec![club.id],
            availability: vec![],
            recurring_availability: vec![RecurringAvailability {
                club_id: club.id,
                day_of_week: 1,
                time_slots: vec!["9-12".into()],
            }],
            rating: 0.0,
            total_ratings: 0,
        };
        store.save_club(&club).await.unwrap();
        store.save_golfer(&golfer).await.unwrap();
        store.save_caddie(&caddie).await.unwrap();

        let audit = AuditLogger::disabled();
        let engine = BookingEngine::new(store.clone(), Arc::new(RecordingSink::new()), audit.clone(), &config);
        let payments = PaymentService::new(store, Arc::new(DisabledGateway), audit, config.commission_percentage);

        let golfer_token = auth.issue(golfer.user_id, "g@example.com", Role::Golfer, Duration::hours(1)).unwrap();
        let caddie_token = auth.issue(caddie.user_id, "c@example.com", Role::Caddie, Duration::hours(1)).unwrap();
        let app = router(AppState {
            engine: Arc::new(engine),
            payments: Arc::new(payments),
            auth,
        });
        Harness { app, golfer_token, caddie_token, caddie_id: caddie.id, club_id: club.id }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json");
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness().await;
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_token_is_localized_unauthorized() {
        let h = harness().await;
        let req = Request::builder()
            .uri("/api/bookings/me?lang=en")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["key"], "errors.unauthorized");
        assert_eq!(body["message"], "Not authenticated");
    }

    #[tokio::test]
    async fn create_then_accept_over_http() {
        let h = harness().await;
        let create = json!({
            "caddieId": h.caddie_id,
            "clubId": h.club_id,
            "date": "2026-03-02",
            "startTime": "09:00",
            "endTime": "11:00",
        });
        let (status, body) = send(&h.app, authed("POST", "/api/bookings?lang=en", &h.golfer_token, Some(create.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Booking created");
        assert_eq!(body["data"]["totalPrice"], 6000);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&h.app, authed("POST", "/api/bookings", &h.golfer_token, Some(create))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["key"], "booking.alreadyBooked");
        assert_eq!(body["error"], "validation");

        let uri = format!("/api/bookings/{id}/accept");
        let (status, body) = send(&h.app, authed("PUT", &uri, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["key"], "errors.forbidden");

        let (status, body) = send(&h.app, authed("PUT", &uri, &h.caddie_token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "accepted");

        let (status, body) = send(&h.app, authed("PUT", &uri, &h.caddie_token, None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["key"], "booking.invalidStatus");
    }

    #[tokio::test]
    async fn alternatives_require_a_window() {
        let h = harness().await;
        let uri = format!(
            "/api/bookings/caddie/{}/alternatives?clubId={}&date=2026-03-03",
            h.caddie_id, h.club_id
        );
        let (status, body) = send(&h.app, authed("GET", &uri, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["key"], "validation.required");

        let uri = format!("{uri}&startTime=09:00&endTime=10:00");
        let (status, body) = send(&h.app, authed("GET", &uri, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["alternatives"][0]["date"], "2026-03-09");
    }

    #[tokio::test]
    async fn search_finds_free_caddies_until_booked() {
        let h = harness().await;
        let uri = format!(
            "/api/caddies/search?clubId={}&date=2026-03-02&startTime=10:00&endTime=11:00",
            h.club_id
        );
        let (status, body) = send(&h.app, authed("GET", &uri, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], h.caddie_id.to_string());

        let create = json!({
            "caddieId": h.caddie_id,
            "clubId": h.club_id,
            "date": "2026-03-02",
            "startTime": "10:00",
            "endTime": "12:00",
        });
        let (status, _) = send(&h.app, authed("POST", "/api/bookings", &h.golfer_token, Some(create))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&h.app, authed("GET", &uri, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));

        let no_window = format!("/api/caddies/search?clubId={}&date=2026-03-02", h.club_id);
        let (status, body) = send(&h.app, authed("GET", &no_window, &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["key"], "validation.required");
    }

    #[tokio::test]
    async fn month_stats_are_for_caddies() {
        let h = harness().await;
        let (status, body) = send(&h.app, authed("GET", "/api/caddies/me/stats", &h.caddie_token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalBookings"], 0);
        assert_eq!(body["data"]["estimatedEarnings"], 0);

        let (status, _) = send(&h.app, authed("GET", "/api/caddies/me/stats", &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_before_lookup() {
        let h = harness().await;
        let uri = format!("/api/bookings/{}/rate", Uuid::new_v4());
        for rating in [0, 6, 300, -1] {
            let (status, body) = send(&h.app, authed("PUT", &uri, &h.golfer_token, Some(json!({ "rating": rating })))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "rating {rating}");
            assert_eq!(body["key"], "rating.invalid");
        }
        // in range, so the missing booking is what fails
        let (status, body) = send(&h.app, authed("PUT", &uri, &h.golfer_token, Some(json!({ "rating": 5 })))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["key"], "booking.notFound");
    }

    #[tokio::test]
    async fn webhook_always_acknowledges() {
        let h = harness().await;
        let req = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .body(Body::from("not json"))
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
    }

    #[tokio::test]
    async fn liquidations_are_admin_only() {
        let h = harness().await;
        let (status, _) = send(&h.app, authed("GET", "/api/payments/pending-liquidations", &h.golfer_token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
