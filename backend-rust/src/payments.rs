//! # payments
//!
//! Checkout preferences, the provider webhook and caddie payouts ("liquidation").
//! Cancellation records what is owed; the provider moves the money and its
//! `refunded` notification closes the refund on the booking.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::auth::Caller;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::persistence::BookingStore;
use crate::state::{BookingStatus, Payment, PaymentStatus, RefundStatus, Role};

// ─── Gateway ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PreferenceRequest {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub title: String,
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct Preference {
    pub id: String,
    pub init_point: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, req: &PreferenceRequest) -> anyhow::Result<Preference>;
}

const MERCADOPAGO_PREFERENCES_URL: &str = "https://api.mercadopago.com/checkout/preferences";

/// Checkout Pro preferences over the REST API.
pub struct MercadoPagoGateway {
    client: reqwest::Client,
    access_token: String,
    frontend_url: String,
    backend_url: String,
}

#[derive(Deserialize)]
struct MpPreference {
    id: String,
    init_point: Option<String>,
}

impl MercadoPagoGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: config.mercadopago_access_token.clone(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_preference(&self, req: &PreferenceRequest) -> anyhow::Result<Preference> {
        let front = &self.frontend_url;
        let body = json!({
            "items": [{
                "id": req.booking_id.to_string(),
                "title": req.title,
                "description": req.description,
                "quantity": 1,
                "unit_price": req.amount,
                "currency_id": "ARS",
            }],
            "back_urls": {
                "success": format!("{front}/payment/success"),
                "failure": format!("{front}/payment/failure"),
                "pending": format!("{front}/payment/pending"),
            },
            "auto_return": "approved",
            "external_reference": req.payment_id.to_string(),
            "notification_url": format!("{}/api/payments/webhook", self.backend_url),
            "statement_descriptor": "CADIAPP",
            "payment_methods": { "installments": 1 },
        });

        let pref: MpPreference = self
            .client
            .post(MERCADOPAGO_PREFERENCES_URL)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("preference request")?
            .error_for_status()
            .context("preference rejected")?
            .json()
            .await
            .context("preference response")?;

        Ok(Preference {
            id: pref.id,
            init_point: pref.init_point,
        })
    }
}

/// Used when no provider token is configured.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_preference(&self, _req: &PreferenceRequest) -> anyhow::Result<Preference> {
        bail!("payment provider not configured")
    }
}

pub fn gateway_from_config(config: &AppConfig) -> Arc<dyn PaymentGateway> {
    if config.mercadopago_access_token.is_empty() {
        warn!("MERCADOPAGO_ACCESS_TOKEN not set, payment creation disabled");
        Arc::new(DisabledGateway)
    } else {
        Arc::new(MercadoPagoGateway::new(config))
    }
}

// ─── Webhook Payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    /// The provider sends numeric or string ids.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    Recorded,
    Settled,
    Refunded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub payment: Payment,
    pub preference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_point: Option<String>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    audit: AuditLogger,
    commission_percentage: i64,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        audit: AuditLogger,
        commission_percentage: i64,
    ) -> Self {
        Self {
            store,
            gateway,
            audit,
            commission_percentage,
        }
    }

    /// Opens (or reopens) the payment for an accepted booking and asks the
    /// provider for a checkout preference.
    pub async fn create_payment(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Checkout> {
        caller.require(Role::Golfer)?;
        let mut booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(AppError::NotFound("booking.notFound"))?;
        let golfer = self.store.find_golfer_by_user(caller.user_id).await?;
        if golfer.map(|g| g.id) != Some(booking.golfer_id) {
            return Err(AppError::forbidden());
        }
        if booking.status != BookingStatus::Accepted {
            return Err(AppError::Validation("payment.bookingNotAccepted"));
        }

        let existing = self.store.find_payment_by_booking(booking_id).await?;
        if existing.as_ref().is_some_and(|p| p.status == PaymentStatus::Completed) {
            return Err(AppError::Validation("payment.alreadyPaid"));
        }

        let caddie = self
            .store
            .get_caddie(booking.caddie_id)
            .await?
            .ok_or(AppError::NotFound("caddie.notFound"))?;
        let club_name = self
            .store
            .get_club(booking.club_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_default();

        let amount = caddie.suggested_rate;
        let commission = (amount as f64 * self.commission_percentage as f64 / 100.0).round() as i64;
        let now = Utc::now();

        let mut payment = match existing {
            Some(mut p) => {
                p.status = PaymentStatus::Pending;
                p.amount = amount;
                p.commission = commission;
                p.caddie_amount = amount - commission;
                p.updated_at = now;
                p
            }
            None => Payment {
                id: Uuid::new_v4(),
                booking_id,
                golfer_id: booking.golfer_id,
                caddie_id: booking.caddie_id,
                amount,
                commission,
                caddie_amount: amount - commission,
                status: PaymentStatus::Pending,
                provider_preference_id: None,
                provider_payment_id: None,
                provider_status: None,
                paid_at: None,
                liquidated_at: None,
                created_at: now,
                updated_at: now,
            },
        };

        let request = PreferenceRequest {
            payment_id: payment.id,
            booking_id,
            title: format!("Servicio de Caddie - {club_name}"),
            description: format!("Fecha: {} - {}", booking.date, booking.slot()),
            amount,
        };
        let preference = self.gateway.create_preference(&request).await.map_err(|e| {
            warn!("Preference for payment {} failed: {e:#}", payment.id);
            AppError::Validation("payment.creationFailed")
        })?;

        payment.provider_preference_id = Some(preference.id.clone());
        self.store.save_payment(&payment).await?;

        if booking.payment_id != Some(payment.id) {
            booking.payment_id = Some(payment.id);
            booking.updated_at = now;
            if !self.store.update_booking(&booking, BookingStatus::Accepted).await? {
                warn!("Booking {booking_id} changed while linking payment {}", payment.id);
            }
        }

        info!("Payment {} opened for booking {booking_id}: {amount} (commission {commission})", payment.id);
        Ok(Checkout {
            payment,
            preference_id: preference.id,
            init_point: preference.init_point,
        })
    }

    /// Applies one provider notification. Runs off the request path; the caller
    /// only logs the error.
    pub async fn process_webhook(&self, notification: WebhookNotification) -> anyhow::Result<WebhookOutcome> {
        if notification.kind.as_deref() != Some("payment") {
            debug!("Webhook ignored: type {:?}", notification.kind);
            return Ok(WebhookOutcome::Ignored);
        }
        let Some(data) = notification.data else {
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(provider_id) = data.id.as_ref().map(value_to_id).filter(|s| !s.is_empty()) else {
            return Ok(WebhookOutcome::Ignored);
        };
        if !matches!(notification.action.as_deref(), Some("payment.created" | "payment.updated")) {
            return Ok(WebhookOutcome::Ignored);
        }

        let reference = notification
            .external_reference
            .ok_or_else(|| anyhow!("webhook for {provider_id} has no external_reference"))?;
        let payment_id: Uuid = reference
            .parse()
            .with_context(|| format!("external_reference '{reference}'"))?;
        let mut payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| anyhow!("webhook references unknown payment {payment_id}"))?;

        let status = data.status.unwrap_or_else(|| "pending".to_string());
        let now = Utc::now();
        payment.provider_payment_id = Some(provider_id);
        payment.provider_status = Some(status.clone());
        payment.updated_at = now;

        let settled = status == "approved" && payment.status != PaymentStatus::Completed;
        let refunded = status == "refunded" && payment.status == PaymentStatus::Completed;
        if settled {
            payment.status = PaymentStatus::Completed;
            payment.paid_at = Some(now);
        } else if refunded {
            payment.status = PaymentStatus::Refunded;
        } else if matches!(status.as_str(), "rejected" | "cancelled") && payment.status == PaymentStatus::Pending {
            payment.status = PaymentStatus::Failed;
        }
        self.store.save_payment(&payment).await?;

        if refunded {
            self.close_refund(&payment).await?;
            info!("Payment {payment_id} refunded");
            self.audit.log_refund(&payment).await;
            return Ok(WebhookOutcome::Refunded);
        }
        if !settled {
            info!("Payment {payment_id}: provider status {status}");
            return Ok(WebhookOutcome::Recorded);
        }

        if let Some(mut booking) = self.store.get_booking(payment.booking_id).await? {
            let prior = booking.status;
            if matches!(prior, BookingStatus::Accepted | BookingStatus::InProgress) {
                booking.status = BookingStatus::Completed;
                booking.updated_at = now;
                if self.store.update_booking(&booking, prior).await? {
                    self.audit.log_status_change(booking.id, prior, BookingStatus::Completed).await;
                }
            } else {
                warn!("Payment {payment_id} settled for booking {} in state {}", booking.id, prior.as_str());
            }
        }

        info!("Payment {payment_id} settled");
        self.audit.log_payment_settled(&payment).await;
        Ok(WebhookOutcome::Settled)
    }

    /// Marks the refund recorded at cancellation as done.
    async fn close_refund(&self, payment: &Payment) -> anyhow::Result<()> {
        let Some(mut booking) = self.store.get_booking(payment.booking_id).await? else {
            bail!("refunded payment {} has no booking {}", payment.id, payment.booking_id);
        };
        let owes_refund = booking
            .cancellation
            .as_ref()
            .is_some_and(|c| c.refund_status == Some(RefundStatus::Pending));
        if !owes_refund {
            warn!("Payment {} refunded but booking {} owes no refund", payment.id, booking.id);
            return Ok(());
        }
        if let Some(c) = booking.cancellation.as_mut() {
            c.refund_status = Some(RefundStatus::Completed);
        }
        booking.updated_at = Utc::now();
        if !self.store.update_booking(&booking, BookingStatus::Cancelled).await? {
            warn!("Booking {} changed while closing its refund", booking.id);
        }
        Ok(())
    }

    pub async fn payment_for_booking(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Payment> {
        let payment = self
            .store
            .find_payment_by_booking(booking_id)
            .await?
            .ok_or(AppError::NotFound("payment.notFound"))?;
        let allowed = match caller.role {
            Role::Admin => true,
            Role::Golfer => self
                .store
                .find_golfer_by_user(caller.user_id)
                .await?
                .is_some_and(|g| g.id == payment.golfer_id),
            Role::Caddie => self
                .store
                .find_caddie_by_user(caller.user_id)
                .await?
                .is_some_and(|c| c.id == payment.caddie_id),
        };
        if allowed {
            Ok(payment)
        } else {
            Err(AppError::forbidden())
        }
    }

    pub async fn mark_as_liquidated(&self, payment_id: Uuid, caller: &Caller) -> AppResult<Payment> {
        caller.require(Role::Admin)?;
        let mut payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(AppError::NotFound("payment.notFound"))?;
        if payment.status != PaymentStatus::Completed {
            return Err(AppError::Validation("payment.notCompleted"));
        }
        if payment.liquidated_at.is_some() {
            return Err(AppError::Validation("payment.alreadyLiquidated"));
        }

        let now = Utc::now();
        payment.liquidated_at = Some(now);
        payment.updated_at = now;
        self.store.save_payment(&payment).await?;

        info!("Payment {payment_id} liquidated: {} to caddie {}", payment.caddie_amount, payment.caddie_id);
        self.audit.log_liquidation(&payment).await;
        Ok(payment)
    }

    /// Completed, unsettled payments, most recently paid first.
    pub async fn pending_liquidations(&self, caller: &Caller) -> AppResult<Vec<Payment>> {
        caller.require(Role::Admin)?;
        Ok(self.store.payments_pending_liquidation().await?)
    }
}

fn value_to_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Booking, Caddie, Cancellation, Club, Golfer, Party, VettingStatus};
    use chrono::NaiveDate;
    use schedule_types::TimeOfDay;

    struct FakeGateway;

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_preference(&self, req: &PreferenceRequest) -> anyhow::Result<Preference> {
            Ok(Preference {
                id: format!("pref-{}", req.payment_id),
                init_point: Some("https://checkout.example/pay".into()),
            })
        }
    }

    struct Fixture {
        service: PaymentService,
        store: Arc<crate::persistence::JsonFileStore>,
        golfer: Caller,
        admin: Caller,
        booking_id: Uuid,
    }

    async fn fixture(status: BookingStatus, gateway: Arc<dyn PaymentGateway>) -> Fixture {
        let store = Arc::new(crate::persistence::JsonFileStore::in_memory());
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
            suggested_rate: 5000,
            clubs: vec![club.id],
            availability: vec![],
            recurring_availability: vec![],
            rating: 0.0,
            total_ratings: 0,
        };
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            golfer_id: golfer.id,
            caddie_id: caddie.id,
            club_id: club.id,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: TimeOfDay::parse_hhmm("09:00").unwrap(),
            end_time: TimeOfDay::parse_hhmm("11:00").unwrap(),
            total_price: 10000,
            status,
            qr_code: None,
            caddie_rating: None,
            golfer_rating: None,
            payment_id: None,
            cancellation: None,
            created_at: now,
            updated_at: now,
        };
        store.save_club(&club).await.unwrap();
        store.save_golfer(&golfer).await.unwrap();
        store.save_caddie(&caddie).await.unwrap();
        store.insert_booking_if_free(&booking).await.unwrap();

        Fixture {
            service: PaymentService::new(store.clone(), gateway, AuditLogger::disabled(), 10),
            store,
            golfer: Caller { user_id: golfer.user_id, role: Role::Golfer },
            admin: Caller { user_id: Uuid::new_v4(), role: Role::Admin },
            booking_id: booking.id,
        }
    }

    fn approved(payment_id: Uuid) -> WebhookNotification {
        serde_json::from_value(json!({
            "type": "payment",
            "action": "payment.updated",
            "data": { "id": 123456789, "status": "approved" },
            "external_reference": payment_id.to_string(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_splits_commission_and_links_booking() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let checkout = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        assert_eq!(checkout.payment.amount, 5000);
        assert_eq!(checkout.payment.commission, 500);
        assert_eq!(checkout.payment.caddie_amount, 4500);
        assert_eq!(checkout.preference_id, format!("pref-{}", checkout.payment.id));

        let booking = f.store.get_booking(f.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.payment_id, Some(checkout.payment.id));

        // a second attempt reuses the pending record
        let again = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        assert_eq!(again.payment.id, checkout.payment.id);
    }

    #[tokio::test]
    async fn create_requires_accepted_booking_and_working_gateway() {
        let f = fixture(BookingStatus::Pending, Arc::new(FakeGateway)).await;
        let err = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap_err();
        assert_eq!(err.translation_key(), "payment.bookingNotAccepted");

        let f = fixture(BookingStatus::Accepted, Arc::new(DisabledGateway)).await;
        let err = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap_err();
        assert_eq!(err.translation_key(), "payment.creationFailed");
    }

    #[tokio::test]
    async fn approved_webhook_settles_payment_and_completes_booking() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let checkout = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();

        let outcome = f.service.process_webhook(approved(checkout.payment.id)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Settled);

        let payment = f.store.get_payment(checkout.payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.provider_payment_id.as_deref(), Some("123456789"));
        assert!(payment.paid_at.is_some());
        let booking = f.store.get_booking(f.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);

        let err = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap_err();
        // booking is completed now, so it is no longer payable
        assert_eq!(err.translation_key(), "payment.bookingNotAccepted");
    }

    #[tokio::test]
    async fn unrelated_or_unknown_webhooks() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let merchant_order: WebhookNotification = serde_json::from_value(json!({ "type": "merchant_order" })).unwrap();
        assert_eq!(f.service.process_webhook(merchant_order).await.unwrap(), WebhookOutcome::Ignored);
        assert!(f.service.process_webhook(approved(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn liquidation_requires_completed_and_happens_once() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let checkout = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        let id = checkout.payment.id;

        let err = f.service.mark_as_liquidated(id, &f.admin).await.unwrap_err();
        assert_eq!(err.translation_key(), "payment.notCompleted");

        f.service.process_webhook(approved(id)).await.unwrap();
        assert_eq!(f.service.pending_liquidations(&f.admin).await.unwrap().len(), 1);
        assert_eq!(
            f.service.mark_as_liquidated(id, &f.golfer).await.unwrap_err().translation_key(),
            "errors.forbidden"
        );

        let paid = f.service.mark_as_liquidated(id, &f.admin).await.unwrap();
        assert!(paid.liquidated_at.is_some());
        assert!(f.service.pending_liquidations(&f.admin).await.unwrap().is_empty());
        let err = f.service.mark_as_liquidated(id, &f.admin).await.unwrap_err();
        assert_eq!(err.translation_key(), "payment.alreadyLiquidated");
    }

    #[tokio::test]
    async fn rejected_payment_fails_and_can_be_reopened() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let checkout = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        let id = checkout.payment.id;

        let rejected: WebhookNotification = serde_json::from_value(json!({
            "type": "payment",
            "action": "payment.updated",
            "data": { "id": "987", "status": "rejected" },
            "external_reference": id.to_string(),
        }))
        .unwrap();
        assert_eq!(f.service.process_webhook(rejected).await.unwrap(), WebhookOutcome::Recorded);
        let payment = f.service.payment_for_booking(f.booking_id, &f.golfer).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.provider_status.as_deref(), Some("rejected"));

        let retry = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        assert_eq!(retry.payment.id, id);
        assert_eq!(retry.payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn refunded_webhook_closes_the_cancellation_refund() {
        let f = fixture(BookingStatus::Accepted, Arc::new(FakeGateway)).await;
        let checkout = f.service.create_payment(f.booking_id, &f.golfer).await.unwrap();
        let id = checkout.payment.id;

        // cancelled after paying; the approval arrives late
        let mut booking = f.store.get_booking(f.booking_id).await.unwrap().unwrap();
        booking.status = BookingStatus::Cancelled;
        booking.cancellation = Some(Cancellation {
            cancelled_by: Party::Caddie,
            cancelled_at: Utc::now(),
            reason: String::new(),
            refund_amount: 10000,
            refund_percentage: 100,
            hours_until_service: 30.0,
            refund_status: Some(RefundStatus::Pending),
        });
        assert!(f.store.update_booking(&booking, BookingStatus::Accepted).await.unwrap());
        assert_eq!(f.service.process_webhook(approved(id)).await.unwrap(), WebhookOutcome::Settled);

        let refunded: WebhookNotification = serde_json::from_value(json!({
            "type": "payment",
            "action": "payment.updated",
            "data": { "id": 123456789, "status": "refunded" },
            "external_reference": id.to_string(),
        }))
        .unwrap();
        assert_eq!(f.service.process_webhook(refunded.clone()).await.unwrap(), WebhookOutcome::Refunded);

        let payment = f.store.get_payment(id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(f.service.pending_liquidations(&f.admin).await.unwrap().is_empty());
        let booking = f.store.get_booking(f.booking_id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancellation.unwrap().refund_status, Some(RefundStatus::Completed));

        // a repeated notification only records the status
        assert_eq!(f.service.process_webhook(refunded).await.unwrap(), WebhookOutcome::Recorded);
    }
}
