//! # config
//!
//! Environment-driven settings for the booking backend. Every value has a
//! development default so the server starts with no environment at all.

use chrono_tz::Tz;
use tracing::warn;

use crate::refund::RefundPolicy;

const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port (default 4000)
    pub port: u16,
    /// JSON snapshot written after each mutation (default data/state.json)
    pub state_file: String,
    /// Chained audit log, one JSON block per line
    pub audit_log_path: String,
    /// HS256 secret for bearer tokens and socket registration
    pub jwt_secret: String,
    /// Key used to sign QR payloads (defaults to the JWT secret)
    pub qr_secret: String,
    /// Reference zone for clubs that do not declare their own
    pub default_time_zone: Tz,
    /// Payment provider token; empty disables preference creation
    pub mercadopago_access_token: String,
    pub commission_percentage: i64,
    pub frontend_url: String,
    pub backend_url: String,
    pub refund_policy: RefundPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            state_file: "data/state.json".to_string(),
            audit_log_path: "data/booking-audit.jsonl".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            qr_secret: DEV_JWT_SECRET.to_string(),
            default_time_zone: chrono_tz::America::Argentina::Buenos_Aires,
            mercadopago_access_token: String::new(),
            commission_percentage: 10,
            frontend_url: "http://localhost:3000".to_string(),
            backend_url: "http://localhost:4000".to_string(),
            refund_policy: RefundPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);
        if jwt_secret == DEV_JWT_SECRET {
            warn!("JWT_SECRET not set, using the development secret");
        }
        let qr_secret = std::env::var("QR_SECRET").unwrap_or_else(|_| jwt_secret.clone());

        let default_time_zone = match std::env::var("CLUB_TIME_ZONE") {
            Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!("Unknown CLUB_TIME_ZONE '{name}', using {}", defaults.default_time_zone);
                defaults.default_time_zone
            }),
            Err(_) => defaults.default_time_zone,
        };

        let refund_policy = RefundPolicy {
            full_refund_hours: env_parse("FULL_REFUND_HOURS")
                .unwrap_or(defaults.refund_policy.full_refund_hours),
            partial_refund_hours: env_parse("PARTIAL_REFUND_HOURS")
                .unwrap_or(defaults.refund_policy.partial_refund_hours),
            partial_refund_percentage: env_parse("PARTIAL_REFUND_PERCENTAGE")
                .unwrap_or(defaults.refund_policy.partial_refund_percentage),
        };

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            state_file: std::env::var("STATE_FILE").unwrap_or(defaults.state_file),
            audit_log_path: std::env::var("AUDIT_LOG_PATH").unwrap_or(defaults.audit_log_path),
            jwt_secret,
            qr_secret,
            default_time_zone,
            mercadopago_access_token: std::env::var("MERCADOPAGO_ACCESS_TOKEN")
                .unwrap_or(defaults.mercadopago_access_token),
            commission_percentage: env_parse("COMMISSION_PERCENTAGE")
                .unwrap_or(defaults.commission_percentage),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            backend_url: std::env::var("BACKEND_URL").unwrap_or(defaults.backend_url),
            refund_policy,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
