//! Scheduling and lifecycle core of the caddie booking marketplace, plus the
//! HTTP and socket surfaces that expose it.

pub mod alternatives;
pub mod audit;
pub mod auth;
pub mod availability;
pub mod booking_engine;
pub mod config;
pub mod error;
pub mod handlers;
pub mod i18n;
pub mod notify;
pub mod payments;
pub mod persistence;
pub mod qr;
pub mod ratings;
pub mod refund;
pub mod state;
