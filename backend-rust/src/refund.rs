//! Cancellation refund policy. Pure: the caller supplies status, who cancels,
//! lead time and price; money movement happens elsewhere.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{BookingStatus, Party};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundPolicy {
    /// Lead time (hours) at or above which a golfer gets everything back.
    pub full_refund_hours: f64,
    /// Lead time (hours) at or above which a golfer gets the partial percentage.
    pub partial_refund_hours: f64,
    pub partial_refund_percentage: u8,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            full_refund_hours: 24.0,
            partial_refund_hours: 12.0,
            partial_refund_percentage: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundQuote {
    pub refund_percentage: u8,
    pub refund_amount: i64,
    /// Rounded to one decimal.
    pub hours_until_service: f64,
}

impl RefundPolicy {
    pub fn percentage(&self, status: BookingStatus, cancelled_by: Party, hours_until_service: f64) -> u8 {
        match cancelled_by {
            Party::Caddie => 100,
            Party::Golfer if status == BookingStatus::Pending => 100,
            Party::Golfer if hours_until_service >= self.full_refund_hours => 100,
            Party::Golfer if hours_until_service >= self.partial_refund_hours => {
                self.partial_refund_percentage
            }
            Party::Golfer => 0,
        }
    }

    pub fn quote(
        &self,
        status: BookingStatus,
        cancelled_by: Party,
        hours_until_service: f64,
        total_price: i64,
    ) -> RefundQuote {
        let refund_percentage = self.percentage(status, cancelled_by, hours_until_service);
        let refund_amount = (total_price as f64 * f64::from(refund_percentage) / 100.0).round() as i64;
        RefundQuote {
            refund_percentage,
            refund_amount,
            hours_until_service: (hours_until_service * 10.0).round() / 10.0,
        }
    }
}

/// Signed lead time in hours; negative once the service start has passed.
pub fn hours_until(service_start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    service_start.signed_duration_since(now).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn policy() -> RefundPolicy {
        RefundPolicy::default()
    }

    #[test]
    fn caddie_cancellation_always_refunds_everything() {
        for hours in [-3.0, 0.5, 5.0, 13.0, 100.0] {
            let q = policy().quote(BookingStatus::Accepted, Party::Caddie, hours, 9000);
            assert_eq!(q.refund_percentage, 100);
            assert_eq!(q.refund_amount, 9000);
        }
    }

    #[test]
    fn golfer_refund_tiers_by_lead_time() {
        let p = policy();
        assert_eq!(p.percentage(BookingStatus::Accepted, Party::Golfer, 25.0), 100);
        assert_eq!(p.percentage(BookingStatus::Accepted, Party::Golfer, 24.0), 100);
        assert_eq!(p.percentage(BookingStatus::Accepted, Party::Golfer, 13.0), 50);
        assert_eq!(p.percentage(BookingStatus::Accepted, Party::Golfer, 12.0), 50);
        assert_eq!(p.percentage(BookingStatus::Accepted, Party::Golfer, 5.0), 0);
    }

    #[test]
    fn unconfirmed_booking_is_fully_refunded_even_late() {
        let q = policy().quote(BookingStatus::Pending, Party::Golfer, 2.0, 7000);
        assert_eq!(q.refund_percentage, 100);
        assert_eq!(q.refund_amount, 7000);
    }

    #[test]
    fn amount_is_rounded_to_whole_units() {
        let q = policy().quote(BookingStatus::Accepted, Party::Golfer, 13.0, 3333);
        assert_eq!(q.refund_percentage, 50);
        assert_eq!(q.refund_amount, 1667);
    }

    #[test]
    fn lead_time_is_reported_with_one_decimal() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let now = start - Duration::minutes(13 * 60 + 20);
        let hours = hours_until(start, now);
        let q = policy().quote(BookingStatus::Accepted, Party::Golfer, hours, 100);
        assert_eq!(q.hours_until_service, 13.3);
        assert!(hours_until(now, start) < 0.0);
    }
}
