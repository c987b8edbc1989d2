use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transita_core::{Coupon, DiscountKind, Trip, TripStatus};

/// Fixed VAT rate, 16% expressed in basis points. A system constant,
/// not a configuration knob.
pub const VAT_RATE_BPS: i64 = 1600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Trip not found")]
    TripNotFound,

    #[error("Ticket sales are closed for this trip")]
    SalesClosed,

    #[error("No seats available")]
    NoSeatsAvailable,

    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Coupon is not active")]
    CouponInactive,

    #[error("Coupon is not yet valid")]
    CouponNotYetValid,

    #[error("Coupon has expired")]
    CouponExpired,

    #[error("Coupon usage limit reached")]
    CouponUsageExceeded,
}

/// Price breakdown for one ticket, in integer cents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub base_fare_cents: i64,
    pub service_charge_cents: i64,
    pub discount_cents: i64,
    pub subtotal_cents: i64,
    pub vat_cents: i64,
    pub total_cents: i64,
}

/// Pure quote computation: trip fare data plus an optional coupon in,
/// a price breakdown or a typed validation error out. No side effects.
pub struct PricingCalculator;

impl PricingCalculator {
    pub fn quote(
        trip: &Trip,
        coupon: Option<&Coupon>,
        now: DateTime<Utc>,
    ) -> Result<PriceBreakdown, PricingError> {
        if !trip.sales_open || trip.status != TripStatus::Scheduled {
            return Err(PricingError::SalesClosed);
        }
        if trip.seats_available <= 0 {
            return Err(PricingError::NoSeatsAvailable);
        }

        let discount_cents = match coupon {
            Some(c) => {
                Self::validate_coupon(c, now)?;
                Self::discount_for(c, trip.base_fare_cents)
            }
            None => 0,
        };

        let base = trip.base_fare_cents;
        let service = trip.service_charge_cents;
        // A fixed-amount coupon can exceed the fare; the subtotal never
        // goes below zero.
        let discount_cents = discount_cents.min(base + service);

        let subtotal_cents = base + service - discount_cents;
        let vat_cents = Self::vat_for(subtotal_cents);

        Ok(PriceBreakdown {
            base_fare_cents: base,
            service_charge_cents: service,
            discount_cents,
            subtotal_cents,
            vat_cents,
            total_cents: subtotal_cents + vat_cents,
        })
    }

    pub fn validate_coupon(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), PricingError> {
        if !coupon.active {
            return Err(PricingError::CouponInactive);
        }
        if let Some(from) = coupon.valid_from {
            if now < from {
                return Err(PricingError::CouponNotYetValid);
            }
        }
        if let Some(until) = coupon.valid_until {
            if now > until {
                return Err(PricingError::CouponExpired);
            }
        }
        if let Some(max) = coupon.max_uses {
            if coupon.uses >= max {
                return Err(PricingError::CouponUsageExceeded);
            }
        }
        Ok(())
    }

    fn discount_for(coupon: &Coupon, base_fare_cents: i64) -> i64 {
        match coupon.discount_kind {
            DiscountKind::Percentage => base_fare_cents * coupon.discount_value / 100,
            DiscountKind::FixedAmount => coupon.discount_value,
        }
    }

    /// VAT on the subtotal, rounded half-up to the minor unit.
    fn vat_for(subtotal_cents: i64) -> i64 {
        (subtotal_cents * VAT_RATE_BPS + 5_000) / 10_000
    }
}
