pub mod pricing;

pub use pricing::{PriceBreakdown, PricingCalculator, PricingError, VAT_RATE_BPS};
