use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::entities::voucher::DiscountType;
use crate::errors::ServiceError;

/// Rupiah value of a single loyalty point.
pub const POINT_VALUE: Decimal = dec!(100);

/// VAT applied to the discounted (taxable) amount.
pub const TAX_RATE: Decimal = dec!(0.11);

/// One earned point per this much of the final total.
pub const EARN_DIVISOR: Decimal = dec!(10000);

/// Loyalty tier granting a percentage discount off the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub name: &'static str,
    pub threshold: Decimal,
    pub discount_percent: Decimal,
}

/// Ordered ascending by threshold; the highest qualifying entry wins.
pub const TIERS: [Tier; 4] = [
    Tier {
        name: "Guest",
        threshold: dec!(0),
        discount_percent: dec!(0),
    },
    Tier {
        name: "Silver",
        threshold: dec!(500000),
        discount_percent: dec!(5),
    },
    Tier {
        name: "Gold",
        threshold: dec!(2000000),
        discount_percent: dec!(10),
    },
    Tier {
        name: "Platinum",
        threshold: dec!(5000000),
        discount_percent: dec!(15),
    },
];

/// Resolves the loyalty tier for a cumulative spend amount.
pub fn tier_for_spend(total_spent: Decimal) -> &'static Tier {
    TIERS
        .iter()
        .rev()
        .find(|t| total_spent >= t.threshold)
        .unwrap_or(&TIERS[0])
}

/// A checkout line with the variant already resolved to a price snapshot.
#[derive(Debug, Clone)]
pub struct LineInput {
    pub variant_id: i64,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    /// Per-line manual discount, defaults to zero
    pub discount: Decimal,
}

/// Voucher discount already validated by the voucher rules; the pricing
/// pipeline trusts the type and value it is handed.
#[derive(Debug, Clone)]
pub struct VoucherSelection {
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub value: Decimal,
}

/// Loyalty state of the attached customer at quote time.
#[derive(Debug, Clone, Copy)]
pub struct CustomerSnapshot {
    pub total_spent: Decimal,
    pub total_points: i64,
}

/// Points-redemption request. `points_amount = None` means "use as many
/// as allowed".
#[derive(Debug, Clone, Copy, Default)]
pub struct PointsRequest {
    pub use_points: bool,
    pub points_amount: Option<i64>,
}

/// Priced line, carried into the sale items at settlement.
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub variant_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub line_total: Decimal,
}

/// Fully priced sale draft. All amounts stay in decimal precision;
/// rounding happens only at receipt rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SaleQuote {
    pub lines: Vec<PricedLine>,
    pub subtotal: Decimal,
    pub tier_name: &'static str,
    pub tier_discount_percent: Decimal,
    pub tier_discount: Decimal,
    pub voucher_code: Option<String>,
    pub voucher_discount: Decimal,
    pub points_redeemed: i64,
    pub points_discount: Decimal,
    pub total_discount: Decimal,
    pub taxable: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub points_earned: i64,
}

/// Prices a checkout. The step order is load-bearing: tier discount is
/// computed off the raw subtotal, the voucher off the same subtotal, and
/// points redemption only off what remains after both.
pub fn quote(
    lines: Vec<LineInput>,
    customer: Option<&CustomerSnapshot>,
    voucher: Option<&VoucherSelection>,
    points: PointsRequest,
) -> Result<SaleQuote, ServiceError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Decimal::ZERO;
    for line in lines {
        let line_total =
            line.unit_price * Decimal::from(line.quantity) - line.discount;
        subtotal += line_total;
        priced.push(PricedLine {
            variant_id: line.variant_id,
            product_name: line.product_name,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
            line_total,
        });
    }

    let (tier_name, tier_discount_percent, tier_discount) = match customer {
        Some(c) => {
            let tier = tier_for_spend(c.total_spent);
            (
                tier.name,
                tier.discount_percent,
                subtotal * tier.discount_percent / dec!(100),
            )
        }
        None => ("Guest", Decimal::ZERO, Decimal::ZERO),
    };

    let voucher_discount = match voucher {
        Some(v) => match v.discount_type {
            DiscountType::Percentage => subtotal * v.value / dec!(100),
            DiscountType::Fixed => v.value,
        },
        None => Decimal::ZERO,
    };

    let (points_redeemed, points_discount) = match customer {
        Some(c) if points.use_points => {
            let amount_after_discounts =
                (subtotal - tier_discount - voucher_discount).max(Decimal::ZERO);
            let max_points_allowed = (amount_after_discounts / POINT_VALUE)
                .floor()
                .to_i64()
                .unwrap_or(0);
            let available = c.total_points;
            let requested = points.points_amount.unwrap_or(available);
            let redeemed = requested.min(available).min(max_points_allowed).max(0);
            if let Some(explicit) = points.points_amount {
                if explicit > available && redeemed > 0 {
                    return Err(ServiceError::InsufficientPoints { available });
                }
            }
            (redeemed, Decimal::from(redeemed) * POINT_VALUE)
        }
        _ => (0, Decimal::ZERO),
    };

    let total_discount = tier_discount + voucher_discount + points_discount;
    let taxable = (subtotal - total_discount).max(Decimal::ZERO);
    let tax = taxable * TAX_RATE;
    let total = taxable + tax;
    if total < Decimal::ZERO {
        return Err(ServiceError::InvalidDiscount);
    }

    let points_earned = match customer {
        Some(_) => (total / EARN_DIVISOR).floor().to_i64().unwrap_or(0),
        None => 0,
    };

    Ok(SaleQuote {
        lines: priced,
        subtotal,
        tier_name,
        tier_discount_percent,
        tier_discount,
        voucher_code: voucher.and_then(|v| v.code.clone()),
        voucher_discount,
        points_redeemed,
        points_discount,
        total_discount,
        taxable,
        tax,
        total,
        points_earned,
    })
}

/// Change due back to the customer; under-payment yields zero change
/// rather than an error.
pub fn change_due(paid: Decimal, total: Decimal) -> Decimal {
    (paid - total).max(Decimal::ZERO)
}
