use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::entities::{payment, sale, sale_item};

const WIDTH: usize = 32;

/// Formats an amount as integer rupiah with `.` thousands separators,
/// e.g. `1.250.000`. Fractional amounts round half away from zero.
pub fn format_rupiah(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i128()
        .unwrap_or(0);
    let negative = rounded < 0;
    let digits = rounded.unsigned_abs().to_string();

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    let first_group = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - first_group) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if negative {
        format!("-{out}")
    } else {
        out
    }
}

/// Renders a settled sale as plain text for a 32-column thermal printer.
///
/// Line order is fixed. The three itemized discount lines appear only
/// when their amount is present; a lone generic "Discount" line covers
/// sales recorded before the breakdown columns existed.
pub fn render_thermal(
    store_name: &str,
    sale: &sale::Model,
    items: &[sale_item::Model],
    payments: &[payment::Model],
) -> String {
    let banner = "=".repeat(WIDTH);
    let divider = "-".repeat(WIDTH);

    let mut lines: Vec<String> = Vec::new();
    lines.push(banner.clone());
    lines.push(format!("        {store_name}"));
    lines.push(banner.clone());
    lines.push(format!("Invoice: {}", sale.invoice_number));
    lines.push(format!(
        "Date: {}",
        sale.transaction_date.format("%d/%m/%Y %H:%M")
    ));
    lines.push(divider.clone());

    for item in items {
        lines.push(item.product_name.clone());
        lines.push(format!(
            "  {} x {} = {}",
            item.quantity,
            format_rupiah(item.unit_price),
            format_rupiah(item.line_total)
        ));
    }

    lines.push(divider.clone());
    lines.push(format!("Subtotal: {}", format_rupiah(sale.subtotal)));

    if sale.tier_discount_amount > Decimal::ZERO {
        lines.push(format!(
            "Member Disc: -{}",
            format_rupiah(sale.tier_discount_amount)
        ));
    }

    if sale.voucher_amount > Decimal::ZERO {
        let code = sale
            .voucher_code
            .as_ref()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        lines.push(format!(
            "Voucher{code}: -{}",
            format_rupiah(sale.voucher_amount)
        ));
    }

    if sale.points_redeemed > 0 {
        let points_value = Decimal::from(sale.points_redeemed) * super::pricing::POINT_VALUE;
        lines.push(format!("Points Used: -{}", format_rupiah(points_value)));
    }

    // Older rows carry only the aggregate discount
    if sale.discount_amount > Decimal::ZERO
        && sale.tier_discount_amount == Decimal::ZERO
        && sale.voucher_amount == Decimal::ZERO
        && sale.points_redeemed == 0
    {
        lines.push(format!("Discount: -{}", format_rupiah(sale.discount_amount)));
    }

    lines.push(format!("Tax: {}", format_rupiah(sale.tax_amount)));
    lines.push(banner.clone());
    lines.push(format!("TOTAL: Rp {}", format_rupiah(sale.total_amount)));
    lines.push(banner.clone());

    for payment in payments {
        lines.push(format!(
            "{}: Rp {}",
            payment.method.receipt_label(),
            format_rupiah(payment.amount)
        ));
    }
    if sale.change_amount > Decimal::ZERO {
        lines.push(format!("Change: Rp {}", format_rupiah(sale.change_amount)));
    }

    if sale.points_earned > 0 {
        lines.push(divider);
        lines.push(format!("Points Earned: +{}", sale.points_earned));
    }

    lines.push(String::new());
    lines.push("    Thank you for shopping!".to_string());
    lines.push(banner);

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::payment::{PaymentMethod, PaymentStatus};
    use crate::entities::sale::SaleStatus;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn base_sale() -> sale::Model {
        sale::Model {
            id: 1,
            branch_id: 1,
            customer_id: None,
            cashier_id: None,
            invoice_number: "INV-20250314-1-0042".into(),
            transaction_date: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            subtotal: dec!(50000),
            discount_amount: dec!(0),
            voucher_code: None,
            voucher_amount: dec!(0),
            tier_discount_amount: dec!(0),
            tax_amount: dec!(5500),
            total_amount: dec!(55500),
            paid_amount: dec!(60000),
            change_amount: dec!(4500),
            points_earned: 0,
            points_redeemed: 0,
            status: SaleStatus::Completed,
            notes: None,
            completed_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            updated_at: None,
        }
    }

    fn item(name: &str, qty: i32, unit: Decimal, total: Decimal) -> sale_item::Model {
        sale_item::Model {
            id: 1,
            sale_id: 1,
            product_variant_id: 1,
            product_name: name.into(),
            quantity: qty,
            unit_price: unit,
            discount_amount: dec!(0),
            line_total: total,
            created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
        }
    }

    fn cash(amount: Decimal) -> payment::Model {
        payment::Model {
            id: 1,
            sale_id: 1,
            method: PaymentMethod::Cash,
            amount,
            reference: None,
            status: PaymentStatus::Completed,
            created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn rupiah_formatting_uses_dot_separators() {
        assert_eq!(format_rupiah(dec!(0)), "0");
        assert_eq!(format_rupiah(dec!(999)), "999");
        assert_eq!(format_rupiah(dec!(1000)), "1.000");
        assert_eq!(format_rupiah(dec!(55500)), "55.500");
        assert_eq!(format_rupiah(dec!(1250000)), "1.250.000");
        assert_eq!(format_rupiah(dec!(1234567890)), "1.234.567.890");
        assert_eq!(format_rupiah(dec!(49999.5)), "50.000");
        assert_eq!(format_rupiah(dec!(-4500)), "-4.500");
    }

    #[test]
    fn basic_receipt_layout() {
        let sale = base_sale();
        let items = vec![item("Kopi Susu", 2, dec!(25000), dec!(50000))];
        let payments = vec![cash(dec!(60000))];

        let text = render_thermal("KOPI KUY POS", &sale, &items, &payments);
        let expected = "\
================================
        KOPI KUY POS
================================
Invoice: INV-20250314-1-0042
Date: 14/03/2025 09:30
--------------------------------
Kopi Susu
  2 x 25.000 = 50.000
--------------------------------
Subtotal: 50.000
Tax: 5.500
================================
TOTAL: Rp 55.500
================================
Cash: Rp 60.000
Change: Rp 4.500

    Thank you for shopping!
================================";
        assert_eq!(text, expected);
    }

    #[test]
    fn itemized_discounts_render_in_order() {
        let mut sale = base_sale();
        sale.tier_discount_amount = dec!(5000);
        sale.voucher_code = Some("HEMAT10".into());
        sale.voucher_amount = dec!(5000);
        sale.points_redeemed = 400;
        sale.discount_amount = dec!(50000);
        sale.tax_amount = dec!(0);
        sale.total_amount = dec!(0);
        sale.change_amount = dec!(0);
        sale.points_earned = 0;

        let text = render_thermal("KOPI KUY POS", &sale, &[], &[]);
        assert!(text.contains("Member Disc: -5.000"));
        assert!(text.contains("Voucher (HEMAT10): -5.000"));
        assert!(text.contains("Points Used: -40.000"));
        // Itemized breakdown suppresses the generic line
        assert!(!text.contains("Discount: -"));

        let member_pos = text.find("Member Disc").unwrap();
        let voucher_pos = text.find("Voucher (").unwrap();
        let points_pos = text.find("Points Used").unwrap();
        assert!(member_pos < voucher_pos && voucher_pos < points_pos);
    }

    #[test]
    fn legacy_sale_renders_single_generic_discount_line() {
        let mut sale = base_sale();
        sale.discount_amount = dec!(5000);

        let text = render_thermal("KOPI KUY POS", &sale, &[], &[]);
        assert!(text.contains("Discount: -5.000"));
        assert!(!text.contains("Member Disc"));
        assert!(!text.contains("Voucher"));
        assert!(!text.contains("Points Used"));
    }

    #[test]
    fn voucher_without_code_omits_parentheses() {
        let mut sale = base_sale();
        sale.voucher_amount = dec!(2500);

        let text = render_thermal("KOPI KUY POS", &sale, &[], &[]);
        assert!(text.contains("Voucher: -2.500"));
    }

    #[test]
    fn points_earned_footer_only_when_positive() {
        let mut sale = base_sale();
        sale.points_earned = 5;

        let text = render_thermal("KOPI KUY POS", &sale, &[], &[]);
        assert!(text.contains("Points Earned: +5"));

        sale.points_earned = 0;
        let text = render_thermal("KOPI KUY POS", &sale, &[], &[]);
        assert!(!text.contains("Points Earned"));
    }

    #[test]
    fn zero_change_is_omitted() {
        let mut sale = base_sale();
        sale.change_amount = dec!(0);
        let text = render_thermal("KOPI KUY POS", &sale, &[], &[cash(dec!(55500))]);
        assert!(!text.contains("Change:"));
    }
}
