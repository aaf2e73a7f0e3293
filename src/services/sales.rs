use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        customer, payment,
        payment::{PaymentMethod, PaymentStatus},
        product_variant, refund,
        refund::RefundStatus,
        sale,
        sale::SaleStatus,
        sale_item,
        voucher::{self, DiscountType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        pricing::{self, CustomerSnapshot, LineInput, PointsRequest, VoucherSelection},
        receipts,
        vouchers::VoucherService,
    },
};

/// Variant reference in a checkout line: numeric id, with SKU fallback
/// when the id lookup misses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum VariantRef {
    Id(i64),
    Sku(String),
}

impl std::fmt::Display for VariantRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Sku(sku) => write!(f, "{sku}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaleItemRequest {
    pub variant_id: VariantRef,
    pub quantity: i32,
    /// Manual per-line discount in rupiah
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub reference: Option<String>,
}

/// Checkout payload.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSaleRequest {
    #[validate(length(min = 1, message = "Items are required"))]
    pub items: Vec<SaleItemRequest>,
    #[validate(length(min = 1, message = "Payments are required"))]
    pub payments: Vec<PaymentRequest>,
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub use_points: bool,
    pub points_amount: Option<i64>,
    /// Validated against the voucher rules when present
    pub voucher_code: Option<String>,
    /// Manual discount, used only when no voucher code is given
    pub discount_value: Option<Decimal>,
    pub discount_type: Option<DiscountType>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SaleFilters {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<SaleStatus>,
}

/// Fully settled sale as returned from checkout.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettledSale {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub sale: sale::Model,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<sale_item::Model>,
    #[schema(value_type = Vec<Object>)]
    pub payments: Vec<payment::Model>,
    pub tier_name: String,
    pub tier_discount_percent: Decimal,
    pub tier_discount: Decimal,
    pub manual_discount: Decimal,
    pub points_discount: Decimal,
}

/// Sale with its line items and payments, for detail views and receipts.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleDetails {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub sale: sale::Model,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<sale_item::Model>,
    #[schema(value_type = Vec<Object>)]
    pub payments: Vec<payment::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefundResult {
    #[schema(value_type = Object)]
    pub refund: refund::Model,
    pub sale_id: i64,
}

/// Service orchestrating checkout, void, refund and receipts.
#[derive(Clone)]
pub struct SaleService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    vouchers: Arc<VoucherService>,
    store_name: String,
}

impl SaleService {
    /// Creates a new sale service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        vouchers: Arc<VoucherService>,
        store_name: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            vouchers,
            store_name,
        }
    }

    /// Settles a checkout in one transaction: prices the order, inserts
    /// the sale with its items and payments, decrements stock, bumps
    /// voucher usage and updates customer loyalty stats. Everything
    /// commits together or not at all.
    ///
    /// Invoice sequences come from a per-day count, so two concurrent
    /// checkouts on one branch can collide on the unique invoice index;
    /// the losing transaction is retried with a fresh sequence.
    #[instrument(skip(self, request), fields(branch_id))]
    pub async fn create_sale(
        &self,
        branch_id: i64,
        cashier_id: Option<i64>,
        request: CreateSaleRequest,
    ) -> Result<SettledSale, ServiceError> {
        request.validate()?;
        if let Some(points) = request.points_amount {
            if points < 0 {
                return Err(ServiceError::ValidationError(
                    "points_amount must be a non-negative integer".into(),
                ));
            }
        }

        let mut attempts = 0;
        loop {
            match self
                .settle_sale(branch_id, cashier_id, request.clone())
                .await
            {
                Err(err) if is_unique_violation(&err) && attempts < 2 => {
                    attempts += 1;
                    warn!(branch_id, attempts, "Invoice number collision, retrying settlement");
                }
                result => return result,
            }
        }
    }

    async fn settle_sale(
        &self,
        branch_id: i64,
        cashier_id: Option<i64>,
        request: CreateSaleRequest,
    ) -> Result<SettledSale, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        // Resolve variants and price the lines
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let variant = resolve_variant(&txn, branch_id, &item.variant_id).await?;
            lines.push(LineInput {
                variant_id: variant.id,
                product_name: variant.name,
                unit_price: variant.selling_price,
                quantity: item.quantity,
                discount: item.discount,
            });
        }
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity) - l.discount)
            .sum();

        // Branch scope applies to customers too; a foreign-branch id
        // reads as not-found.
        let customer_model = match request.customer_id {
            Some(id) => Some(
                customer::Entity::find_by_id(id)
                    .filter(customer::Column::BranchId.eq(branch_id))
                    .one(&txn)
                    .await?
                    .ok_or(ServiceError::CustomerNotFound)?,
            ),
            None => None,
        };
        let snapshot = customer_model.as_ref().map(|c| CustomerSnapshot {
            total_spent: c.total_spent,
            total_points: c.total_points,
        });

        // A voucher code wins over a manual discount; its resolved amount
        // (with the percentage cap already applied) is passed through as a
        // flat value so the pricing pipeline cannot re-derive it.
        let mut redeemed_voucher: Option<voucher::Model> = None;
        let voucher_selection = if let Some(code) = &request.voucher_code {
            let validated = self
                .vouchers
                .validate_voucher_on(&txn, branch_id, code, subtotal)
                .await?;
            let selection = VoucherSelection {
                code: Some(validated.voucher.code.clone()),
                discount_type: DiscountType::Fixed,
                value: validated.discount_amount,
            };
            redeemed_voucher = Some(validated.voucher);
            Some(selection)
        } else {
            request.discount_value.map(|value| VoucherSelection {
                code: None,
                discount_type: request.discount_type.unwrap_or(DiscountType::Fixed),
                value,
            })
        };

        let quote = pricing::quote(
            lines,
            snapshot.as_ref(),
            voucher_selection.as_ref(),
            PointsRequest {
                use_points: request.use_points,
                points_amount: request.points_amount,
            },
        )?;

        let paid_amount: Decimal = request.payments.iter().map(|p| p.amount).sum();
        let change_amount = pricing::change_due(paid_amount, quote.total);

        let now = Utc::now();
        let invoice_number = generate_invoice_number(&txn, branch_id, now).await?;

        let sale_model = sale::ActiveModel {
            branch_id: Set(branch_id),
            customer_id: Set(request.customer_id),
            cashier_id: Set(cashier_id),
            invoice_number: Set(invoice_number),
            transaction_date: Set(now),
            subtotal: Set(quote.subtotal),
            discount_amount: Set(quote.total_discount),
            voucher_code: Set(quote.voucher_code.clone()),
            voucher_amount: Set(quote.voucher_discount),
            tier_discount_amount: Set(quote.tier_discount),
            tax_amount: Set(quote.tax),
            total_amount: Set(quote.total),
            paid_amount: Set(paid_amount),
            change_amount: Set(change_amount),
            points_earned: Set(quote.points_earned),
            points_redeemed: Set(quote.points_redeemed),
            status: Set(SaleStatus::Completed),
            notes: Set(request.notes.clone()),
            completed_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(None),
            ..Default::default()
        };
        let sale_row = sale_model.insert(&txn).await?;

        let mut item_rows = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let item = sale_item::ActiveModel {
                sale_id: Set(sale_row.id),
                product_variant_id: Set(line.variant_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                discount_amount: Set(line.discount),
                line_total: Set(line.line_total),
                created_at: Set(now),
                ..Default::default()
            };
            item_rows.push(item.insert(&txn).await?);

            decrement_stock(&txn, line.variant_id, line.quantity, &line.product_name).await?;
        }

        let mut payment_rows = Vec::with_capacity(request.payments.len());
        for p in &request.payments {
            let row = payment::ActiveModel {
                sale_id: Set(sale_row.id),
                method: Set(p.method),
                amount: Set(p.amount),
                reference: Set(p.reference.clone()),
                status: Set(PaymentStatus::Completed),
                created_at: Set(now),
                ..Default::default()
            };
            payment_rows.push(row.insert(&txn).await?);
        }

        // Guarded increment: the usage-limit check re-runs in the WHERE
        // clause so concurrent redemptions cannot push past the limit.
        if let Some(redeemed) = &redeemed_voucher {
            let mut bump = voucher::Entity::update_many()
                .col_expr(
                    voucher::Column::UsageCount,
                    Expr::col(voucher::Column::UsageCount).add(1),
                )
                .filter(voucher::Column::Id.eq(redeemed.id));
            if let Some(limit) = redeemed.usage_limit {
                bump = bump.filter(voucher::Column::UsageCount.lt(limit));
            }
            let result = bump.exec(&txn).await?;
            if result.rows_affected == 0 {
                return Err(ServiceError::VoucherLimitReached);
            }
        }

        if let Some(customer) = &customer_model {
            let mut model: customer::ActiveModel = customer.clone().into();
            model.total_spent = Set(customer.total_spent + quote.total);
            model.total_points =
                Set(customer.total_points - quote.points_redeemed + quote.points_earned);
            model.visit_count = Set(customer.visit_count + 1);
            model.last_visit_at = Set(Some(now));
            model.updated_at = Set(Some(now));
            model.update(&txn).await?;
        }

        txn.commit().await?;

        info!(
            sale_id = sale_row.id,
            invoice_number = %sale_row.invoice_number,
            total = %sale_row.total_amount,
            "Sale completed"
        );
        let _ = self
            .event_sender
            .send(Event::SaleCompleted {
                sale_id: sale_row.id,
                branch_id,
                invoice_number: sale_row.invoice_number.clone(),
            })
            .await;

        Ok(SettledSale {
            sale: sale_row,
            items: item_rows,
            payments: payment_rows,
            tier_name: quote.tier_name.to_string(),
            tier_discount_percent: quote.tier_discount_percent,
            tier_discount: quote.tier_discount,
            manual_discount: quote.voucher_discount,
            points_discount: quote.points_discount,
        })
    }

    /// Lists sales for a branch, newest first, capped at 100 rows.
    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        branch_id: i64,
        filters: SaleFilters,
    ) -> Result<Vec<sale::Model>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = sale::Entity::find().filter(sale::Column::BranchId.eq(branch_id));

        if let Some(from) = filters.date_from {
            let start = from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
            query = query.filter(sale::Column::TransactionDate.gte(start));
        }
        if let Some(to) = filters.date_to {
            // Inclusive upper bound: strictly before the next midnight
            let end = (to + chrono::Days::new(1))
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .and_utc();
            query = query.filter(sale::Column::TransactionDate.lt(end));
        }
        if let Some(status) = filters.status {
            query = query.filter(sale::Column::Status.eq(status));
        }

        let sales = query
            .order_by_desc(sale::Column::CreatedAt)
            .limit(100)
            .all(db)
            .await?;
        Ok(sales)
    }

    /// Loads a sale with its items and payments, scoped to the branch.
    /// A branch mismatch reads as not-found.
    #[instrument(skip(self))]
    pub async fn get_sale(
        &self,
        branch_id: i64,
        sale_id: i64,
    ) -> Result<SaleDetails, ServiceError> {
        let db = &*self.db_pool;
        let sale = sale::Entity::find_by_id(sale_id)
            .filter(sale::Column::BranchId.eq(branch_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sale not found".into()))?;

        let items = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(sale.id))
            .all(db)
            .await?;
        let payments = payment::Entity::find()
            .filter(payment::Column::SaleId.eq(sale.id))
            .all(db)
            .await?;

        Ok(SaleDetails {
            sale,
            items,
            payments,
        })
    }

    /// Voids a completed sale and restocks every line item. Customer
    /// loyalty stats are deliberately left untouched, matching the
    /// settlement's one-way bookkeeping.
    #[instrument(skip(self))]
    pub async fn void_sale(&self, branch_id: i64, sale_id: i64) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let sale = sale::Entity::find_by_id(sale_id)
            .filter(sale::Column::BranchId.eq(branch_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sale not found".into()))?;

        if sale.status != SaleStatus::Completed {
            return Err(ServiceError::AlreadyVoided);
        }

        let mut model: sale::ActiveModel = sale.into();
        model.status = Set(SaleStatus::Voided);
        model.updated_at = Set(Some(Utc::now()));
        model.update(&txn).await?;

        restock_items(&txn, sale_id).await?;
        txn.commit().await?;

        warn!(sale_id, branch_id, "Sale voided");
        let _ = self
            .event_sender
            .send(Event::SaleVoided { sale_id, branch_id })
            .await;

        Ok(())
    }

    /// Refunds a completed sale: records a refund row with a generated
    /// reference and the processing cashier, restocks every line item
    /// and flips the status.
    #[instrument(skip(self))]
    pub async fn refund_sale(
        &self,
        branch_id: i64,
        sale_id: i64,
        processed_by: Option<i64>,
        reason: Option<String>,
    ) -> Result<RefundResult, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let sale = sale::Entity::find_by_id(sale_id)
            .filter(sale::Column::BranchId.eq(branch_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sale not found".into()))?;

        if sale.status != SaleStatus::Completed {
            return Err(ServiceError::Conflict(
                "Only completed sales can be refunded".into(),
            ));
        }

        let now = Utc::now();
        let refund_number = format!("REF-{}-{:04}", now.format("%Y%m%d"), sale.id);

        let refund_row = refund::ActiveModel {
            sale_id: Set(sale.id),
            branch_id: Set(branch_id),
            refund_number: Set(refund_number.clone()),
            amount: Set(sale.total_amount),
            reason: Set(reason),
            processed_by: Set(processed_by),
            status: Set(RefundStatus::Completed),
            created_at: Set(now),
            ..Default::default()
        };
        let refund_row = refund_row.insert(&txn).await?;

        let mut model: sale::ActiveModel = sale.into();
        model.status = Set(SaleStatus::Refunded);
        model.updated_at = Set(Some(now));
        model.update(&txn).await?;

        restock_items(&txn, sale_id).await?;
        txn.commit().await?;

        warn!(sale_id, branch_id, refund_number = %refund_number, "Sale refunded");
        let _ = self
            .event_sender
            .send(Event::SaleRefunded {
                sale_id,
                branch_id,
                refund_number,
            })
            .await;

        Ok(RefundResult {
            refund: refund_row,
            sale_id,
        })
    }

    /// Renders the receipt text for a sale. Only the thermal style is
    /// implemented; unknown styles fall back to it.
    #[instrument(skip(self))]
    pub async fn render_receipt(
        &self,
        branch_id: i64,
        sale_id: i64,
    ) -> Result<String, ServiceError> {
        let details = self.get_sale(branch_id, sale_id).await?;
        Ok(receipts::render_thermal(
            &self.store_name,
            &details.sale,
            &details.items,
            &details.payments,
        ))
    }
}

/// True when the error is a unique-constraint violation, the only kind
/// the settlement retry loop should absorb.
fn is_unique_violation(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::DatabaseError(db_err)
            if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
}

/// Numeric-id lookup with SKU fallback. A numeric reference that matches
/// no id is retried as a SKU before failing.
async fn resolve_variant(
    txn: &DatabaseTransaction,
    branch_id: i64,
    variant_ref: &VariantRef,
) -> Result<product_variant::Model, ServiceError> {
    let by_id = match variant_ref {
        VariantRef::Id(id) => {
            product_variant::Entity::find_by_id(*id)
                .filter(product_variant::Column::BranchId.eq(branch_id))
                .one(txn)
                .await?
        }
        VariantRef::Sku(raw) => match raw.parse::<i64>() {
            Ok(id) => {
                product_variant::Entity::find_by_id(id)
                    .filter(product_variant::Column::BranchId.eq(branch_id))
                    .one(txn)
                    .await?
            }
            Err(_) => None,
        },
    };
    if let Some(variant) = by_id {
        return Ok(variant);
    }

    product_variant::Entity::find()
        .filter(product_variant::Column::BranchId.eq(branch_id))
        .filter(product_variant::Column::Sku.eq(variant_ref.to_string()))
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::VariantNotFound(variant_ref.to_string()))
}

/// Guarded decrement: the row is only touched while enough stock
/// remains, so two concurrent checkouts cannot both take the last unit.
async fn decrement_stock(
    txn: &DatabaseTransaction,
    variant_id: i64,
    quantity: i32,
    product_name: &str,
) -> Result<(), ServiceError> {
    let result = product_variant::Entity::update_many()
        .col_expr(
            product_variant::Column::Stock,
            Expr::col(product_variant::Column::Stock).sub(quantity),
        )
        .filter(product_variant::Column::Id.eq(variant_id))
        .filter(product_variant::Column::Stock.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(product_name.to_string()));
    }
    Ok(())
}

/// Adds every line quantity back to its variant's stock.
async fn restock_items(txn: &DatabaseTransaction, sale_id: i64) -> Result<(), ServiceError> {
    let items = sale_item::Entity::find()
        .filter(sale_item::Column::SaleId.eq(sale_id))
        .all(txn)
        .await?;

    for item in items {
        product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(item.quantity),
            )
            .filter(product_variant::Column::Id.eq(item.product_variant_id))
            .exec(txn)
            .await?;
    }
    Ok(())
}

/// `INV-<yyyymmdd>-<branch>-<seq>`, sequence scoped to the branch and
/// calendar day, generated inside the settlement transaction.
async fn generate_invoice_number(
    txn: &DatabaseTransaction,
    branch_id: i64,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();

    let today_count = sale::Entity::find()
        .filter(sale::Column::BranchId.eq(branch_id))
        .filter(sale::Column::TransactionDate.gte(day_start))
        .count(txn)
        .await?;

    Ok(format!(
        "INV-{}-{}-{:04}",
        now.format("%Y%m%d"),
        branch_id,
        today_count + 1
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn variant_ref_display_round_trips() {
        assert_eq!(VariantRef::Id(42).to_string(), "42");
        assert_eq!(VariantRef::Sku("KOPI-SUSU-L".into()).to_string(), "KOPI-SUSU-L");
    }

    #[test]
    fn refund_number_is_zero_padded() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        let refund_number = format!("REF-{}-{:04}", now.format("%Y%m%d"), 7);
        assert_eq!(refund_number, "REF-20250314-0007");
    }

    #[test]
    fn checkout_payload_types_serialize_for_validation_params() {
        let items = vec![SaleItemRequest {
            variant_id: VariantRef::Sku("KOPI-S".into()),
            quantity: 2,
            discount: Decimal::ZERO,
        }];
        let value = serde_json::to_value(&items).unwrap();
        assert_eq!(value[0]["variant_id"], "KOPI-S");

        let payments = vec![PaymentRequest {
            method: PaymentMethod::Cash,
            amount: Decimal::from(10000),
            reference: None,
        }];
        let value = serde_json::to_value(&payments).unwrap();
        assert_eq!(value[0]["method"], "cash");
    }

    #[test]
    fn settlement_retry_only_absorbs_unique_violations() {
        let db_err = ServiceError::DatabaseError(sea_orm::DbErr::Custom("boom".into()));
        assert!(!is_unique_violation(&db_err));
        assert!(!is_unique_violation(&ServiceError::VoucherLimitReached));
    }

    #[test]
    fn create_sale_request_rejects_empty_items() {
        let request = CreateSaleRequest {
            items: vec![],
            payments: vec![PaymentRequest {
                method: PaymentMethod::Cash,
                amount: Decimal::from(10000),
                reference: None,
            }],
            customer_id: None,
            use_points: false,
            points_amount: None,
            voucher_code: None,
            discount_value: None,
            discount_type: None,
            notes: None,
        };
        assert!(request.validate().is_err());
    }
}
