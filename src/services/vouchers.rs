use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::voucher::{self, DiscountType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::receipts::format_rupiah,
};

/// Payload for creating a voucher. Codes are normalized to uppercase.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewVoucher {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub min_order: Decimal,
    pub usage_limit: Option<i32>,
    /// Defaults to now when omitted
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update; omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct VoucherUpdate {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub max_discount: Option<Option<Decimal>>,
    pub min_order: Option<Decimal>,
    pub usage_limit: Option<Option<i32>>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

/// Outcome of validating a voucher code against an order subtotal.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidatedVoucher {
    #[schema(value_type = Object)]
    pub voucher: voucher::Model,
    pub discount_amount: Decimal,
}

/// Service for managing vouchers
#[derive(Clone)]
pub struct VoucherService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl VoucherService {
    /// Creates a new voucher service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a voucher. The code is unique per branch; collisions fail
    /// with `DuplicateVoucherCode`.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_voucher(
        &self,
        branch_id: i64,
        input: NewVoucher,
    ) -> Result<voucher::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;
        let code = input.code.trim().to_uppercase();

        let existing = voucher::Entity::find()
            .filter(voucher::Column::BranchId.eq(branch_id))
            .filter(voucher::Column::Code.eq(code.clone()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::DuplicateVoucherCode);
        }

        let now = Utc::now();
        let model = voucher::ActiveModel {
            branch_id: Set(branch_id),
            code: Set(code),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            max_discount: Set(input.max_discount),
            min_order: Set(input.min_order),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            valid_from: Set(input.valid_from.unwrap_or(now)),
            valid_until: Set(input.valid_until),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(None),
            ..Default::default()
        };
        let created = model.insert(db).await?;

        info!(voucher_id = created.id, code = %created.code, "Voucher created");
        let _ = self
            .event_sender
            .send(Event::VoucherCreated {
                voucher_id: created.id,
                code: created.code.clone(),
            })
            .await;

        Ok(created)
    }

    /// Lists vouchers for a branch, newest first.
    #[instrument(skip(self))]
    pub async fn list_vouchers(&self, branch_id: i64) -> Result<Vec<voucher::Model>, ServiceError> {
        let db = &*self.db_pool;
        let vouchers = voucher::Entity::find()
            .filter(voucher::Column::BranchId.eq(branch_id))
            .order_by_desc(voucher::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(vouchers)
    }

    /// Gets a voucher by id, scoped to the branch. Cross-branch access
    /// reads as not-found.
    #[instrument(skip(self))]
    pub async fn get_voucher(
        &self,
        branch_id: i64,
        voucher_id: i64,
    ) -> Result<voucher::Model, ServiceError> {
        let db = &*self.db_pool;
        voucher::Entity::find_by_id(voucher_id)
            .filter(voucher::Column::BranchId.eq(branch_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Voucher not found".into()))
    }

    /// Applies a partial update to a voucher.
    #[instrument(skip(self, update))]
    pub async fn update_voucher(
        &self,
        branch_id: i64,
        voucher_id: i64,
        update: VoucherUpdate,
    ) -> Result<voucher::Model, ServiceError> {
        update.validate()?;
        let db = &*self.db_pool;
        let existing = self.get_voucher(branch_id, voucher_id).await?;

        let mut model: voucher::ActiveModel = existing.into();
        if let Some(description) = update.description {
            model.description = Set(Some(description));
        }
        if let Some(discount_type) = update.discount_type {
            model.discount_type = Set(discount_type);
        }
        if let Some(discount_value) = update.discount_value {
            model.discount_value = Set(discount_value);
        }
        if let Some(max_discount) = update.max_discount {
            model.max_discount = Set(max_discount);
        }
        if let Some(min_order) = update.min_order {
            model.min_order = Set(min_order);
        }
        if let Some(usage_limit) = update.usage_limit {
            model.usage_limit = Set(usage_limit);
        }
        if let Some(valid_from) = update.valid_from {
            model.valid_from = Set(valid_from);
        }
        if let Some(valid_until) = update.valid_until {
            model.valid_until = Set(valid_until);
        }
        if let Some(is_active) = update.is_active {
            model.is_active = Set(is_active);
        }
        model.updated_at = Set(Some(Utc::now()));
        let updated = model.update(db).await?;

        let _ = self
            .event_sender
            .send(Event::VoucherUpdated {
                voucher_id: updated.id,
            })
            .await;

        Ok(updated)
    }

    /// Deletes a voucher.
    #[instrument(skip(self))]
    pub async fn delete_voucher(
        &self,
        branch_id: i64,
        voucher_id: i64,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.get_voucher(branch_id, voucher_id).await?;
        voucher::Entity::delete_by_id(existing.id).exec(db).await?;

        let _ = self
            .event_sender
            .send(Event::VoucherDeleted {
                voucher_id: existing.id,
            })
            .await;

        Ok(())
    }

    /// Validates a voucher code against an order subtotal and returns
    /// the discount it grants.
    ///
    /// Checks run in a fixed order and the first failure wins: active
    /// code exists, not yet valid, expired, usage limit, minimum order.
    /// Percentage discounts are capped by `max_discount`; fixed
    /// discounts never are. Usage count is not incremented here; it is
    /// bumped inside the settlement transaction.
    #[instrument(skip(self))]
    pub async fn validate_voucher(
        &self,
        branch_id: i64,
        code: &str,
        subtotal: Decimal,
    ) -> Result<ValidatedVoucher, ServiceError> {
        self.validate_voucher_on(&*self.db_pool, branch_id, code, subtotal)
            .await
    }

    /// Same checks, run on the caller's connection. Checkout uses this
    /// to validate inside its settlement transaction instead of taking
    /// a second connection from the pool.
    pub async fn validate_voucher_on<C: ConnectionTrait>(
        &self,
        db: &C,
        branch_id: i64,
        code: &str,
        subtotal: Decimal,
    ) -> Result<ValidatedVoucher, ServiceError> {
        let code = code.trim().to_uppercase();

        let voucher = voucher::Entity::find()
            .filter(voucher::Column::BranchId.eq(branch_id))
            .filter(voucher::Column::Code.eq(code))
            .filter(voucher::Column::IsActive.eq(true))
            .one(db)
            .await?
            .ok_or(ServiceError::VoucherNotFound)?;

        let now = Utc::now();
        if now < voucher.valid_from {
            return Err(ServiceError::VoucherNotYetValid);
        }
        if let Some(valid_until) = voucher.valid_until {
            if now > valid_until {
                return Err(ServiceError::VoucherExpired);
            }
        }
        if let Some(limit) = voucher.usage_limit {
            if voucher.usage_count >= limit {
                return Err(ServiceError::VoucherLimitReached);
            }
        }
        if subtotal < voucher.min_order {
            return Err(ServiceError::MinimumOrderNotMet(format_rupiah(
                voucher.min_order,
            )));
        }

        let discount_amount = compute_discount(&voucher, subtotal);
        Ok(ValidatedVoucher {
            voucher,
            discount_amount,
        })
    }
}

/// Discount granted by an already-validated voucher.
pub fn compute_discount(voucher: &voucher::Model, subtotal: Decimal) -> Decimal {
    match voucher.discount_type {
        DiscountType::Percentage => {
            let discount = subtotal * voucher.discount_value / dec!(100);
            match voucher.max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        DiscountType::Fixed => voucher.discount_value,
    }
}
