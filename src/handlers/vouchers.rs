use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::common::{validate_input, BranchContext},
    services::vouchers::{NewVoucher, VoucherUpdate},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateVoucherRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub subtotal: Decimal,
}

/// List vouchers for the branch
#[utoipa::path(
    get,
    path = "/api/v1/vouchers",
    responses((status = 200, description = "Vouchers, newest first")),
    tag = "vouchers"
)]
pub async fn list_vouchers(
    State(state): State<AppState>,
    ctx: BranchContext,
) -> Result<impl IntoResponse, ServiceError> {
    let vouchers = state.services.vouchers.list_vouchers(ctx.branch_id).await?;
    Ok(Json(ApiResponse::success(vouchers)))
}

/// Create a voucher
#[utoipa::path(
    post,
    path = "/api/v1/vouchers",
    request_body = NewVoucher,
    responses(
        (status = 201, description = "Voucher created"),
        (status = 409, description = "Voucher code already exists"),
        (status = 422, description = "Invalid payload")
    ),
    tag = "vouchers"
)]
pub async fn create_voucher(
    State(state): State<AppState>,
    ctx: BranchContext,
    Json(payload): Json<NewVoucher>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let voucher = state
        .services
        .vouchers
        .create_voucher(ctx.branch_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            voucher,
            "Voucher created".to_string(),
        )),
    ))
}

/// Get a voucher
#[utoipa::path(
    get,
    path = "/api/v1/vouchers/{id}",
    params(("id" = i64, Path, description = "Voucher id")),
    responses(
        (status = 200, description = "Voucher"),
        (status = 404, description = "Voucher not found")
    ),
    tag = "vouchers"
)]
pub async fn get_voucher(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let voucher = state.services.vouchers.get_voucher(ctx.branch_id, id).await?;
    Ok(Json(ApiResponse::success(voucher)))
}

/// Update a voucher
#[utoipa::path(
    put,
    path = "/api/v1/vouchers/{id}",
    params(("id" = i64, Path, description = "Voucher id")),
    request_body = VoucherUpdate,
    responses(
        (status = 200, description = "Voucher updated"),
        (status = 404, description = "Voucher not found")
    ),
    tag = "vouchers"
)]
pub async fn update_voucher(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
    Json(payload): Json<VoucherUpdate>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let voucher = state
        .services
        .vouchers
        .update_voucher(ctx.branch_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        voucher,
        "Voucher updated".to_string(),
    )))
}

/// Delete a voucher
#[utoipa::path(
    delete,
    path = "/api/v1/vouchers/{id}",
    params(("id" = i64, Path, description = "Voucher id")),
    responses(
        (status = 200, description = "Voucher deleted"),
        (status = 404, description = "Voucher not found")
    ),
    tag = "vouchers"
)]
pub async fn delete_voucher(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .vouchers
        .delete_voucher(ctx.branch_id, id)
        .await?;
    Ok(Json(ApiResponse::<()>::message_only(
        "Voucher deleted".to_string(),
    )))
}

/// Validate a voucher code against an order subtotal
#[utoipa::path(
    post,
    path = "/api/v1/vouchers/validate",
    request_body = ValidateVoucherRequest,
    responses(
        (status = 200, description = "Voucher valid, discount computed"),
        (status = 400, description = "Voucher rule failed"),
        (status = 404, description = "Invalid voucher code")
    ),
    tag = "vouchers"
)]
pub async fn validate_voucher(
    State(state): State<AppState>,
    ctx: BranchContext,
    Json(payload): Json<ValidateVoucherRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let validated = state
        .services
        .vouchers
        .validate_voucher(ctx.branch_id, &payload.code, payload.subtotal)
        .await?;
    Ok(Json(ApiResponse::success(validated)))
}
