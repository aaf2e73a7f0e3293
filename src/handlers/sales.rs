use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    handlers::common::{validate_input, BranchContext},
    services::sales::{CreateSaleRequest, SaleFilters},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiptQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub format: String,
    pub content: String,
}

/// Settle a checkout
#[utoipa::path(
    post,
    path = "/api/v1/sales",
    request_body = CreateSaleRequest,
    responses(
        (status = 201, description = "Sale completed"),
        (status = 400, description = "Insufficient points, stock or invalid discount"),
        (status = 404, description = "Variant or customer not found"),
        (status = 422, description = "Missing items, payments or branch context")
    ),
    tag = "sales"
)]
pub async fn create_sale(
    State(state): State<AppState>,
    ctx: BranchContext,
    Json(payload): Json<CreateSaleRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let settled = state
        .services
        .sales
        .create_sale(ctx.branch_id, ctx.cashier_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            settled,
            "Sale completed".to_string(),
        )),
    ))
}

/// List sales for the branch
#[utoipa::path(
    get,
    path = "/api/v1/sales",
    params(
        ("date_from" = Option<String>, Query, description = "Inclusive lower bound (YYYY-MM-DD)"),
        ("date_to" = Option<String>, Query, description = "Inclusive upper bound (YYYY-MM-DD)"),
        ("status" = Option<String>, Query, description = "completed | voided | refunded")
    ),
    responses((status = 200, description = "Sales, newest first, capped at 100")),
    tag = "sales"
)]
pub async fn list_sales(
    State(state): State<AppState>,
    ctx: BranchContext,
    Query(filters): Query<SaleFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let sales = state
        .services
        .sales
        .list_sales(ctx.branch_id, filters)
        .await?;
    Ok(Json(ApiResponse::success(sales)))
}

/// Get a sale with items and payments
#[utoipa::path(
    get,
    path = "/api/v1/sales/{id}",
    params(("id" = i64, Path, description = "Sale id")),
    responses(
        (status = 200, description = "Sale details"),
        (status = 404, description = "Sale not found")
    ),
    tag = "sales"
)]
pub async fn get_sale(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.sales.get_sale(ctx.branch_id, id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Void a completed sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/{id}/void",
    params(("id" = i64, Path, description = "Sale id")),
    responses(
        (status = 200, description = "Sale voided, stock restored"),
        (status = 404, description = "Sale not found"),
        (status = 409, description = "Sale already voided")
    ),
    tag = "sales"
)]
pub async fn void_sale(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.sales.void_sale(ctx.branch_id, id).await?;
    Ok(Json(ApiResponse::<()>::message_only(
        "Sale voided".to_string(),
    )))
}

/// Refund a completed sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/{id}/refund",
    params(("id" = i64, Path, description = "Sale id")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund recorded, stock restored"),
        (status = 404, description = "Sale not found"),
        (status = 409, description = "Sale is not refundable")
    ),
    tag = "sales"
)]
pub async fn refund_sale(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
    payload: Option<Json<RefundRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let reason = payload.and_then(|Json(p)| p.reason);
    let result = state
        .services
        .sales
        .refund_sale(ctx.branch_id, id, ctx.cashier_id, reason)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        result,
        "Sale refunded".to_string(),
    )))
}

/// Render the printable receipt for a sale
#[utoipa::path(
    get,
    path = "/api/v1/sales/{id}/receipt",
    params(
        ("id" = i64, Path, description = "Sale id"),
        ("format" = Option<String>, Query, description = "Receipt style, defaults to thermal")
    ),
    responses(
        (status = 200, description = "Receipt text"),
        (status = 404, description = "Sale not found")
    ),
    tag = "sales"
)]
pub async fn get_receipt(
    State(state): State<AppState>,
    ctx: BranchContext,
    Path(id): Path<i64>,
    Query(query): Query<ReceiptQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let format = query.format.unwrap_or_else(|| "thermal".to_string());
    let content = state.services.sales.render_receipt(ctx.branch_id, id).await?;
    Ok(Json(ApiResponse::success(ReceiptResponse {
        format,
        content,
    })))
}
