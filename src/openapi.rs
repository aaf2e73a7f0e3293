use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::payment::{PaymentMethod, PaymentStatus};
use crate::entities::refund::RefundStatus;
use crate::entities::sale::SaleStatus;
use crate::entities::voucher::DiscountType;
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::sales::{
    CreateSaleRequest, PaymentRequest, RefundResult, SaleDetails, SaleItemRequest, SettledSale,
    VariantRef,
};
use crate::services::vouchers::{NewVoucher, ValidatedVoucher, VoucherUpdate};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kopi Kuy POS API",
        version = "0.1.0",
        description = r#"
Café point-of-sale backend: order settlement with loyalty tiers, vouchers
and points, plus thermal receipt rendering.

All endpoints are scoped to a branch via the `X-Branch-Id` header. Amounts
are Indonesian rupiah with decimal precision; receipts render them as
integers with `.` thousands separators.
"#
    ),
    tags(
        (name = "sales", description = "Checkout, void, refund and receipts"),
        (name = "vouchers", description = "Voucher administration and validation")
    ),
    paths(
        handlers::sales::create_sale,
        handlers::sales::list_sales,
        handlers::sales::get_sale,
        handlers::sales::void_sale,
        handlers::sales::refund_sale,
        handlers::sales::get_receipt,
        handlers::vouchers::list_vouchers,
        handlers::vouchers::create_voucher,
        handlers::vouchers::get_voucher,
        handlers::vouchers::update_voucher,
        handlers::vouchers::delete_voucher,
        handlers::vouchers::validate_voucher,
    ),
    components(schemas(
        CreateSaleRequest,
        SaleItemRequest,
        PaymentRequest,
        VariantRef,
        SettledSale,
        SaleDetails,
        RefundResult,
        NewVoucher,
        VoucherUpdate,
        ValidatedVoucher,
        PaymentMethod,
        PaymentStatus,
        RefundStatus,
        SaleStatus,
        DiscountType,
        ErrorResponse,
        handlers::sales::RefundRequest,
        handlers::sales::ReceiptResponse,
        handlers::vouchers::ValidateVoucherRequest,
    ))
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/swagger-ui`, serving the OpenAPI document from
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
