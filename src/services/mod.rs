pub mod pricing;
pub mod receipts;
pub mod sales;
pub mod vouchers;

pub use sales::SaleService;
pub use vouchers::VoucherService;
