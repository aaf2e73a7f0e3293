use std::sync::Arc;

use crate::services::{SaleService, VoucherService};

pub mod common;
pub mod sales;
pub mod vouchers;

/// Aggregate of all business services, shared through the app state.
#[derive(Clone)]
pub struct AppServices {
    pub sales: Arc<SaleService>,
    pub vouchers: Arc<VoucherService>,
}
