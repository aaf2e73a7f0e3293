pub mod customer;
pub mod payment;
pub mod product_variant;
pub mod refund;
pub mod sale;
pub mod sale_item;
pub mod voucher;

pub use customer::Entity as Customer;
pub use payment::Entity as Payment;
pub use product_variant::Entity as ProductVariant;
pub use refund::Entity as Refund;
pub use sale::Entity as Sale;
pub use sale_item::Entity as SaleItem;
pub use voucher::Entity as Voucher;
