//! Business logic services for the IEEP ERP platform

pub mod alert;
pub mod audit;
pub mod auth;
pub mod bom;
pub mod notification;
pub mod order;
pub mod product;
pub mod reporting;
pub mod stock;
pub mod user;
pub mod warehouse;

pub use alert::AlertService;
pub use audit::AuditService;
pub use auth::AuthService;
pub use bom::BomService;
pub use notification::{NotificationService, NotificationSink};
pub use order::OrderService;
pub use product::ProductService;
pub use reporting::ReportingService;
pub use stock::StockService;
pub use user::UserService;
pub use warehouse::WarehouseService;
