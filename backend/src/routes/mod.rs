//! Route definitions for the IEEP ERP platform

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/auth", session_routes())
        .nest("/users", user_routes())
        .route("/roles", get(handlers::list_roles))
        .route("/audit-logs", get(handlers::list_audit_logs))
        .nest("/products", product_routes())
        .nest("/categories", category_routes())
        .nest("/units", unit_routes())
        .nest("/boms", bom_routes())
        .nest("/warehouses", warehouse_routes())
        .nest("/stock", stock_routes())
        .nest("/alerts", alert_routes())
        .nest("/notifications", notification_routes())
        .nest("/orders", order_routes())
        .nest("/reports", report_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Auth routes (public)
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .merge(protected)
}

/// Session routes for an authenticated user
fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
}

/// User administration routes
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users).post(handlers::create_user))
        .route("/:user_id", get(handlers::get_user).put(handlers::update_user))
        .route("/:user_id/toggle-active", post(handlers::toggle_user_active))
        .route("/:user_id/reset-password", post(handlers::reset_user_password))
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
}

fn category_routes() -> Router<AppState> {
    Router::new().route("/", get(handlers::list_categories).post(handlers::create_category))
}

fn unit_routes() -> Router<AppState> {
    Router::new().route("/", get(handlers::list_units).post(handlers::create_unit))
}

/// Bill of materials routes
fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_boms).post(handlers::create_bom))
        .route("/cost-estimate", post(handlers::estimate_bom_cost))
        .route("/:bom_id", get(handlers::get_bom).put(handlers::update_bom))
        .route("/:bom_id/activate", post(handlers::activate_bom))
        .route("/:bom_id/components", post(handlers::add_bom_component))
        .route(
            "/:bom_id/components/:component_id",
            delete(handlers::remove_bom_component),
        )
}

/// Warehouse routes
fn warehouse_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_warehouses).post(handlers::create_warehouse))
        .route(
            "/:warehouse_id",
            get(handlers::get_warehouse).put(handlers::update_warehouse),
        )
}

/// Stock ledger routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(handlers::list_stock_items).post(handlers::create_stock_item))
        .route(
            "/items/:stock_item_id",
            get(handlers::get_stock_item).put(handlers::update_stock_item),
        )
        .route(
            "/items/:stock_item_id/transactions",
            get(handlers::list_stock_transactions).post(handlers::apply_stock_transaction),
        )
        .route("/items/:stock_item_id/reconcile", get(handlers::reconcile_stock_item))
        .route("/items/:stock_item_id/forecast", post(handlers::forecast_stock_item))
        .route("/items/:stock_item_id/alert-check", get(handlers::check_stock_alert))
        .route("/items/:stock_item_id/alert-sent", post(handlers::mark_stock_alert_sent))
        .route(
            "/items/:stock_item_id/alert-recipients",
            get(handlers::list_alert_recipients),
        )
        .route("/transfers", post(handlers::transfer_stock))
        .route("/forecasts", post(handlers::forecast_all_stock))
}

/// Reorder alert routes
fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_alerts))
        .route("/run", post(handlers::run_reorder_alerts))
        .route("/:alert_id", get(handlers::get_alert))
        .route("/:alert_id/resolve", post(handlers::resolve_alert))
        .route("/:alert_id/cancel", post(handlers::cancel_alert))
}

/// In-app notification routes
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_notifications))
        .route("/:notification_id/read", post(handlers::mark_as_read))
}

/// Order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/confirm", post(handlers::confirm_order))
        .route("/:order_id/status", post(handlers::update_order_status))
}

/// Reporting routes
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/low-stock", get(handlers::get_low_stock_report))
        .route("/stock-ledger", get(handlers::get_stock_ledger_report))
        .route("/bom-costs", get(handlers::get_bom_cost_report))
        .route("/warehouses", get(handlers::get_warehouse_status_report))
        .route("/procurement-aging", get(handlers::get_procurement_aging_report))
        .route("/expiring", get(handlers::get_expiring_stock_report))
}
