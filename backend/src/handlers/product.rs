//! Product catalog handlers: products, categories and units of measure

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Action, Category, Product, Resource, UnitOfMeasure};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::product::{
    CategoryWithCounts, CreateCategoryInput, CreateProductInput, CreateUnitInput, ProductFilter,
    UpdateProductInput,
};
use crate::services::ProductService;
use crate::AppState;

fn product_service(state: &AppState) -> ProductService {
    ProductService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<Product>>> {
    user.require(Resource::Product, Action::View)?;
    Ok(Json(product_service(&state).list_products(&filter).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    user.require(Resource::Product, Action::View)?;
    Ok(Json(product_service(&state).get_product(product_id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    user.require(Resource::Product, Action::Create)?;
    let product = product_service(&state)
        .create_product(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    user.require(Resource::Product, Action::Edit)?;
    let product = product_service(&state)
        .update_product(&actor(&user, ip), product_id, input)
        .await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(product_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(Resource::Product, Action::Delete)?;
    product_service(&state)
        .delete_product(&actor(&user, ip), product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_categories(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<CategoryWithCounts>>> {
    user.require(Resource::Product, Action::View)?;
    Ok(Json(product_service(&state).list_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    user.require(Resource::Product, Action::Create)?;
    let category = product_service(&state)
        .create_category(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_units(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<UnitOfMeasure>>> {
    user.require(Resource::Product, Action::View)?;
    Ok(Json(product_service(&state).list_units().await?))
}

pub async fn create_unit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateUnitInput>,
) -> AppResult<(StatusCode, Json<UnitOfMeasure>)> {
    user.require(Resource::Product, Action::Create)?;
    let unit = product_service(&state)
        .create_unit(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(unit)))
}
