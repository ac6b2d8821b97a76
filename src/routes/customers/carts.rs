use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    api::products::get_product_unit_prices,
    cart,
    core::{
        app_error::{AppError, ConflictKind, StdResponse},
        app_state::AppState,
        middleware,
    },
    models::{
        CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity, ProductEntity,
        VendorEntity,
    },
    schema::{cart_items, carts, products, vendors},
};

/// Defines all customer-facing cart routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/customers/carts",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_cart))
            .routes(utoipa_axum::routes!(clear_cart))
            .routes(utoipa_axum::routes!(add_cart_item))
            .routes(utoipa_axum::routes!(remove_cart_item))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
struct GetCartRes {
    pub cart: CartEntity,
    pub cart_items: Vec<CartItemEntity>,
    pub total_price: f32,
}

/// Fetch the authenticated customer's active cart.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Carts"],
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<GetCartRes, String>),
        (status = 404, description = "Customer has no active cart")
    )
)]
async fn get_my_cart(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart: Option<CartEntity> = carts::table
        .filter(carts::customer_id.eq(customer_id))
        .get_result(conn)
        .await
        .optional()?;
    let Some(cart) = cart else {
        return Err(AppError::NotFound);
    };

    let items: Vec<CartItemEntity> = cart_items::table
        .filter(cart_items::cart_id.eq(cart.id))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let product_ids = items.iter().map(|item| item.product_id).collect();
    let unit_prices = get_product_unit_prices(conn, product_ids).await?;
    let total_price = cart::total_price(&items, &unit_prices);

    Ok(StdResponse {
        success: true,
        data: Some(GetCartRes {
            cart,
            cart_items: items,
            total_price,
        }),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddCartItemReq {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Serialize, ToSchema)]
struct AddCartItemRes {
    pub cart: CartEntity,
    pub cart_items: Vec<CartItemEntity>,
}

/// Add a product to the cart, enforcing the single-vendor invariant.
///
/// The cart row is locked for the duration of the transaction, so the
/// vendor check and the upsert are atomic with respect to concurrent
/// add-item calls for the same customer.
#[utoipa::path(
    post,
    path = "/items",
    tags = ["Carts"],
    responses(
        (status = 200, description = "Item added", body = StdResponse<AddCartItemRes, String>),
        (status = 409, description = "Cart holds items from a different vendor")
    )
)]
async fn add_cart_item(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    axum::Json(body): axum::Json<AddCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.quantity <= 0 {
        return Err(AppError::Validation(
            "quantity must be a positive integer".to_string(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (cart, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let existing: Option<CartEntity> = carts::table
                    .filter(carts::customer_id.eq(customer_id))
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?;

                // concurrent first-adds race on the insert; the unique
                // customer_id constraint collapses them onto one row
                let cart = match existing {
                    Some(cart) => cart,
                    None => {
                        diesel::insert_into(carts::table)
                            .values(CreateCartEntity { customer_id })
                            .on_conflict(carts::customer_id)
                            .do_nothing()
                            .execute(conn)
                            .await?;
                        carts::table
                            .filter(carts::customer_id.eq(customer_id))
                            .for_update()
                            .get_result(conn)
                            .await?
                    }
                };

                let product: Option<ProductEntity> = products::table
                    .find(body.product_id)
                    .get_result(conn)
                    .await
                    .optional()?;
                let Some(product) = product else {
                    return Err(AppError::NotFound);
                };
                if !product.active {
                    return Err(AppError::Unavailable(format!(
                        "product {} is not active",
                        product.id
                    )));
                }
                if product.stock_quantity < body.quantity {
                    return Err(AppError::Unavailable(format!(
                        "insufficient stock for product {}",
                        product.id
                    )));
                }

                let items: Vec<CartItemEntity> = cart_items::table
                    .filter(cart_items::cart_id.eq(cart.id))
                    .get_results(conn)
                    .await?;

                if let Some(existing_vendor_id) = cart::vendor_conflict(&items, product.vendor_id) {
                    let vendor: VendorEntity = vendors::table
                        .find(existing_vendor_id)
                        .get_result(conn)
                        .await?;
                    return Err(AppError::Conflict(ConflictKind::DifferentVendor {
                        vendor_id: vendor.id,
                        vendor_name: vendor.name,
                    }));
                }

                diesel::insert_into(cart_items::table)
                    .values(CreateCartItemEntity {
                        cart_id: cart.id,
                        product_id: product.id,
                        vendor_id: product.vendor_id,
                        quantity: body.quantity,
                    })
                    .on_conflict((cart_items::cart_id, cart_items::product_id))
                    .do_update()
                    .set((
                        cart_items::quantity.eq(cart_items::quantity + body.quantity),
                        cart_items::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;

                let cart: CartEntity = diesel::update(carts::table.find(cart.id))
                    .set(carts::updated_at.eq(diesel::dsl::now))
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let items: Vec<CartItemEntity> = cart_items::table
                    .filter(cart_items::cart_id.eq(cart.id))
                    .get_results(conn)
                    .await?;

                Ok::<(CartEntity, Vec<CartItemEntity>), AppError>((cart, items))
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(AddCartItemRes {
            cart,
            cart_items: items,
        }),
        message: Some("Item added to cart successfully"),
    })
}

/// Remove one product from the cart.
#[utoipa::path(
    delete,
    path = "/items/{product_id}",
    tags = ["Carts"],
    params(
        ("product_id" = i32, Path, description = "Product to remove")
    ),
    responses(
        (status = 200, description = "Item removed", body = StdResponse<CartItemEntity, String>),
        (status = 404, description = "No such item in the cart")
    )
)]
async fn remove_cart_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let removed = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: CartEntity = carts::table
                    .filter(carts::customer_id.eq(customer_id))
                    .get_result(conn)
                    .await?;

                let removed: CartItemEntity = diesel::delete(
                    cart_items::table
                        .filter(cart_items::cart_id.eq(cart.id))
                        .filter(cart_items::product_id.eq(product_id)),
                )
                .returning(CartItemEntity::as_returning())
                .get_result(conn)
                .await?;

                Ok::<CartItemEntity, AppError>(removed)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(removed),
        message: Some("Item removed from cart successfully"),
    })
}

/// Delete the customer's cart; its items go with it.
#[utoipa::path(
    delete,
    path = "/",
    tags = ["Carts"],
    responses(
        (status = 200, description = "Cart cleared", body = StdResponse<CartEntity, String>),
        (status = 404, description = "Customer has no active cart")
    )
)]
async fn clear_cart(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart: CartEntity =
        diesel::delete(carts::table.filter(carts::customer_id.eq(customer_id)))
            .returning(CartEntity::as_returning())
            .get_result(conn)
            .await?;

    Ok(StdResponse {
        success: true,
        data: Some(cart),
        message: Some("Cart cleared successfully"),
    })
}
