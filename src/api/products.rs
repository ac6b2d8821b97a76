use std::collections::HashMap;

use anyhow::Context;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;

use crate::core::app_error::AppError;
use crate::core::db::DbConn;
use crate::models::ProductEntity;
use crate::schema::products;

pub async fn get_product_unit_prices(
    conn: &mut DbConn<'_>,
    ids: Vec<i32>,
) -> Result<HashMap<i32, f32>, AppError> {
    let products: Vec<ProductEntity> = products::table
        .filter(products::id.eq_any(&ids))
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    Ok(products
        .into_iter()
        .map(|product| (product.id, product.unit_price))
        .collect())
}
