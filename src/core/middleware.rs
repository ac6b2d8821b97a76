use axum::{extract::Request, middleware::Next, response::Response};

use crate::core::app_error::AppError;

fn id_from_header(req: &Request, header: &str) -> Result<i32, AppError> {
    req.headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or(AppError::Unauthorized)
}

/// Resolves the authenticated provider from the session header and exposes
/// its id as a request extension.
pub async fn providers_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let provider_id = id_from_header(&req, "x-provider-id")?;
    req.extensions_mut().insert(provider_id);
    Ok(next.run(req).await)
}

/// Same as [`providers_authorization`] but for customer sessions.
pub async fn customers_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let customer_id = id_from_header(&req, "x-customer-id")?;
    req.extensions_mut().insert(customer_id);
    Ok(next.run(req).await)
}
