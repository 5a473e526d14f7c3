//! Axum middleware attached to the gateway router.
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::core::forwarder::X_REQUEST_ID;

/// Ensure every request carries an `X-Request-ID`.
///
/// An id supplied by the caller is kept; otherwise a UUID v4 is generated. The
/// id is written into the request (so it is forwarded upstream) and echoed on
/// the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(X_REQUEST_ID);
    let request_id = match req.headers().get(&header_name) {
        Some(existing) if !existing.is_empty() => existing.clone(),
        _ => {
            let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string());
            match generated {
                Ok(value) => {
                    req.headers_mut().insert(header_name.clone(), value.clone());
                    value
                }
                Err(_) => return next.run(req).await,
            }
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(header_name, request_id);
    response
}
