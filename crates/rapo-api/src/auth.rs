//! Bearer-token authentication middleware (§6.2).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn authorize(
    State(state): State<Arc<AppState>>,
    header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = header else {
        return Err(ApiError::unauthorized());
    };
    if bearer.token() != state.bearer_token {
        return Err(ApiError::unauthorized());
    }
    Ok(next.run(request).await)
}
