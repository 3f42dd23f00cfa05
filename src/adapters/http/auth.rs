//! API-key authentication middleware.
//!
//! Every `/api` route requires `X-Api-Key`; the key resolves to a user row
//! whose identity (and credit balance) the handlers read from request
//! extensions. Requests without a valid key get 401. Fail-closed: a ledger
//! error during resolution is a 500, not a pass.

use crate::ports::CreditLedgerPort;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AuthState {
    pub ledger: Arc<dyn CreditLedgerPort>,
}

/// Resolve `X-Api-Key` to a user and stash it in request extensions.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(api_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match auth.ledger.get_user_by_api_key(&api_key).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            warn!(error = %e, "api key resolution failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
