//! Bearer-token auth middleware (ground: teacher's `auth::middleware::
//! auth_middleware`, generalized from wallet/EIP-712 signature auth to the
//! Identity resolver's opaque-token contract used by the hub).

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::external::identity::ResolvedUser;
use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::hub::HubState;

pub async fn auth_middleware<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let auth_header = request.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let user: ResolvedUser = state.identity.verify(token).await.map_err(|_| StatusCode::UNAUTHORIZED)?;
    if !user.active {
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
