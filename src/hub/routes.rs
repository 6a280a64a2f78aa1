use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::external::{FeeResolver, IdentityResolver, RiskResolver};

use super::session::handle_socket;
use super::state::HubState;

pub fn create_router<F, R, I>() -> Router<Arc<HubState<F, R, I>>>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    Router::new().route("/", get(ws_handler::<F, R, I>))
}

async fn ws_handler<F, R, I>(ws: WebSocketUpgrade, State(state): State<Arc<HubState<F, R, I>>>) -> Response
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
