//! Account REST handlers (ground: teacher's `api::handlers::account::
//! get_balances`, backed by `BalanceLedger::all_for_user` rather than a
//! `balances` table query since this crate's ledger is the source of truth).

use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use crate::external::identity::ResolvedUser;
use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::hub::HubState;
use crate::models::balance::BalanceResponse;

pub async fn get_balances<F, R, I>(
    State(state): State<Arc<HubState<F, R, I>>>,
    Extension(user): Extension<ResolvedUser>,
) -> Json<Vec<BalanceResponse>>
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let balances = state.ledger.all_for_user(user.user_id);
    Json(balances.iter().map(BalanceResponse::from).collect())
}
