//! One duplex session (spec §4.6): connect → `welcome` → optional `auth` →
//! `subscribe`/`unsubscribe`/request-response operations → `close`. Ground:
//! teacher's `websocket::handler::handle_socket` `tokio::select!` loop,
//! generalized from a fixed set of receivers to a dynamic per-subscription
//! fan-in (this hub's topic set is open-ended per market/user, unlike the
//! teacher's fixed four-receiver shape).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::external::identity::ResolvedUser;
use crate::external::{FeeResolver, IdentityResolver, RiskResolver};
use crate::models::PlaceOrderRequest;
use crate::store::OrderFilters;

use super::protocol::{ClientMessage, ErrorCode, ServerError, ServerPush, ServerResponse};
use super::rate_limit::{SessionRateLimiter, MAX_SUBSCRIPTIONS};
use super::state::HubState;
use super::topics::{parse_interval, Topic};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);
const MAILBOX_CAPACITY: usize = 256;

struct Session {
    out_tx: mpsc::Sender<String>,
    authenticated: Option<ResolvedUser>,
    subscriptions: HashSet<String>,
    forwarders: HashMap<String, Vec<JoinHandle<()>>>,
    rate_limiter: SessionRateLimiter,
}

impl Session {
    fn new(out_tx: mpsc::Sender<String>) -> Self {
        Self {
            out_tx,
            authenticated: None,
            subscriptions: HashSet::new(),
            forwarders: HashMap::new(),
            rate_limiter: SessionRateLimiter::default(),
        }
    }

    /// Non-blocking enqueue onto the session's own bounded mailbox (spec
    /// §4.6 "the hub never blocks a publisher on a slow consumer").
    fn push(&self, message: impl serde::Serialize) {
        if let Ok(text) = serde_json::to_string(&message) {
            if self.out_tx.try_send(text).is_err() {
                debug!("session mailbox full, dropping push");
            }
        }
    }

    fn teardown(&mut self) {
        for (_, handles) in self.forwarders.drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

pub async fn handle_socket<F, R, I>(socket: WebSocket, state: Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(MAILBOX_CAPACITY);
    let mut session = Session::new(out_tx);

    session.push(ServerPush::new("welcome", json!({})));

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut liveness_check = tokio::time::interval(Duration::from_secs(10));
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        handle_client_text(&text, &mut session, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = Instant::now();
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("session socket error: {e}");
                        break;
                    }
                }
            }
            Some(text) = out_rx.recv() => {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                session.push(ServerPush::new("heartbeat", json!({})));
            }
            _ = liveness_check.tick() => {
                if last_activity.elapsed() > LIVENESS_TIMEOUT {
                    debug!("session idle past liveness timeout, closing");
                    break;
                }
            }
        }
    }

    session.teardown();
}

async fn handle_client_text<F, R, I>(text: &str, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            session.push(ServerError::new(None, ErrorCode::InvalidJson, e.to_string()));
            return;
        }
    };

    if !session.rate_limiter.check() {
        session.push(ServerError::new(Some(message.id), ErrorCode::RateLimitExceeded, "rate limit exceeded"));
        return;
    }

    let id = message.id.clone();
    match message.kind.as_str() {
        "ping" => session.push(ServerResponse::new(id, "pong", json!({}))),
        "auth" => handle_auth(id, message, session, state).await,
        "subscribe" => handle_subscribe(id, message, session, state).await,
        "unsubscribe" => handle_unsubscribe(id, message, session),
        "placeOrder" => handle_place_order(id, message, session, state).await,
        "cancelOrder" => handle_cancel_order(id, message, session, state).await,
        "getOrderBook" => handle_get_orderbook(id, message, session, state),
        "getTicker" => handle_get_ticker(id, message, session, state),
        "getCandles" => handle_get_candles(id, message, session, state),
        "getOrders" => handle_get_orders(id, message, session, state).await,
        "getTrades" => handle_get_trades(id, message, session, state).await,
        _ => session.push(ServerError::new(Some(id), ErrorCode::UnknownMessageType, message.kind)),
    }
}

async fn handle_auth<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(token) = message.data.get("token").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingToken, "missing token"));
        return;
    };
    match state.identity.verify(token).await {
        Ok(user) if user.active => {
            session.authenticated = Some(user.clone());
            session.push(ServerResponse::new(id, "auth", json!({"user_id": user.user_id, "vip_level": user.vip_level})));
        }
        Ok(_) => session.push(ServerError::new(Some(id), ErrorCode::AuthFailed, "account inactive")),
        Err(e) => session.push(ServerError::new(Some(id), ErrorCode::AuthFailed, e.to_string())),
    }
}

fn handle_unsubscribe(id: String, message: ClientMessage, session: &mut Session) {
    let Some(channel) = message.data.get("channel").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingParams, "missing channel"));
        return;
    };
    session.subscriptions.remove(channel);
    if let Some(handles) = session.forwarders.remove(channel) {
        for handle in handles {
            handle.abort();
        }
    }
    session.push(ServerResponse::new(id, "unsubscribed", json!({"channel": channel})));
}

async fn handle_subscribe<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(channel) = message.data.get("channel").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingParams, "missing channel"));
        return;
    };
    let Some(topic) = Topic::parse(channel) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidChannel, channel.to_string()));
        return;
    };
    if topic.is_private() {
        let authorized = match (&session.authenticated, &topic) {
            (Some(user), super::topics::Topic::OrdersPrivate(uid)) => user.user_id == *uid,
            (Some(user), super::topics::Topic::TradesPrivate(uid)) => user.user_id == *uid,
            _ => false,
        };
        if session.authenticated.is_none() {
            session.push(ServerError::new(Some(id), ErrorCode::NotAuthenticated, "authentication required"));
            return;
        }
        if !authorized {
            session.push(ServerError::new(Some(id), ErrorCode::AuthFailed, "cannot subscribe to another user's private topic"));
            return;
        }
    }
    if session.subscriptions.len() >= MAX_SUBSCRIPTIONS {
        session.push(ServerError::new(Some(id), ErrorCode::SubscriptionLimit, "subscription limit reached"));
        return;
    }

    match super::feeds::spawn_forwarder(&topic, state, session.out_tx.clone()) {
        Ok(handles) => {
            session.subscriptions.insert(channel.to_string());
            session.forwarders.insert(channel.to_string(), handles);
            session.push(ServerResponse::new(id, "subscribed", json!({"channel": channel})));
        }
        Err(code) => session.push(ServerError::new(Some(id), code, "unable to subscribe")),
    }
}

async fn handle_place_order<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(user) = session.authenticated.clone() else {
        session.push(ServerError::new(Some(id), ErrorCode::NotAuthenticated, "authentication required"));
        return;
    };
    let request: PlaceOrderRequest = match serde_json::from_value(message.data) {
        Ok(r) => r,
        Err(e) => {
            session.push(ServerError::new(Some(id), ErrorCode::InvalidOrderData, e.to_string()));
            return;
        }
    };
    let Some(handle) = state.market(&request.symbol) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidOrderData, "unknown market"));
        return;
    };
    match handle.matcher.place_order(user.user_id, request, user.vip_level).await {
        Ok((order, _trades)) => session.push(ServerResponse::new(id, "order", json!(order))),
        Err(e) => session.push(ServerError::new(Some(id), ErrorCode::OrderFailed, e.to_string())),
    }
}

async fn handle_cancel_order<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    if session.authenticated.is_none() {
        session.push(ServerError::new(Some(id), ErrorCode::NotAuthenticated, "authentication required"));
        return;
    }
    let Some(order_id) = message.data.get("order_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingOrderId, "missing or invalid order_id"));
        return;
    };
    let Some(symbol) = message.data.get("symbol").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingParams, "missing symbol"));
        return;
    };
    let Some(handle) = state.market(symbol) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidOrderData, "unknown market"));
        return;
    };
    match handle.matcher.cancel_order(order_id).await {
        Ok(order) => session.push(ServerResponse::new(id, "order", json!(order))),
        Err(e) => session.push(ServerError::new(Some(id), ErrorCode::CancelFailed, e.to_string())),
    }
}

fn handle_get_orderbook<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(symbol) = message.data.get("symbol").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingSymbol, "missing symbol"));
        return;
    };
    let Some(handle) = state.market(symbol) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidChannel, "unknown market"));
        return;
    };
    let depth = message.data.get("depth").and_then(|v| v.as_u64()).unwrap_or(20) as usize;
    let snapshot = handle.engine.book.snapshot(depth);
    session.push(ServerResponse::new(id, "orderBook", json!(snapshot)));
}

fn handle_get_ticker<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(symbol) = message.data.get("symbol").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingSymbol, "missing symbol"));
        return;
    };
    let Some(handle) = state.market(symbol) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidChannel, "unknown market"));
        return;
    };
    let market_id = handle.engine.market_id();
    match state.market_data.ticker(market_id) {
        Some(ticker) => session.push(ServerResponse::new(id, "ticker", json!(ticker))),
        None => session.push(ServerResponse::new(id, "ticker", json!(null))),
    }
}

fn handle_get_candles<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(symbol) = message.data.get("symbol").and_then(|v| v.as_str()) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingSymbol, "missing symbol"));
        return;
    };
    let Some(handle) = state.market(symbol) else {
        session.push(ServerError::new(Some(id), ErrorCode::InvalidChannel, "unknown market"));
        return;
    };
    let Some(interval) = message.data.get("interval").and_then(|v| v.as_str()).and_then(parse_interval) else {
        session.push(ServerError::new(Some(id), ErrorCode::MissingParams, "missing or invalid interval"));
        return;
    };
    let limit = message.data.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);
    let market_id = handle.engine.market_id();
    let candles = state.market_data.candles(market_id, interval, limit, None, None);
    session.push(ServerResponse::new(id, "candles", json!(candles)));
}

async fn handle_get_orders<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(user) = session.authenticated.clone() else {
        session.push(ServerError::new(Some(id), ErrorCode::NotAuthenticated, "authentication required"));
        return;
    };
    let market_filter = message.data.get("symbol").and_then(|v| v.as_str()).and_then(|s| state.market(s)).map(|h| h.engine.market_id());
    match state.store.find_by_user(user.user_id, OrderFilters::default()).await {
        Ok(orders) => {
            let orders: Vec<_> = orders
                .into_iter()
                .filter(|o| market_filter.map_or(true, |m| o.market_id == m))
                .collect();
            session.push(ServerResponse::new(id, "orders", json!(orders)));
        }
        Err(e) => session.push(ServerError::new(Some(id), ErrorCode::OrderFailed, e.to_string())),
    }
}

async fn handle_get_trades<F, R, I>(id: String, message: ClientMessage, session: &mut Session, state: &Arc<HubState<F, R, I>>)
where
    F: FeeResolver + 'static,
    R: RiskResolver + 'static,
    I: IdentityResolver + 'static,
{
    let Some(user) = session.authenticated.clone() else {
        session.push(ServerError::new(Some(id), ErrorCode::NotAuthenticated, "authentication required"));
        return;
    };
    let market_filter = message.data.get("symbol").and_then(|v| v.as_str()).and_then(|s| state.market(s)).map(|h| h.engine.market_id());
    let limit = message.data.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);
    let filters = crate::store::TradeFilters { market_id: market_filter, limit };
    match state.trade_store.find_by_user(user.user_id, filters).await {
        Ok(trades) => session.push(ServerResponse::new(id, "trades", json!(trades))),
        Err(e) => session.push(ServerError::new(Some(id), ErrorCode::OrderFailed, e.to_string())),
    }
}
