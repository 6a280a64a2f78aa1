//! Process bootstrap: config → database → ledger/store/resolvers → one
//! `MatchingEngine`+`MarketMatcherHandle` per configured trading pair →
//! market-data aggregation → hub/REST router → serve with graceful shutdown
//! (ground: teacher's `main.rs` service-initialization order and
//! `tracing_subscriber`/`axum::serve` idiom).

mod api;
mod config;
mod db;
mod errors;
mod external;
mod hub;
mod ledger;
mod marketdata;
mod matching;
mod metrics;
mod models;
mod shutdown;
mod store;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::api::middleware::{RateLimitConfig, RateLimiter};
use crate::config::AppConfig;
use crate::db::Database;
use crate::external::{AllowAllRiskResolver, JwtIdentityResolver, StaticFeeResolver};
use crate::hub::{HubState, MarketHandle};
use crate::ledger::BalanceLedger;
use crate::marketdata::MarketDataHub;
use crate::matching::MatchingEngine;
use crate::models::{Market, MarketStatus};
use crate::shutdown::Shutdown;
use crate::store::{
    memory::{InMemoryOrderStore, InMemoryTradeStore},
    postgres::{PostgresOrderStore, PostgresTradeStore},
    OrderStore, TradeStore,
};

/// Reference market parameters for a newly configured pair. The exchange
/// ships no market-onboarding workflow (spec Non-goal); every configured
/// pair gets the same conservative grid until an admin surface exists.
fn default_market(symbol: &str, base_asset: &str, quote_asset: &str) -> Market {
    Market {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        base_asset: base_asset.to_string(),
        quote_asset: quote_asset.to_string(),
        price_precision: 2,
        quantity_precision: 6,
        tick_size: dec!(0.01),
        lot_size: dec!(0.000001),
        min_order_size: dec!(0.0001),
        max_order_size: None,
        min_notional: dec!(10),
        max_notional: None,
        status: MarketStatus::Active,
        trading_enabled: true,
        maker_fee: dec!(0.001),
        taker_fee: dec!(0.001),
        slippage_cap: dec!(0.05),
        last_price: None,
        high_24h: None,
        low_24h: None,
        volume_24h: Decimal::ZERO,
    }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    pair.split_once('/')
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_exchange_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("starting exchange core v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(environment = %config.environment, "loaded configuration");

    let metrics_handle = metrics::init_metrics();

    let (store, trade_store) = if config.environment == "test" {
        (OrderStore::Memory(InMemoryOrderStore::new()), TradeStore::Memory(InMemoryTradeStore::new()))
    } else {
        let db = Database::connect(&config.database_url).await?;
        tracing::info!("database connected");
        (
            OrderStore::Postgres(PostgresOrderStore::new(db.pool.clone())),
            TradeStore::Postgres(PostgresTradeStore::new(db.pool)),
        )
    };

    let ledger = BalanceLedger::new();
    let identity = Arc::new(JwtIdentityResolver::new(&config.jwt_secret));
    let market_data = Arc::new(MarketDataHub::new());

    let hub_state = Arc::new(HubState::new(
        market_data.clone(),
        store.clone(),
        trade_store.clone(),
        ledger.clone(),
        identity,
    ));

    let shutdown = Shutdown::new();
    let (merged_tx, merged_rx) = tokio::sync::mpsc::channel(4096);

    let trading_pairs = config.get_trading_pairs();
    if trading_pairs.is_empty() {
        tracing::warn!("no trading pairs configured; the exchange will start with no markets");
    }

    for pair in &trading_pairs {
        let Some((base_asset, quote_asset)) = split_pair(pair) else {
            tracing::warn!(pair, "skipping malformed trading pair, expected BASE/QUOTE");
            continue;
        };
        let market = default_market(pair, base_asset, quote_asset);
        let market_id = market.id;
        let maker_fee = market.maker_fee;
        let taker_fee = market.taker_fee;

        let fee_resolver = Arc::new(StaticFeeResolver { maker_rate: maker_fee, taker_rate: taker_fee });
        let risk_resolver = Arc::new(AllowAllRiskResolver);

        let engine = MatchingEngine::new(
            market,
            ledger.clone(),
            store.clone(),
            trade_store.clone(),
            fee_resolver,
            risk_resolver,
        );
        let matcher = matching::spawn(engine.clone(), config.matcher_queue_depth);

        market_data.register_market(market_id);
        marketdata::spawn_market_feed(market_id, engine.subscribe_trades(), merged_tx.clone());

        tokio::spawn(matching::sweeper::run(
            matcher.clone(),
            store.clone(),
            market_id,
            shutdown.notify_handle(),
        ));

        hub_state.register_market(pair.clone(), MarketHandle { matcher, engine });
        tracing::info!(pair, %market_id, "market registered");
    }

    tokio::spawn(marketdata::run(market_data.clone(), merged_rx));

    let rate_limiter = RateLimiter::new(RateLimitConfig::default());

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .nest("/ws", hub::create_router())
        .nest("/api/v1", api::create_router(hub_state.clone(), rate_limiter))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(hub_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_signal = shutdown.clone();
    tokio::spawn(shutdown_signal.signal());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
