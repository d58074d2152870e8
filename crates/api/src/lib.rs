//! HTTP and WebSocket API server for the marketplace.
//!
//! Exposes the cart, checkout, negotiation, order and payment
//! operations over REST, pushes thread messages over WebSocket, and
//! carries structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use engine::{CartService, EngineConfig, MessageFeed, NegotiationService, OrderEngine};
use market_store::MarketStore;
use metrics_exporter_prometheus::PrometheusHandle;
use payment::{MockGateway, PaymentService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub cart: CartService,
    pub chat: NegotiationService,
    pub engine: OrderEngine,
    pub payments: PaymentService,
    pub feed: MessageFeed,
    pub store: Arc<dyn MarketStore>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart/{shopkeeper_id}/lines", post(routes::cart::add_line))
        .route("/cart/{shopkeeper_id}", get(routes::cart::list))
        .route("/cart/{shopkeeper_id}", delete(routes::cart::clear))
        .route("/checkout/{shopkeeper_id}", post(routes::orders::checkout))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route(
            "/orders/shopkeeper/{id}",
            get(routes::orders::list_for_shopkeeper),
        )
        .route("/orders/vendor/{id}", get(routes::orders::list_for_vendor))
        .route("/orders/{id}/status", post(routes::orders::advance_status))
        .route(
            "/dashboard/shopkeeper/{id}/total",
            get(routes::orders::shopkeeper_total),
        )
        .route(
            "/dashboard/vendor/{id}/total",
            get(routes::orders::vendor_total),
        )
        .route("/threads", post(routes::threads::open))
        .route("/threads/vendor/{id}", get(routes::threads::list_for_vendor))
        .route(
            "/threads/shopkeeper/{id}",
            get(routes::threads::list_for_shopkeeper),
        )
        .route("/threads/{id}/messages", get(routes::threads::messages))
        .route("/threads/{id}/messages", post(routes::threads::send_message))
        .route(
            "/threads/{id}/estimation",
            post(routes::threads::send_estimation),
        )
        .route("/threads/{id}/invoice", post(routes::threads::send_invoice))
        .route("/threads/{id}/feed", get(routes::feed::subscribe))
        .route(
            "/payments/order",
            post(routes::payments::create_gateway_order),
        )
        .route("/payments/verify", post(routes::payments::verify))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the services over a store and returns the shared state.
///
/// The payment gateway is the in-memory mock; a real deployment swaps
/// it by building `AppState` directly.
pub fn create_default_state(
    store: Arc<dyn MarketStore>,
    payment_secret: &str,
    config: EngineConfig,
) -> Arc<AppState> {
    let feed = MessageFeed::new(config.feed_capacity);

    let cart = CartService::new(store.clone(), config.clone());
    let chat = NegotiationService::new(store.clone(), feed.clone(), config.clone());
    let engine = OrderEngine::new(store.clone(), feed.clone(), config);
    let payments = PaymentService::new(
        engine.clone(),
        Arc::new(MockGateway::new()),
        payment_secret,
    );

    Arc::new(AppState {
        cart,
        chat,
        engine,
        payments,
        feed,
        store,
    })
}
