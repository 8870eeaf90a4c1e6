use axum::Router;
use llmgate_core::GatewayContext;
use tower_http::cors::{Any, CorsLayer};

use crate::api;
use crate::state::ApiState;

pub fn build_router(context: &GatewayContext) -> Router {
    let api_routes = Router::new()
        .nest("/api", api::router())
        .with_state(ApiState::from_context(context));

    // /api shares the gateway's auth gate; CORS sits outside it so preflights never need the secret.
    llmgate_core::build_router_with(context.state.clone(), api_routes).layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}
