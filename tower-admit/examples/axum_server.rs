use std::net::SocketAddr;
use std::sync::Arc;

use admit_limit::BucketConfig;
use admit_limit::LimiterRegistry;
use axum::{
    Router, error_handling::HandleErrorLayer, extract::ConnectInfo, extract::Request,
    http::StatusCode, response::IntoResponse, routing::get,
};
use tower::BoxError;
use tower::ServiceBuilder;
use tower_admit::{AdmissionLayer, AdmitError};

/// Key each client by the IP of its peer address.
fn peer_ip(req: &Request) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    // 1. Setup Registry: bursts of 3, one request per second sustained
    let config = BucketConfig::per_second(3.try_into().unwrap(), 1.try_into().unwrap());
    let registry = Arc::new(LimiterRegistry::new(config));

    // 2. Setup Admission Layer
    let admission = AdmissionLayer::new(registry, peer_ip).with_observer(|ip, allowed| {
        let verdict = if allowed { "allowed" } else { "denied" };
        tracing::info!("Request from IP {ip} was {verdict}");
    });

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_admit_error))
                // 2. The middle layer: rejects clients whose bucket is empty
                .layer(admission)
                // 3. Converts the Route's Infallible to BoxError for the admission layer
                .map_err(BoxError::from),
        );

    // 4. Serve, recording each connection's peer address
    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:8080");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// The signature must match BoxError -> IntoResponse
async fn handle_admit_error(err: BoxError) -> impl IntoResponse {
    if let Some(admit_err) = err.downcast_ref::<AdmitError>() {
        admit_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
