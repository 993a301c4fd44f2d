use std::net::SocketAddr;

use axum::{routing, Router};
use kaamkarwalo::app::AppState;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "kaamkarwalo=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();
    app_state.run_migration().await.unwrap();

    let api = Router::new()
        .route("/register", routing::post(kaamkarwalo::api::auth::register))
        .route("/login", routing::post(kaamkarwalo::api::auth::login))
        .route(
            "/bookings",
            routing::post(kaamkarwalo::api::booking::create)
                .get(kaamkarwalo::api::booking::index),
        )
        .route("/users", routing::get(kaamkarwalo::api::user::index))
        .route("/users/:id", routing::get(kaamkarwalo::api::user::show));

    let app = Router::new()
        .nest("/api", api)
        .route(
            "/debug-all-users",
            routing::get(kaamkarwalo::api::user::debug_all),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(5000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
