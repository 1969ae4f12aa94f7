pub mod accounts;
pub mod home;
pub mod images;
pub mod profile;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(home::router())
        .merge(accounts::router())
        .merge(profile::router())
        .merge(images::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
