//! Request logging middleware

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Log every request and its response status at `level`.
///
/// The control center logs at INFO; workers use DEBUG because the
/// dispatcher and dashboards poll `/status` and `/health` constantly.
pub fn logging_layer(level: Level) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(level))
        .on_response(DefaultOnResponse::new().level(level).include_headers(false))
}
