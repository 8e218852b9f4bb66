use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryBackends};
use crate::routes::with_lateness_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lateness::config::AppConfig;
use lateness::error::AppError;
use lateness::telemetry;
use lateness::workflows::lateness::LatenessService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backends = InMemoryBackends::default();
    let lateness_service = Arc::new(LatenessService::new(
        backends.collaborators(&config.integrations),
    ));

    let app = with_lateness_routes(lateness_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        attendance_sync = config.integrations.attendance_sync,
        export_feed = config.integrations.export_feed,
        "lateness service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
