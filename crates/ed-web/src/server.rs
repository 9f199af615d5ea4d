//! Web服务器

use axum::{
    body::Body,
    extract::{Request, State},
    http::Request as HttpRequest,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post, put},
    Router,
};
use ed_admin::EdMetrics;
use ed_core::ClinicalStore;
use ed_workflow::ClinicalEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::handlers::*;

/// 路由共享状态
pub struct AppState<S: ClinicalStore> {
    pub engine: Arc<ClinicalEngine<S>>,
    pub metrics: EdMetrics,
}

impl<S: ClinicalStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: ClinicalStore> AppState<S> {
    pub fn new(engine: ClinicalEngine<S>, metrics: EdMetrics) -> Self {
        Self {
            engine: Arc::new(engine),
            metrics,
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new<S: ClinicalStore>(addr: SocketAddr, state: AppState<S>) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_app<S: ClinicalStore>(state: AppState<S>) -> Router {
    Router::new()
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health::<S>))
        .route("/metrics", get(metrics::<S>))
        // API路由
        .nest("/api/v1", api_routes::<S>())
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                        let request_id = Uuid::new_v4();
                        tracing::info_span!(
                            "http_request",
                            %request_id,
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    }),
                )
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .layer(middleware::from_fn_with_state(state.clone(), count_requests::<S>))
        .with_state(state)
}

async fn count_requests<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.http_request();
    next.run(request).await
}

/// API v1 路由
fn api_routes<S: ClinicalStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(api_root))
        // 患者与档案
        .route("/patients", post(register_patient::<S>))
        .route("/patients/:patient_id", get(get_patient::<S>))
        .route("/patients/:patient_id/history", get(history::<S>))
        .route("/patients/:patient_id/folder", post(resolve_folder::<S>))
        .route("/patients/:patient_id/records/:kind", put(upsert_record::<S>))
        .route("/patients/:patient_id/diagnosis", post(record_diagnosis::<S>))
        .route(
            "/patients/:patient_id/triage",
            post(register_triage::<S>).get(latest_triage::<S>),
        )
        .route(
            "/patients/:patient_id/authorized-medication",
            get(authorized_medication::<S>),
        )
        .route("/folders/:folder_id/close", post(close_visit::<S>))
        // 医嘱
        .route("/orders/pending", get(pending_orders::<S>))
        .route("/orders/:order_id", patch(edit_order::<S>))
        .route("/orders/:order_id/outcome", post(record_order_outcome::<S>))
        // 发药
        .route("/dispense", post(request_dispense::<S>).get(open_dispenses::<S>))
        .route("/dispense/:request_id/status", post(advance_dispense::<S>))
        // 药品与库存
        .route(
            "/medications",
            get(search_medications::<S>).post(register_medication::<S>),
        )
        .route("/medications/low-stock", get(low_stock::<S>))
        .route("/medications/:medication_id/stock-in", post(stock_in::<S>))
        .route("/medications/:medication_id/stock-out", post(stock_out::<S>))
        .route("/medications/:medication_id/movements", get(movements::<S>))
        // 分诊
        .route("/triage/active", get(active_triages::<S>))
        .route("/triage/transferred", get(transferred_triages::<S>))
        .route("/triage/:triage_id/attend", post(attend_triage::<S>))
        .route("/triage/:triage_id/finalize", post(finalize_triage::<S>))
        .route("/triage/:triage_id/state", post(set_triage_state::<S>))
}
