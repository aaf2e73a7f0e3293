use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    routing::get,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use kopikuy_pos::{
    config::AppConfig,
    db,
    entities::{customer, product_variant},
    events::{self, EventSender},
    handlers::AppServices,
    services::{SaleService, VoucherService},
    AppState,
};

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    db_file: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = std::env::temp_dir().join(format!("kopikuy_test_{}.db", Uuid::new_v4()));

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let voucher_service = Arc::new(VoucherService::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
        ));
        let sale_service = Arc::new(SaleService::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            voucher_service.clone(),
            "KOPI KUY POS".to_string(),
        ));
        let services = AppServices {
            sales: sale_service,
            vouchers: voucher_service,
        };

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .route("/health", get(kopikuy_pos::health_check))
            .nest("/api/v1", kopikuy_pos::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            db_file,
            _event_task: event_task,
        }
    }

    /// Send a request against the router, scoped to a branch.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        branch_id: Option<i64>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(branch) = branch_id {
            builder = builder.header("x-branch-id", branch.to_string());
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request carrying both branch and cashier headers.
    pub async fn request_as_cashier(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        branch_id: i64,
        cashier_id: i64,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-branch-id", branch_id.to_string())
            .header("x-cashier-id", cashier_id.to_string());

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper defaulting to branch 1.
    pub async fn request_branch1(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(1)).await
    }

    /// Inserts a sellable variant and returns it.
    pub async fn seed_variant(
        &self,
        branch_id: i64,
        sku: &str,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product_variant::Model {
        let model = product_variant::ActiveModel {
            branch_id: Set(branch_id),
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            selling_price: Set(price),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed product variant")
    }

    /// Inserts a loyalty customer and returns it.
    pub async fn seed_customer(
        &self,
        branch_id: i64,
        name: &str,
        total_spent: Decimal,
        total_points: i64,
    ) -> customer::Model {
        let model = customer::ActiveModel {
            branch_id: Set(branch_id),
            name: Set(name.to_string()),
            phone: Set(None),
            total_spent: Set(total_spent),
            total_points: Set(total_points),
            visit_count: Set(0),
            last_visit_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed customer")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Reads a response body as JSON, asserting the expected status first.
pub async fn json_body(response: axum::response::Response, expected: StatusCode) -> Value {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    assert_eq!(
        status,
        expected,
        "unexpected status, body: {}",
        String::from_utf8_lossy(&bytes)
    );
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}
