#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sitestock_api::{
    config::AppConfig,
    db,
    entities::{
        item::{self, ItemKind, SupplyChannel},
        AdjustmentKind,
    },
    events::{self, process_events},
    handlers::AppServices,
    services::{
        items::{BomComponent, NewItem},
        stock::AdjustStock,
    },
    AppState,
};
use tower::ServiceExt;

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection: every in-memory connection is its own database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_idle_timeout_secs = 3_600;
        cfg.db_acquire_timeout_secs = 30;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(1024);
        let event_task = tokio::spawn(process_events(event_rx, None));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = sitestock_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Sends a request through the router and decodes the JSON body (`Null` when empty).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    pub async fn item(
        &self,
        sku: &str,
        kind: ItemKind,
        channel: SupplyChannel,
        opening_balance: i64,
    ) -> item::Model {
        self.services()
            .items
            .create_item(NewItem {
                sku: sku.to_string(),
                name: format!("{} test item", sku),
                kind,
                channel,
                opening_balance,
                low_stock_threshold: None,
            })
            .await
            .expect("create item")
    }

    pub async fn material(&self, sku: &str, opening_balance: i64) -> item::Model {
        self.item(sku, ItemKind::Material, SupplyChannel::Hardware, opening_balance)
            .await
    }

    pub async fn product(&self, sku: &str, channel: SupplyChannel, opening_balance: i64) -> item::Model {
        self.item(sku, ItemKind::Product, channel, opening_balance)
            .await
    }

    pub async fn set_bom(&self, product_id: i64, components: &[(i64, Decimal)]) {
        self.services()
            .items
            .set_bom(
                product_id,
                components
                    .iter()
                    .map(|(material_item_id, quantity_per_unit)| BomComponent {
                        material_item_id: *material_item_id,
                        quantity_per_unit: *quantity_per_unit,
                    })
                    .collect(),
            )
            .await
            .expect("set bom");
    }

    /// Receives stock into a pool.
    pub async fn stock_in(&self, item_id: i64, quantity: i64, site_id: Option<i64>) {
        self.services()
            .stock
            .adjust(AdjustStock::new(item_id, quantity, AdjustmentKind::In).at_site(site_id))
            .await
            .expect("stock in");
    }

    pub async fn balance(&self, item_id: i64, site_id: Option<i64>) -> i64 {
        self.services()
            .stock
            .current_balance(item_id, site_id, None)
            .await
            .expect("balance")
    }

    pub async fn cached_balance(&self, item_id: i64) -> i64 {
        self.services()
            .items
            .get_item(item_id)
            .await
            .expect("item")
            .general_balance
    }
}
