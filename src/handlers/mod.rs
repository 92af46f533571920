pub mod common;
pub mod items;
pub mod orders;
pub mod stock;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    deduction::DeductionEngine,
    fulfillment::{FulfillmentService, TransitionPolicy},
    items::ItemService,
    orders::OrderService,
    stock::StockService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub stock: Arc<StockService>,
    pub items: Arc<ItemService>,
    pub orders: Arc<OrderService>,
    pub fulfillment: Arc<FulfillmentService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let stock = Arc::new(
            StockService::new(db_pool.clone(), event_sender.clone())
                .with_partition_enforcement(config.stock.enforce_partition),
        );
        let engine = Arc::new(DeductionEngine::new(stock.clone()));
        let fulfillment = Arc::new(FulfillmentService::new(
            db_pool.clone(),
            event_sender.clone(),
            engine,
            TransitionPolicy::from(&config.fulfillment),
        ));

        Self {
            stock,
            items: Arc::new(ItemService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool, event_sender)),
            fulfillment,
        }
    }
}
