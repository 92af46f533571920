use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        bom_line::{self, Entity as BomLine},
        item::{self, Entity as Item, ItemKind, SupplyChannel},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewItem {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub kind: ItemKind,
    pub channel: SupplyChannel,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub opening_balance: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i64>,
}

/// One material consumed per unit of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomComponent {
    pub material_item_id: i64,
    pub quantity_per_unit: Decimal,
}

#[derive(Clone)]
pub struct ItemService {
    db_pool: Arc<DbPool>,
}

impl ItemService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, new_item), fields(sku = %new_item.sku))]
    pub async fn create_item(&self, new_item: NewItem) -> Result<item::Model, ServiceError> {
        new_item.validate()?;

        let now = Utc::now();
        let created = item::ActiveModel {
            sku: Set(new_item.sku),
            name: Set(new_item.name),
            kind: Set(new_item.kind),
            channel: Set(new_item.channel),
            opening_balance: Set(new_item.opening_balance),
            general_balance: Set(new_item.opening_balance),
            low_stock_threshold: Set(new_item.low_stock_threshold),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db_pool.as_ref())
        .await
        .map_err(|e| {
            error!("Failed to create item: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(item_id = created.id, "Item created");
        Ok(created)
    }

    pub async fn get_item(&self, item_id: i64) -> Result<item::Model, ServiceError> {
        Item::find_by_id(item_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::ItemNotFound(item_id))
    }

    pub async fn get_bom(&self, product_item_id: i64) -> Result<Vec<bom_line::Model>, ServiceError> {
        BomLine::find()
            .filter(bom_line::Column::ProductItemId.eq(product_item_id))
            .order_by_asc(bom_line::Column::Id)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Replaces the bill of materials of a product.
    #[instrument(skip(self, components), fields(components = components.len()))]
    pub async fn set_bom(
        &self,
        product_item_id: i64,
        components: Vec<BomComponent>,
    ) -> Result<Vec<bom_line::Model>, ServiceError> {
        let product = self.get_item(product_item_id).await?;
        if !product.kind.can_carry_bom() {
            return Err(ServiceError::ValidationError(format!(
                "item {} is a material and cannot carry a bill of materials",
                product_item_id
            )));
        }

        let mut seen = HashSet::new();
        for component in &components {
            if component.material_item_id == product_item_id {
                return Err(ServiceError::ValidationError(format!(
                    "item {} cannot consume itself",
                    product_item_id
                )));
            }
            if !seen.insert(component.material_item_id) {
                return Err(ServiceError::ValidationError(format!(
                    "material {} is listed twice",
                    component.material_item_id
                )));
            }
            if component.quantity_per_unit <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "quantity per unit for material {} must be positive",
                    component.material_item_id
                )));
            }
            let material = self.get_item(component.material_item_id).await?;
            if !material.kind.can_be_bom_material() {
                return Err(ServiceError::ValidationError(format!(
                    "item {} is not a material",
                    material.id
                )));
            }
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        BomLine::delete_many()
            .filter(bom_line::Column::ProductItemId.eq(product_item_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let mut lines = Vec::with_capacity(components.len());
        for component in components {
            let line = bom_line::ActiveModel {
                product_item_id: Set(product_item_id),
                material_item_id: Set(component.material_item_id),
                quantity_per_unit: Set(component.quantity_per_unit),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            lines.push(line);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(product_item_id, materials = lines.len(), "Bill of materials replaced");
        Ok(lines)
    }
}
