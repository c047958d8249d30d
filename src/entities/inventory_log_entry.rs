use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Legal ledger transitions.
///
/// `Purchase`/`Return`/`AdjustmentIn` add stock, `Damage`/`TransferOut`
/// remove it, `Sale` converts a reservation into a permanent deduction, and
/// `Reserve`/`Release` move units between the available and reserved pools
/// without touching stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryAction {
    Purchase,
    Return,
    AdjustmentIn,
    Damage,
    TransferOut,
    Sale,
    Reserve,
    Release,
}

impl InventoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryAction::Purchase => "purchase",
            InventoryAction::Return => "return",
            InventoryAction::AdjustmentIn => "adjustment_in",
            InventoryAction::Damage => "damage",
            InventoryAction::TransferOut => "transfer_out",
            InventoryAction::Sale => "sale",
            InventoryAction::Reserve => "reserve",
            InventoryAction::Release => "release",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(InventoryAction::Purchase),
            "return" => Some(InventoryAction::Return),
            "adjustment_in" => Some(InventoryAction::AdjustmentIn),
            "damage" => Some(InventoryAction::Damage),
            "transfer_out" => Some(InventoryAction::TransferOut),
            "sale" => Some(InventoryAction::Sale),
            "reserve" => Some(InventoryAction::Reserve),
            "release" => Some(InventoryAction::Release),
            _ => None,
        }
    }

    /// Actions that may lazily create a record (and therefore require a sku
    /// on first use).
    pub fn is_stock_increasing(&self) -> bool {
        matches!(
            self,
            InventoryAction::Purchase | InventoryAction::Return | InventoryAction::AdjustmentIn
        )
    }
}

/// One row per ledger mutation, immutable once written.
///
/// `quantity_before`/`quantity_after` snapshot `quantity_in_stock`;
/// `reserved_before`/`reserved_after` snapshot `reserved_quantity`, so
/// reservation moves (which leave stock untouched) are auditable too.
/// No update or delete path exists for this table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_log_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub item_id: Uuid,
    pub action: String,
    pub quantity_change: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub reserved_before: i32,
    pub reserved_after: i32,
    pub reason: Option<String>,
    pub performed_by: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_record::Entity",
        from = "Column::InventoryId",
        to = "super::inventory_record::Column::Id"
    )]
    InventoryRecord,
}

impl Related<super::inventory_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryRecord.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
