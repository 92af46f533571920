pub mod bom_line;
pub mod item;
pub mod order;
pub mod order_channel;
pub mod order_line;
pub mod stock_deduction;
pub mod stock_ledger_entry;

pub use order_channel::FulfillmentStatus;
pub use stock_ledger_entry::{AdjustmentKind, Partition};
