// Ledger and order-driven stock movement
pub mod deduction;
pub mod stock;

// Order lifecycle
pub mod fulfillment;
pub mod orders;

// Catalog
pub mod items;
