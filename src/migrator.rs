use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_items_table::Migration),
            Box::new(m20240601_000002_create_bom_lines_table::Migration),
            Box::new(m20240601_000003_create_stock_ledger_entries_table::Migration),
            Box::new(m20240601_000004_create_orders_tables::Migration),
            Box::new(m20240601_000005_create_stock_deductions_table::Migration),
        ]
    }
}

mod m20240601_000001_create_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Items::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Items::Sku).string().not_null().unique_key())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(Items::Channel).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Items::OpeningBalance)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::GeneralBalance)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Items::LowStockThreshold).big_integer().null())
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
        Sku,
        Name,
        Kind,
        Channel,
        OpeningBalance,
        GeneralBalance,
        LowStockThreshold,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_bom_lines_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_bom_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomLines::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomLines::ProductItemId).big_integer().not_null())
                        .col(ColumnDef::new(BomLines::MaterialItemId).big_integer().not_null())
                        .col(
                            ColumnDef::new(BomLines::QuantityPerUnit)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_lines_product_material")
                        .table(BomLines::Table)
                        .col(BomLines::ProductItemId)
                        .col(BomLines::MaterialItemId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BomLines {
        Table,
        Id,
        ProductItemId,
        MaterialItemId,
        QuantityPerUnit,
        CreatedAt,
    }
}

mod m20240601_000003_create_stock_ledger_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_stock_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLedgerEntries::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::SiteId).big_integer().null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::Partition)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::Kind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ResultingBalance)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::ReferenceType).string().null())
                        .col(ColumnDef::new(StockLedgerEntries::ReferenceId).string().null())
                        .col(ColumnDef::new(StockLedgerEntries::Note).text().null())
                        .col(ColumnDef::new(StockLedgerEntries::Label).string().null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Latest-row lookups walk this index backwards
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_item_site_created")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::ItemId)
                        .col(StockLedgerEntries::SiteId)
                        .col(StockLedgerEntries::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_reference")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::ReferenceType)
                        .col(StockLedgerEntries::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLedgerEntries {
        Table,
        Id,
        ItemId,
        SiteId,
        Partition,
        Kind,
        Quantity,
        ResultingBalance,
        ReferenceType,
        ReferenceId,
        Note,
        Label,
        Active,
        CreatedAt,
    }
}

mod m20240601_000004_create_orders_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::SiteId).big_integer().null())
                        .col(ColumnDef::new(Orders::OverallStatus).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::IsLpo)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::HasCustomItems)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(OrderLines::ItemId).big_integer().null())
                        .col(ColumnDef::new(OrderLines::Quantity).big_integer().not_null())
                        .col(ColumnDef::new(OrderLines::SupplierId).big_integer().null())
                        .col(ColumnDef::new(OrderLines::ChannelKey).string().not_null())
                        .col(ColumnDef::new(OrderLines::Definition).json().null())
                        .col(ColumnDef::new(OrderLines::ConnectedItems).json().null())
                        .col(
                            ColumnDef::new(OrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderChannels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderChannels::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderChannels::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderChannels::ChannelKey).string().not_null())
                        .col(ColumnDef::new(OrderChannels::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(OrderChannels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_channels_order_id")
                                .from(OrderChannels::Table, OrderChannels::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_channels_order_channel")
                        .table(OrderChannels::Table)
                        .col(OrderChannels::OrderId)
                        .col(OrderChannels::ChannelKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderChannels::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        SiteId,
        OverallStatus,
        IsLpo,
        HasCustomItems,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        Kind,
        ItemId,
        Quantity,
        SupplierId,
        ChannelKey,
        Definition,
        ConnectedItems,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderChannels {
        Table,
        Id,
        OrderId,
        ChannelKey,
        Status,
        UpdatedAt,
    }
}

mod m20240601_000005_create_stock_deductions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_stock_deductions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockDeductions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockDeductions::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockDeductions::OrderId).uuid().not_null())
                        .col(ColumnDef::new(StockDeductions::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(StockDeductions::ChannelKey).string().not_null())
                        .col(
                            ColumnDef::new(StockDeductions::Direction)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockDeductions::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockDeductions::SiteId).big_integer().null())
                        .col(ColumnDef::new(StockDeductions::Allocations).json().not_null())
                        .col(
                            ColumnDef::new(StockDeductions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One deduct and one restore per item per channel per order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_deductions_marker")
                        .table(StockDeductions::Table)
                        .col(StockDeductions::OrderId)
                        .col(StockDeductions::ItemId)
                        .col(StockDeductions::ChannelKey)
                        .col(StockDeductions::Direction)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockDeductions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockDeductions {
        Table,
        Id,
        OrderId,
        ItemId,
        ChannelKey,
        Direction,
        Quantity,
        SiteId,
        Allocations,
        CreatedAt,
    }
}
