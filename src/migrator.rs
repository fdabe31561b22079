use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_id_sequences_table::Migration),
            Box::new(m20240101_000003_create_request_tables::Migration),
            Box::new(m20240101_000004_create_stock_tables::Migration),
            Box::new(m20240101_000005_create_blockchain_logs_table::Migration),
            Box::new(m20240101_000006_create_notifications_table::Migration),
        ]
    }
}

mod m20240101_000001_create_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Username).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::FullName).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::Department).string().null())
                        .col(ColumnDef::new(Users::BlockchainAddress).string_len(42).null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
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
                        .name("idx_users_role")
                        .table(Users::Table)
                        .col(Users::Role)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Users {
        Table,
        Id,
        Username,
        Email,
        FullName,
        Role,
        Department,
        BlockchainAddress,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000002_create_id_sequences_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_id_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IdSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IdSequences::Name)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdSequences::Value)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IdSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum IdSequences {
        Table,
        Name,
        Value,
    }
}

mod m20240101_000003_create_request_tables {

    use super::m20240101_000001_create_users_table::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_request_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DepartmentRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DepartmentRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DepartmentRequests::RequestNo)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(DepartmentRequests::RequesterId).uuid().not_null())
                        .col(ColumnDef::new(DepartmentRequests::ItemName).string().not_null())
                        .col(ColumnDef::new(DepartmentRequests::Quantity).integer().not_null())
                        .col(ColumnDef::new(DepartmentRequests::Priority).string().not_null())
                        .col(ColumnDef::new(DepartmentRequests::Reason).text().not_null())
                        .col(ColumnDef::new(DepartmentRequests::Status).string().not_null())
                        .col(ColumnDef::new(DepartmentRequests::Department).string().not_null())
                        .col(
                            ColumnDef::new(DepartmentRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DepartmentRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_department_requests_requester")
                                .from(DepartmentRequests::Table, DepartmentRequests::RequesterId)
                                .to(Users::Table, Users::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_department_requests_status")
                        .table(DepartmentRequests::Table)
                        .col(DepartmentRequests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ApprovalStages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ApprovalStages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ApprovalStages::RequestId).uuid().not_null())
                        .col(ColumnDef::new(ApprovalStages::Ordinal).integer().not_null())
                        .col(ColumnDef::new(ApprovalStages::Stage).string().not_null())
                        .col(
                            ColumnDef::new(ApprovalStages::Required)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ApprovalStages::Completed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ApprovalStages::Approved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ApprovalStages::ApproverId).uuid().null())
                        .col(ColumnDef::new(ApprovalStages::Comments).text().null())
                        .col(
                            ColumnDef::new(ApprovalStages::DueDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ApprovalStages::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ApprovalStages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_approval_stages_request")
                                .from(ApprovalStages::Table, ApprovalStages::RequestId)
                                .to(DepartmentRequests::Table, DepartmentRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One stage per position in a request's pipeline
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_approval_stages_request_ordinal")
                        .table(ApprovalStages::Table)
                        .col(ApprovalStages::RequestId)
                        .col(ApprovalStages::Ordinal)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ApprovalHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ApprovalHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ApprovalHistory::RequestId).uuid().not_null())
                        .col(ColumnDef::new(ApprovalHistory::StageId).uuid().not_null())
                        .col(ColumnDef::new(ApprovalHistory::ApproverId).uuid().not_null())
                        .col(ColumnDef::new(ApprovalHistory::Approved).boolean().not_null())
                        .col(ColumnDef::new(ApprovalHistory::Reason).text().not_null())
                        .col(
                            ColumnDef::new(ApprovalHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_approval_history_request")
                                .from(ApprovalHistory::Table, ApprovalHistory::RequestId)
                                .to(DepartmentRequests::Table, DepartmentRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_approval_history_request")
                        .table(ApprovalHistory::Table)
                        .col(ApprovalHistory::RequestId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ApprovalHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ApprovalStages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DepartmentRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DepartmentRequests {
        Table,
        Id,
        RequestNo,
        RequesterId,
        ItemName,
        Quantity,
        Priority,
        Reason,
        Status,
        Department,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ApprovalStages {
        Table,
        Id,
        RequestId,
        Ordinal,
        Stage,
        Required,
        Completed,
        Approved,
        ApproverId,
        Comments,
        DueDate,
        CompletedAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ApprovalHistory {
        Table,
        Id,
        RequestId,
        StageId,
        ApproverId,
        Approved,
        Reason,
        CreatedAt,
    }
}

mod m20240101_000004_create_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Categories::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Categories::Name).string().not_null().unique_key())
                        .col(ColumnDef::new(Categories::Description).text().null())
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Stocks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Stocks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Stocks::ItemName).string().not_null())
                        .col(ColumnDef::new(Stocks::CategoryId).uuid().null())
                        .col(ColumnDef::new(Stocks::OriginalQuantity).integer().not_null())
                        .col(ColumnDef::new(Stocks::CurrentQuantity).integer().not_null())
                        .col(
                            ColumnDef::new(Stocks::UnitCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Stocks::Location).string().not_null())
                        .col(
                            ColumnDef::new(Stocks::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(10),
                        )
                        .col(ColumnDef::new(Stocks::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Stocks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Stocks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stocks_category")
                                .from(Stocks::Table, Stocks::CategoryId)
                                .to(Categories::Table, Categories::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stocks_item_name")
                        .table(Stocks::Table)
                        .col(Stocks::ItemName)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::StockId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::MovementType).string().not_null())
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(StockMovements::PreviousQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::NewQuantity).integer().not_null())
                        .col(ColumnDef::new(StockMovements::Reason).text().not_null())
                        .col(ColumnDef::new(StockMovements::Reference).string().null())
                        .col(ColumnDef::new(StockMovements::PerformedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_stock")
                                .from(StockMovements::Table, StockMovements::StockId)
                                .to(Stocks::Table, Stocks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_stock")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Deliveries::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Deliveries::DeliveryNo)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Deliveries::StockId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::Supplier).string().not_null())
                        .col(ColumnDef::new(Deliveries::Quantity).integer().not_null())
                        .col(ColumnDef::new(Deliveries::Status).string().not_null())
                        .col(ColumnDef::new(Deliveries::Notes).text().null())
                        .col(ColumnDef::new(Deliveries::LoggedBy).uuid().null())
                        .col(ColumnDef::new(Deliveries::ReceivedBy).uuid().null())
                        .col(
                            ColumnDef::new(Deliveries::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_stock")
                                .from(Deliveries::Table, Deliveries::StockId)
                                .to(Stocks::Table, Stocks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DamageReports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DamageReports::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DamageReports::ReportNo)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(DamageReports::StockId).uuid().not_null())
                        .col(ColumnDef::new(DamageReports::Quantity).integer().not_null())
                        .col(ColumnDef::new(DamageReports::Description).text().not_null())
                        .col(ColumnDef::new(DamageReports::ReportedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(DamageReports::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_damage_reports_stock")
                                .from(DamageReports::Table, DamageReports::StockId)
                                .to(Stocks::Table, Stocks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Relocations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Relocations::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Relocations::RelocationNo)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Relocations::StockId).uuid().not_null())
                        .col(ColumnDef::new(Relocations::FromLocation).string().not_null())
                        .col(ColumnDef::new(Relocations::ToLocation).string().not_null())
                        .col(ColumnDef::new(Relocations::Quantity).integer().not_null())
                        .col(ColumnDef::new(Relocations::Reason).text().not_null())
                        .col(ColumnDef::new(Relocations::RelocatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Relocations::Completed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Relocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_relocations_stock")
                                .from(Relocations::Table, Relocations::StockId)
                                .to(Stocks::Table, Stocks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Relocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DamageReports::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Stocks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Categories {
        Table,
        Id,
        Name,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Stocks {
        Table,
        Id,
        ItemName,
        CategoryId,
        OriginalQuantity,
        CurrentQuantity,
        UnitCost,
        Location,
        LowStockThreshold,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        StockId,
        MovementType,
        Quantity,
        PreviousQuantity,
        NewQuantity,
        Reason,
        Reference,
        PerformedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Deliveries {
        Table,
        Id,
        DeliveryNo,
        StockId,
        Supplier,
        Quantity,
        Status,
        Notes,
        LoggedBy,
        ReceivedBy,
        ReceivedAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum DamageReports {
        Table,
        Id,
        ReportNo,
        StockId,
        Quantity,
        Description,
        ReportedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Relocations {
        Table,
        Id,
        RelocationNo,
        StockId,
        FromLocation,
        ToLocation,
        Quantity,
        Reason,
        RelocatedBy,
        Completed,
        CreatedAt,
    }
}

mod m20240101_000005_create_blockchain_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_blockchain_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BlockchainLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BlockchainLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BlockchainLogs::EventType).string_len(50).not_null())
                        .col(
                            ColumnDef::new(BlockchainLogs::TransactionHash)
                                .string_len(66)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BlockchainLogs::BlockNumber)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BlockchainLogs::LogIndex).integer().not_null())
                        .col(ColumnDef::new(BlockchainLogs::EventData).json().not_null())
                        .col(
                            ColumnDef::new(BlockchainLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Deduplication key for re-polled block ranges
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_blockchain_logs_tx_log_index")
                        .table(BlockchainLogs::Table)
                        .col(BlockchainLogs::TransactionHash)
                        .col(BlockchainLogs::LogIndex)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_blockchain_logs_event_type")
                        .table(BlockchainLogs::Table)
                        .col(BlockchainLogs::EventType)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_blockchain_logs_block_number")
                        .table(BlockchainLogs::Table)
                        .col(BlockchainLogs::BlockNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_blockchain_logs_created_at")
                        .table(BlockchainLogs::Table)
                        .col(BlockchainLogs::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BlockchainLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BlockchainLogs {
        Table,
        Id,
        EventType,
        TransactionHash,
        BlockNumber,
        LogIndex,
        EventData,
        CreatedAt,
    }
}

mod m20240101_000006_create_notifications_table {

    use super::m20240101_000001_create_users_table::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::Kind).string().not_null())
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(ColumnDef::new(Notifications::Priority).string().not_null())
                        .col(ColumnDef::new(Notifications::RelatedObjectType).string().null())
                        .col(ColumnDef::new(Notifications::RelatedObjectId).string().null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_notifications_user")
                                .from(Notifications::Table, Notifications::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_user")
                        .table(Notifications::Table)
                        .col(Notifications::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        Kind,
        Title,
        Message,
        Priority,
        RelatedObjectType,
        RelatedObjectId,
        IsRead,
        CreatedAt,
    }
}
