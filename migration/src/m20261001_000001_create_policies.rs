use sea_orm_migration::prelude::*;

const SUBJECT_ACTION_INDEX: &str = "ux_policies_subject_system_action";

#[derive(DeriveIden)]
enum Policies {
    Table,
    Id,
    SubjectType,
    SubjectId,
    System,
    ActionId,
    Resources,
    ExpiredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Policies::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Policies::SubjectType).string_len(16).not_null())
                    .col(ColumnDef::new(Policies::SubjectId).string_len(255).not_null())
                    .col(ColumnDef::new(Policies::System).string_len(64).not_null())
                    .col(ColumnDef::new(Policies::ActionId).string_len(64).not_null())
                    .col(ColumnDef::new(Policies::Resources).text().not_null())
                    .col(ColumnDef::new(Policies::ExpiredAt).big_integer().not_null())
                    .col(
                        ColumnDef::new(Policies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Policies::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(SUBJECT_ACTION_INDEX)
                    .table(Policies::Table)
                    .col(Policies::SubjectType)
                    .col(Policies::SubjectId)
                    .col(Policies::System)
                    .col(Policies::ActionId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(SUBJECT_ACTION_INDEX)
                    .table(Policies::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Policies::Table).if_exists().to_owned())
            .await
    }
}
