use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_orders_table::Migration),
            Box::new(m20240601_000002_create_carts_table::Migration),
            Box::new(m20240601_000003_create_reviews_table::Migration),
        ]
    }
}

mod m20240601_000001_create_orders_table {
    use super::*;
    use crate::entities::order;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());
            manager
                .create_table(
                    schema
                        .create_table_from_entity(order::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_user_id")
                        .table(order::Entity)
                        .col(order::Column::UserId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(order::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000002_create_carts_table {
    use super::*;
    use crate::entities::cart;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_carts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());
            manager
                .create_table(
                    schema
                        .create_table_from_entity(cart::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(cart::Entity).to_owned())
                .await
        }
    }
}

mod m20240601_000003_create_reviews_table {
    use super::*;
    use crate::entities::review;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_reviews_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let schema = Schema::new(manager.get_database_backend());
            manager
                .create_table(
                    schema
                        .create_table_from_entity(review::Entity)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            // One review per (product, user)
            manager
                .create_index(
                    Index::create()
                        .name("idx_reviews_product_user")
                        .table(review::Entity)
                        .col(review::Column::ProductId)
                        .col(review::Column::UserId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(review::Entity).to_owned())
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order;
    use sea_orm::{ConnectOptions, Database, DatabaseBackend};

    #[tokio::test]
    async fn applies_every_migration_on_sqlite() {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();

        Migrator::up(&db, None).await.unwrap();

        let applied = Migrator::get_applied_migrations(&db).await.unwrap();
        assert_eq!(applied.len(), Migrator::migrations().len());
        let manager = SchemaManager::new(&db);
        for table in ["orders", "carts", "reviews"] {
            assert!(manager.has_table(table).await.unwrap(), "{table} missing");
        }
    }

    #[test]
    fn orders_table_builds_for_each_backend() {
        for backend in [DatabaseBackend::Sqlite, DatabaseBackend::Postgres] {
            let create = Schema::new(backend).create_table_from_entity(order::Entity);
            let sql = backend.build(&create).to_string();
            assert!(sql.contains("total_price"), "{sql}");
        }
    }
}
