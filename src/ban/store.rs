use super::BanRecord;
use crate::info;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Schema, Set,
};

pub(crate) mod entity {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "ban_records")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: i64,
        #[sea_orm(primary_key, auto_increment = false)]
        pub group_id: i64,
        pub lift_time: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use entity::{ActiveModel as BanActiveModel, Column, Entity as BanEntity};

/// 禁言记录的持久化存储，以 (user_id, group_id) 为键
#[async_trait]
pub trait BanStore: Send + Sync {
    /// 新增或覆盖一条记录
    async fn create_ban_record(&self, record: &BanRecord) -> Result<()>;

    async fn delete_ban_record(&self, record: &BanRecord) -> Result<()>;

    async fn list_ban_records(&self) -> Result<Vec<BanRecord>>;
}

pub struct SqliteBanStore {
    db: DatabaseConnection,
}

impl SqliteBanStore {
    /// 建表 (如不存在) 并返回存储
    pub async fn init(db: DatabaseConnection) -> Result<Self> {
        let builder = db.get_database_backend();
        let schema = Schema::new(builder);

        let mut create_table_stmt = schema.create_table_from_entity(BanEntity);
        create_table_stmt.if_not_exists();

        db.execute(builder.build(&create_table_stmt))
            .await
            .context("创建 ban_records 表失败")?;

        info!(target: "Database", "ban_records 表就绪");
        Ok(Self { db })
    }
}

#[async_trait]
impl BanStore for SqliteBanStore {
    async fn create_ban_record(&self, record: &BanRecord) -> Result<()> {
        let model = BanActiveModel {
            user_id: Set(record.user_id),
            group_id: Set(record.group_id),
            lift_time: Set(record.lift_time),
        };

        BanEntity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::GroupId])
                    .update_column(Column::LiftTime)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_ban_record(&self, record: &BanRecord) -> Result<()> {
        BanEntity::delete_many()
            .filter(Column::UserId.eq(record.user_id))
            .filter(Column::GroupId.eq(record.group_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_ban_records(&self) -> Result<Vec<BanRecord>> {
        let rows = BanEntity::find().all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|m| BanRecord {
                user_id: m.user_id,
                group_id: m.group_id,
                lift_time: m.lift_time,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    async fn store() -> SqliteBanStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        SqliteBanStore::init(db).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_by_identity() {
        let s = store().await;
        s.create_ban_record(&BanRecord::new(999, 12345, 100)).await.unwrap();
        s.create_ban_record(&BanRecord::new(999, 12345, 700)).await.unwrap();
        s.create_ban_record(&BanRecord::whole_group(999)).await.unwrap();

        let mut rows = s.list_ban_records().await.unwrap();
        rows.sort_by_key(|r| r.user_id);
        assert_eq!(
            rows,
            vec![BanRecord::whole_group(999), BanRecord::new(999, 12345, 700)]
        );
    }

    #[tokio::test]
    async fn delete_ignores_lift_time() {
        let s = store().await;
        s.create_ban_record(&BanRecord::new(1, 2, 100)).await.unwrap();
        s.delete_ban_record(&BanRecord::new(1, 2, -1)).await.unwrap();
        assert!(s.list_ban_records().await.unwrap().is_empty());

        // 删除不存在的记录不是错误
        s.delete_ban_record(&BanRecord::new(1, 2, -1)).await.unwrap();
    }
}
