use std::collections::BTreeMap;

use async_trait::async_trait;
use entity::employees::{self, Draft, Model as Employee};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DbErr, EntityTrait, QueryOrder, Statement, TryIntoModel,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{DbPool, DbResult};

/// Persistence contract for employee rows.
///
/// `find_all` makes no ordering promise. `save` inserts when the draft has no
/// id and overwrites the row with that id otherwise; an id with no matching
/// row fails with `DbErr::RecordNotUpdated` and nothing is written.
/// `delete_by_id` reports whether a row was removed.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn find_all(&self) -> DbResult<Vec<Employee>>;

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Employee>>;

    async fn save(&self, draft: Draft) -> DbResult<Employee>;

    async fn delete_by_id(&self, id: i64) -> DbResult<bool>;

    /// Reachability check used by the health endpoint.
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Store backed by the `employees` table.
#[derive(Clone, Debug)]
pub struct SeaOrmEmployeeStore {
    pool: DbPool,
}

impl SeaOrmEmployeeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeStore for SeaOrmEmployeeStore {
    async fn find_all(&self) -> DbResult<Vec<Employee>> {
        let rows = employees::Entity::find()
            .order_by_asc(employees::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Employee>> {
        let row = employees::Entity::find_by_id(id).one(&self.pool).await?;
        Ok(row)
    }

    async fn save(&self, draft: Draft) -> DbResult<Employee> {
        let active: employees::ActiveModel = draft.into();
        let saved = active.save(&self.pool).await?.try_into_model()?;
        debug!(id = saved.id, "employee row saved");
        Ok(saved)
    }

    async fn delete_by_id(&self, id: i64) -> DbResult<bool> {
        let res = employees::Entity::delete_by_id(id).exec(&self.pool).await?;
        debug!(id, rows = res.rows_affected, "employee row deleted");
        Ok(res.rows_affected > 0)
    }

    async fn ping(&self) -> DbResult<()> {
        self.pool
            .execute(Statement::from_string(
                self.pool.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryRows {
    rows: BTreeMap<i64, Employee>,
    last_id: i64,
}

/// Process-local store. Ids come from a counter that only moves forward.
#[derive(Debug, Default)]
pub struct MemoryEmployeeStore {
    inner: Mutex<MemoryRows>,
}

impl MemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmployeeStore for MemoryEmployeeStore {
    async fn find_all(&self) -> DbResult<Vec<Employee>> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Employee>> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn save(&self, draft: Draft) -> DbResult<Employee> {
        let mut inner = self.inner.lock().await;
        let id = match draft.id {
            Some(id) if inner.rows.contains_key(&id) => id,
            Some(_) => return Err(DbErr::RecordNotUpdated.into()),
            None => {
                inner.last_id += 1;
                inner.last_id
            }
        };
        let row = Employee {
            id,
            name: draft.name,
            email: draft.email,
        };
        inner.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_by_id(&self, id: i64) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.rows.remove(&id).is_some())
    }
}
