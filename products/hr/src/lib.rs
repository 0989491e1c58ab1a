//! HR module: employee directory operations.
//!
//! [`EmployeeService`] is the only entry point the HTTP and GraphQL layers use.
//! It owns no state of its own; everything lives behind the [`EmployeeStore`]
//! it was built with. Concurrent calls for the same id are not coordinated, so
//! an update racing a delete may observe either order.

use std::sync::Arc;

use platform_db::{DbError, EmployeeStore};
use thiserror::Error;
use tracing::{info, instrument};

pub use entity::employees::{Draft, Model as Employee};

#[derive(Debug, Error)]
pub enum HrError {
    #[error("storage unavailable")]
    StorageUnavailable(#[from] DbError),
}

pub type HrResult<T> = Result<T, HrError>;

/// Result of an operation addressed by employee id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

#[derive(Clone)]
pub struct EmployeeService {
    store: Arc<dyn EmployeeStore>,
}

impl EmployeeService {
    pub fn new(store: Arc<dyn EmployeeStore>) -> Self {
        Self { store }
    }

    /// Persist a new employee. Any id carried by `draft` is discarded so a
    /// create can never overwrite an existing row.
    #[instrument(name = "hr.employee.create", skip_all)]
    pub async fn create(&self, draft: Draft) -> HrResult<Employee> {
        let draft = Draft { id: None, ..draft };
        let employee = self.store.save(draft).await?;
        info!(id = employee.id, "employee created");
        Ok(employee)
    }

    #[instrument(name = "hr.employee.get_all", skip_all)]
    pub async fn get_all(&self) -> HrResult<Vec<Employee>> {
        Ok(self.store.find_all().await?)
    }

    #[instrument(name = "hr.employee.get", skip(self))]
    pub async fn get_by_id(&self, id: i64) -> HrResult<Lookup<Employee>> {
        Ok(self.store.find_by_id(id).await?.into())
    }

    /// Overwrite `name` and `email` of an existing employee. The id in
    /// `draft` is ignored.
    #[instrument(name = "hr.employee.update", skip(self, draft))]
    pub async fn update(&self, id: i64, draft: Draft) -> HrResult<Lookup<Employee>> {
        let Some(existing) = self.store.find_by_id(id).await? else {
            return Ok(Lookup::NotFound);
        };
        let changes = Draft {
            id: Some(existing.id),
            name: draft.name,
            email: draft.email,
        };
        let employee = self.store.save(changes).await?;
        info!(id = employee.id, "employee updated");
        Ok(Lookup::Found(employee))
    }

    /// Remove an employee, returning the removed row. Missing ids report
    /// `NotFound` and leave the store untouched.
    #[instrument(name = "hr.employee.delete", skip(self))]
    pub async fn delete(&self, id: i64) -> HrResult<Lookup<Employee>> {
        let Some(existing) = self.store.find_by_id(id).await? else {
            return Ok(Lookup::NotFound);
        };
        if !self.store.delete_by_id(existing.id).await? {
            return Ok(Lookup::NotFound);
        }
        info!(id, "employee deleted");
        Ok(Lookup::Found(existing))
    }

    pub async fn storage_ok(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}
