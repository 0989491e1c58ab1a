mod employees;

use async_graphql::{Context, EmptySubscription, Object, Schema};
use platform_api::internal_error;
use products_hr::{EmployeeService, HrError};
use tracing::instrument;

use self::employees::{EmployeeInput, EmployeeNode};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(employees: EmployeeService) -> SchemaType {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(employees)
        .finish()
}

/// SDL snapshot; no service is attached, so the schema is not executable.
pub fn schema_sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .finish()
        .sdl()
}

#[derive(Default)]
pub struct QueryRoot;

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.employees", skip_all)]
    async fn employees(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<EmployeeNode>> {
        let rows = service(ctx)?.get_all().await.map_err(hr_error)?;
        Ok(rows.into_iter().map(EmployeeNode::from).collect())
    }

    /// Null when no employee has this id.
    #[instrument(name = "graphql.employee", skip_all)]
    async fn employee(
        &self,
        ctx: &Context<'_>,
        id: i64,
    ) -> async_graphql::Result<Option<EmployeeNode>> {
        let found = service(ctx)?.get_by_id(id).await.map_err(hr_error)?;
        Ok(found.into_option().map(EmployeeNode::from))
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

#[Object]
impl MutationRoot {
    #[instrument(name = "graphql.create_employee", skip_all)]
    async fn create_employee(
        &self,
        ctx: &Context<'_>,
        input: EmployeeInput,
    ) -> async_graphql::Result<EmployeeNode> {
        let created = service(ctx)?
            .create(input.into())
            .await
            .map_err(hr_error)?;
        Ok(created.into())
    }

    /// Null when no employee has this id.
    #[instrument(name = "graphql.update_employee", skip_all)]
    async fn update_employee(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: EmployeeInput,
    ) -> async_graphql::Result<Option<EmployeeNode>> {
        let updated = service(ctx)?
            .update(id, input.into())
            .await
            .map_err(hr_error)?;
        Ok(updated.into_option().map(EmployeeNode::from))
    }

    #[instrument(name = "graphql.delete_employee", skip_all)]
    async fn delete_employee(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<bool> {
        let removed = service(ctx)?.delete(id).await.map_err(hr_error)?;
        Ok(removed.is_found())
    }
}

fn service<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a EmployeeService> {
    ctx.data::<EmployeeService>()
        .map_err(|_| internal_error(anyhow::anyhow!("employee service missing from schema")))
}

fn hr_error(err: HrError) -> async_graphql::Error {
    internal_error(err)
}
