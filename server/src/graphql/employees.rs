use async_graphql::{InputObject, SimpleObject};
use products_hr::{Draft, Employee};

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Employee")]
pub struct EmployeeNode {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<Employee> for EmployeeNode {
    fn from(model: Employee) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
        }
    }
}

/// Writable employee fields. Ids are always chosen by the server.
#[derive(Clone, Debug, Default, InputObject)]
pub struct EmployeeInput {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<EmployeeInput> for Draft {
    fn from(input: EmployeeInput) -> Self {
        Draft {
            id: None,
            name: input.name,
            email: input.email,
        }
    }
}
