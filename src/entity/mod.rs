pub mod order_exceptions;
pub mod order_items;
pub mod orders;
pub mod project_members;
pub mod projects;
pub mod users;

pub use order_exceptions::Entity as OrderExceptions;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use project_members::Entity as ProjectMembers;
pub use projects::Entity as Projects;
pub use users::Entity as Users;
