pub mod repo;
pub mod schema;
