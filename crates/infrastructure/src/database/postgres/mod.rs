mod mapping;
mod store;

pub use store::{PostgresStore, PostgresTransaction};
