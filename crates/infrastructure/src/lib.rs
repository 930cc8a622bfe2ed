pub mod database;
pub mod factory;
pub mod message_queue;
pub mod notification;
pub mod observability;

pub use database::*;
pub use factory::InfrastructureFactory;
pub use message_queue::*;
pub use notification::*;
pub use observability::*;
