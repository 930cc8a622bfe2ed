pub mod memory_publisher;
pub mod redis_publisher;

pub use memory_publisher::InMemoryPublisher;
pub use redis_publisher::RedisPublisher;
