pub mod notifier;
pub mod publisher;
pub mod store;

pub use notifier::*;
pub use publisher::*;
pub use store::*;
