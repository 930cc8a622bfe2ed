//! # Job Runner Testing Utils
//!
//! 测试共用的数据构建器、内存存储夹具和通知记录器。
//!
//! ```toml
//! [dev-dependencies]
//! jobrunner-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod fixture;
pub mod mocks;

pub use builders::*;
pub use fixture::*;
pub use mocks::*;
