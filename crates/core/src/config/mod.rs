//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//! 1. 结构体默认值
//! 2. TOML配置文件
//! 3. `JOBRUNNER_` 前缀的环境变量

pub mod models;

pub use models::*;
