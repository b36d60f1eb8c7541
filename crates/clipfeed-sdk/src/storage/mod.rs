//! 存储模块 - 互动核心的本地持久层
//!
//! 分层：
//! - `kv`: 窄接口 `DurableStore` 及其 sled / 内存实现，用户级命名空间隔离
//! - `points`: 积分台账，只记一次记账 + 失败回滚

pub mod kv;
pub mod points;

// 重新导出核心类型
pub use kv::{DurableStore, MemoryStore, SledStore};
pub use points::{PointsLedger, PointsLedgerStats};
