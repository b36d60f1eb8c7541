//! 评论模块 - 乐观同步的评论树
//!
//! 分层：
//! - `entities`: 评论实体与面板状态
//! - `engine`: 评论同步引擎（本模块的对外入口）
//! - `reconcile`: 失败后的统一修复计划

pub mod engine;
pub mod entities;
pub mod reconcile;

// 重新导出核心类型
pub use engine::CommentSyncEngine;
pub use entities::{Comment, CommentAuthor, CommentPanelState};
pub use reconcile::RepairPlan;
