//! Clipfeed SDK - 移动内容应用的互动核心
//!
//! 本 SDK 承担 Clipfeed（信息流 + 短视频）中真正有不变量的部分：
//! - 🏆 积分台账：完播等互动事件只记一次，重试/重启不会重复加分
//! - 💬 评论同步引擎：新增/点赞/删除先本地乐观生效，远端确认后收敛
//! - 🔁 失败修复：回滚逆操作或整体重拉，UI 不会与远端永久分叉
//! - 📡 事件系统：状态变更统一广播，外壳按需订阅
//! - 💾 本地存储：sled 键值库，用户级命名空间隔离
//!
//! 渲染、导航、推送、传输层都属于外层应用；远端文档库与认证方
//! 以窄接口注入。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clipfeed_sdk::{ClipfeedConfig, ClipfeedSDK, EngagementSignal, UserSession};
//! # use clipfeed_sdk::RemoteDocumentStore;
//!
//! # async fn demo(remote: Arc<dyn RemoteDocumentStore>) -> Result<(), Box<dyn std::error::Error>> {
//! // 配置并初始化 SDK
//! let config = ClipfeedConfig::builder()
//!     .data_dir("/path/to/data")
//!     .build()?;
//! let sdk = ClipfeedSDK::initialize(config, remote).await?;
//!
//! // 登录（身份来自外部认证方）
//! sdk.sign_in(UserSession {
//!     user_id: "user123".to_string(),
//!     username: "alice".to_string(),
//!     avatar: None,
//!     verified: false,
//! })
//! .await?;
//!
//! // 完播信号 → 只记一次积分
//! sdk.dispatch(EngagementSignal::VideoCompleted {
//!     video_id: "video456".to_string(),
//! })
//! .await?;
//!
//! // 评论面板
//! let comments = sdk.comments();
//! comments.open("video456").await;
//! comments.load("video456").await?;
//! # Ok(())
//! # }
//! ```

// 导出核心模块
pub mod comments;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod remote;
pub mod sdk;
pub mod session;
pub mod storage;
pub mod version;

// 重新导出核心类型，方便使用
pub use comments::{Comment, CommentAuthor, CommentPanelState, CommentSyncEngine, RepairPlan};
pub use dispatcher::{EngagementDispatcher, EngagementSignal};
pub use error::{ClipfeedSDKError, Result};
pub use events::{EngagementEvent, EventBus};
pub use remote::{MutationOutcome, RemoteDocumentStore, Video};
pub use sdk::{ClipfeedConfig, ClipfeedConfigBuilder, ClipfeedSDK};
pub use session::UserSession;
pub use storage::{DurableStore, MemoryStore, PointsLedger, PointsLedgerStats, SledStore};
pub use version::SDK_VERSION;
