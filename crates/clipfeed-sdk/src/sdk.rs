//! SDK 装配层
//!
//! 把存储、台账、评论引擎、事件总线装配成一个对移动端外壳友好的门面。
//! 远端文档库客户端由外层注入（传输细节不属于本核心）。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::comments::engine::CommentSyncEngine;
use crate::dispatcher::{EngagementDispatcher, EngagementSignal};
use crate::error::{ClipfeedSDKError, Result};
use crate::events::{now_millis, EngagementEvent, EventBus};
use crate::remote::RemoteDocumentStore;
use crate::session::UserSession;
use crate::storage::kv::SledStore;
use crate::storage::points::PointsLedger;

/// SDK 配置
#[derive(Debug, Clone)]
pub struct ClipfeedConfig {
    /// 本地数据目录（sled 数据库落在其下）
    pub data_dir: PathBuf,
    /// 事件总线容量
    pub event_capacity: usize,
}

impl ClipfeedConfig {
    pub fn builder() -> ClipfeedConfigBuilder {
        ClipfeedConfigBuilder::default()
    }
}

/// SDK 配置构建器
#[derive(Debug, Default)]
pub struct ClipfeedConfigBuilder {
    data_dir: Option<PathBuf>,
    event_capacity: Option<usize>,
}

impl ClipfeedConfigBuilder {
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<ClipfeedConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            ClipfeedSDKError::InvalidInput("data_dir is required".to_string())
        })?;
        Ok(ClipfeedConfig {
            data_dir,
            event_capacity: self.event_capacity.unwrap_or(256),
        })
    }
}

/// 已登录用户的会话上下文
struct ActiveSession {
    session: UserSession,
    ledger: Arc<PointsLedger>,
    dispatcher: Arc<EngagementDispatcher>,
}

/// Clipfeed 互动核心 SDK
pub struct ClipfeedSDK {
    #[allow(dead_code)]
    config: ClipfeedConfig,
    kv: Arc<SledStore>,
    remote: Arc<dyn RemoteDocumentStore>,
    events: EventBus,
    comments: Arc<CommentSyncEngine>,
    active: RwLock<Option<ActiveSession>>,
}

impl ClipfeedSDK {
    /// 初始化 SDK（打开本地存储、装配引擎；此时还没有用户登录）
    pub async fn initialize(
        config: ClipfeedConfig,
        remote: Arc<dyn RemoteDocumentStore>,
    ) -> Result<Arc<Self>> {
        let kv = Arc::new(SledStore::new(&config.data_dir).await?);
        let events = EventBus::new(config.event_capacity);
        let comments = Arc::new(CommentSyncEngine::new(remote.clone(), events.clone()));

        info!("Clipfeed SDK 初始化完成: version={}", crate::version::SDK_VERSION);

        Ok(Arc::new(Self {
            config,
            kv,
            remote,
            events,
            comments,
            active: RwLock::new(None),
        }))
    }

    /// 登录：切换本地命名空间并加载该用户的积分台账
    pub async fn sign_in(&self, session: UserSession) -> Result<()> {
        if session.user_id.is_empty() {
            return Err(ClipfeedSDKError::NotAuthenticated(
                "user_id must not be empty".to_string(),
            ));
        }

        self.kv.switch_user(&session.user_id).await?;

        let store: Arc<dyn crate::storage::kv::DurableStore> = self.kv.clone();
        let ledger = Arc::new(PointsLedger::new(store, &session.user_id));
        ledger.initialize().await?;

        let dispatcher = Arc::new(EngagementDispatcher::new(
            ledger.clone(),
            self.remote.clone(),
            self.events.clone(),
        ));

        info!("用户登录: user_id={}", session.user_id);

        let mut active = self.active.write().await;
        *active = Some(ActiveSession {
            session,
            ledger,
            dispatcher,
        });

        Ok(())
    }

    /// 登出：丢弃会话级状态（本地台账数据保留，下次登录继续生效）
    pub async fn sign_out(&self) {
        let mut active = self.active.write().await;
        if let Some(prev) = active.take() {
            info!("用户登出: user_id={}", prev.session.user_id);
        }
    }

    /// 当前会话（未登录时为 None）
    pub async fn session(&self) -> Option<UserSession> {
        let active = self.active.read().await;
        active.as_ref().map(|a| a.session.clone())
    }

    /// 评论同步引擎
    pub fn comments(&self) -> Arc<CommentSyncEngine> {
        self.comments.clone()
    }

    /// 当前用户的积分台账
    pub async fn ledger(&self) -> Result<Arc<PointsLedger>> {
        let active = self.active.read().await;
        active
            .as_ref()
            .map(|a| a.ledger.clone())
            .ok_or_else(|| ClipfeedSDKError::NotAuthenticated("no active session".to_string()))
    }

    /// 投递一条互动信号
    pub async fn dispatch(&self, signal: EngagementSignal) -> Result<()> {
        let dispatcher = {
            let active = self.active.read().await;
            active
                .as_ref()
                .map(|a| a.dispatcher.clone())
                .ok_or_else(|| {
                    ClipfeedSDKError::NotAuthenticated("no active session".to_string())
                })?
        };
        dispatcher.dispatch(signal).await
    }

    /// 清空当前用户的互动数据
    ///
    /// 这是 reset 的唯一入口，只应由设置页"清除数据"这类
    /// 用户主动操作触达；任何自动流程都不得调用。
    pub async fn reset_engagement_data(&self) -> Result<()> {
        let (user_id, ledger) = {
            let active = self.active.read().await;
            let active = active.as_ref().ok_or_else(|| {
                ClipfeedSDKError::NotAuthenticated("no active session".to_string())
            })?;
            (active.session.user_id.clone(), active.ledger.clone())
        };

        ledger.reset_all().await?;
        self.events.emit(EngagementEvent::PointsReset {
            user_id,
            timestamp: now_millis(),
        });

        Ok(())
    }

    /// 订阅互动事件流
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<EngagementEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::entities::Comment;
    use crate::remote::{MutationOutcome, Video};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 装配测试用远端桩
    #[derive(Default)]
    struct StubRemote {
        videos: Mutex<HashMap<String, Video>>,
    }

    #[async_trait]
    impl RemoteDocumentStore for StubRemote {
        async fn query_comments(&self, _video_id: &str) -> Result<Vec<Comment>> {
            Ok(Vec::new())
        }

        async fn query_comment_count(&self, _video_id: &str) -> Result<u64> {
            Ok(0)
        }

        async fn create_comment(
            &self,
            video_id: &str,
            author_id: &str,
            text: &str,
        ) -> Result<Comment> {
            Ok(Comment {
                id: format!("srv-{}-{}", video_id, text.len()),
                text: text.to_string(),
                author: crate::comments::entities::CommentAuthor {
                    id: author_id.to_string(),
                    username: format!("user-{}", author_id),
                    avatar: None,
                    verified: false,
                },
                created_at: 1_700_000_000_000,
                like_count: 0,
                liked_by_me: false,
                replies: Vec::new(),
            })
        }

        async fn toggle_comment_like(
            &self,
            _comment_id: &str,
            _user_id: &str,
            _video_id: &str,
        ) -> Result<MutationOutcome> {
            Ok(MutationOutcome::Applied)
        }

        async fn delete_comment(
            &self,
            _comment_id: &str,
            _user_id: &str,
            _video_id: &str,
        ) -> Result<MutationOutcome> {
            Ok(MutationOutcome::Applied)
        }

        async fn query_video(&self, video_id: &str) -> Result<Video> {
            self.videos
                .lock()
                .unwrap()
                .get(video_id)
                .cloned()
                .ok_or_else(|| {
                    ClipfeedSDKError::NotFound(format!("video {} not found", video_id))
                })
        }
    }

    fn test_session(user_id: &str) -> UserSession {
        UserSession {
            user_id: user_id.to_string(),
            username: format!("user-{}", user_id),
            avatar: None,
            verified: false,
        }
    }

    async fn new_sdk(temp_dir: &TempDir) -> Arc<ClipfeedSDK> {
        let remote = Arc::new(StubRemote::default());
        remote.videos.lock().unwrap().insert(
            "v1".to_string(),
            Video {
                video_id: "v1".to_string(),
                author_id: "owner".to_string(),
                points_award: 10,
            },
        );
        let config = ClipfeedConfig::builder()
            .data_dir(temp_dir.path())
            .build()
            .unwrap();
        ClipfeedSDK::initialize(config, remote).await.unwrap()
    }

    #[tokio::test]
    async fn test_config_builder_requires_data_dir() {
        let result = ClipfeedConfig::builder().build();
        assert!(matches!(result, Err(ClipfeedSDKError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_sign_in_dispatch_and_reset_flow() {
        let temp_dir = TempDir::new().unwrap();
        let sdk = new_sdk(&temp_dir).await;

        // 未登录时不可投递
        let result = sdk
            .dispatch(EngagementSignal::VideoCompleted {
                video_id: "v1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ClipfeedSDKError::NotAuthenticated(_))));

        sdk.sign_in(test_session("u1")).await.unwrap();

        // 完播 → 记账；重复投递被台账吸收
        sdk.dispatch(EngagementSignal::VideoCompleted {
            video_id: "v1".to_string(),
        })
        .await
        .unwrap();
        sdk.dispatch(EngagementSignal::VideoCompleted {
            video_id: "v1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(sdk.ledger().await.unwrap().total_points().await, 10);

        // 用户主动清空
        sdk.reset_engagement_data().await.unwrap();
        assert_eq!(sdk.ledger().await.unwrap().total_points().await, 0);
    }

    #[tokio::test]
    async fn test_ledger_survives_sign_out_and_back_in() {
        let temp_dir = TempDir::new().unwrap();
        let sdk = new_sdk(&temp_dir).await;

        sdk.sign_in(test_session("u1")).await.unwrap();
        sdk.dispatch(EngagementSignal::VideoCompleted {
            video_id: "v1".to_string(),
        })
        .await
        .unwrap();

        sdk.sign_out().await;
        assert!(sdk.session().await.is_none());

        // 重新登录：台账从本地存储恢复，完播重放不会重复加分
        sdk.sign_in(test_session("u1")).await.unwrap();
        let ledger = sdk.ledger().await.unwrap();
        assert_eq!(ledger.total_points().await, 10);
        sdk.dispatch(EngagementSignal::VideoCompleted {
            video_id: "v1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(ledger.total_points().await, 10);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_ledger_state() {
        let temp_dir = TempDir::new().unwrap();
        let sdk = new_sdk(&temp_dir).await;

        sdk.sign_in(test_session("u1")).await.unwrap();
        sdk.dispatch(EngagementSignal::VideoCompleted {
            video_id: "v1".to_string(),
        })
        .await
        .unwrap();

        // 切到另一个用户：空账
        sdk.sign_in(test_session("u2")).await.unwrap();
        assert_eq!(sdk.ledger().await.unwrap().total_points().await, 0);
    }

    #[tokio::test]
    async fn test_comment_flow_through_sdk_facade() {
        let temp_dir = TempDir::new().unwrap();
        let sdk = new_sdk(&temp_dir).await;
        sdk.sign_in(test_session("u1")).await.unwrap();

        let comments = sdk.comments();
        comments.open("v1").await;
        comments.load("v1").await.unwrap();

        let session = sdk.session().await.unwrap();
        let confirmed = comments.submit("v1", &session, "first!").await.unwrap();
        assert!(confirmed.id.starts_with("srv-"));

        let state = comments.snapshot("v1").await.unwrap();
        assert_eq!(state.count, 1);

        comments.release("v1").await;
        assert!(comments.snapshot("v1").await.is_none());
    }
}
