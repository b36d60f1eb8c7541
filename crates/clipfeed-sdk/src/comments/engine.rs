//! 评论同步引擎
//!
//! 职责：
//! - 维护每个视频的内存评论树（面板状态），本地变更立即生效
//! - 乐观变更（新增/点赞/删除）先改本地再确认远端
//! - 远端失败时按统一修复计划回滚或整体重拉，UI 永远不会与远端永久分叉
//!
//! 状态机：未初始化 → Loading → Ready，Ready 只在显式刷新时重新进入
//! Loading；没有 Error 终态，失败一律通过重拉回到 Ready。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::comments::entities::{Comment, CommentPanelState};
use crate::comments::reconcile::RepairPlan;
use crate::error::{ClipfeedSDKError, Result};
use crate::events::{now_millis, EngagementEvent, EventBus};
use crate::remote::{MutationOutcome, RemoteDocumentStore};
use crate::session::UserSession;

/// 评论同步引擎
pub struct CommentSyncEngine {
    /// 远端文档库客户端
    remote: Arc<dyn RemoteDocumentStore>,
    /// 每个视频一份面板状态（随面板开关生灭，从不持久化）
    panels: Arc<RwLock<HashMap<String, CommentPanelState>>>,
    /// 事件总线
    events: EventBus,
}

impl CommentSyncEngine {
    /// 创建评论同步引擎
    pub fn new(remote: Arc<dyn RemoteDocumentStore>, events: EventBus) -> Self {
        Self {
            remote,
            panels: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// 打开一个视频的评论面板（创建空的面板状态）
    pub async fn open(&self, video_id: &str) {
        let mut panels = self.panels.write().await;
        panels.entry(video_id.to_string()).or_default();
        debug!("评论面板已打开: video_id={}", video_id);
    }

    /// 关闭评论面板并丢弃其状态
    ///
    /// 在途操作完成后会发现面板已不存在，结果直接丢弃（卸载保护）。
    pub async fn release(&self, video_id: &str) {
        let mut panels = self.panels.write().await;
        panels.remove(video_id);
        debug!("评论面板已释放: video_id={}", video_id);
    }

    /// 读取面板状态快照
    pub async fn snapshot(&self, video_id: &str) -> Option<CommentPanelState> {
        let panels = self.panels.read().await;
        panels.get(video_id).cloned()
    }

    /// 整体拉取评论树，提交后进入 Ready
    ///
    /// 同一视频并发发起多次 load 时只有最新一次的结果会被提交，
    /// 旧的结果按代数直接丢弃。返回本次拉到的节点总数。
    pub async fn load(&self, video_id: &str) -> Result<u64> {
        let generation = {
            let mut panels = self.panels.write().await;
            let panel = panels.entry(video_id.to_string()).or_default();
            panel.loading = true;
            panel.load_generation += 1;
            panel.load_generation
        };

        let fetched = self.remote.query_comments(video_id).await;

        let mut panels = self.panels.write().await;
        let panel = match panels.get_mut(video_id) {
            Some(panel) => panel,
            None => {
                // 面板已关闭，结果不再应用
                debug!("面板已释放，丢弃 load 结果: video_id={}", video_id);
                return fetched.map(|comments| tree_count(&comments));
            }
        };

        if panel.load_generation != generation {
            // 有更新的 load 在途或已提交，本次结果作废
            debug!(
                "load 已被取代，丢弃结果: video_id={}, generation={}, current={}",
                video_id, generation, panel.load_generation
            );
            return fetched.map(|comments| tree_count(&comments));
        }

        match fetched {
            Ok(mut comments) => {
                // 顶层按创建时间倒序
                comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let count = tree_count(&comments);

                panel.comments = comments;
                panel.count = count;
                panel.loading = false;
                // 状态整体换新，在途标记一并作废
                panel.pending_likes.clear();
                panel.pending_deletes.clear();

                info!("评论刷新完成: video_id={}, count={}", video_id, count);
                self.events.emit(EngagementEvent::CommentsReloaded {
                    video_id: video_id.to_string(),
                    count,
                    timestamp: now_millis(),
                });

                Ok(count)
            }
            Err(e) => {
                panel.loading = false;
                warn!("评论刷新失败: video_id={}, error={}", video_id, e);
                Err(e)
            }
        }
    }

    /// 只拉取评论总数（信息流角标场景，不加载评论树）
    pub async fn count(&self, video_id: &str) -> Result<u64> {
        let count = self.remote.query_comment_count(video_id).await?;

        let mut panels = self.panels.write().await;
        let panel = panels.entry(video_id.to_string()).or_default();
        panel.count = count;

        Ok(count)
    }

    /// 发表评论
    ///
    /// 乐观阶段：临时评论立即插入面板顶部并计数 +1；
    /// 远端确认后原位替换服务端字段（不重拉，避免闪烁）；
    /// 远端失败时撤掉临时评论并把错误交给调用方，不自动重试。
    pub async fn submit(
        &self,
        video_id: &str,
        session: &UserSession,
        text: &str,
    ) -> Result<Comment> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClipfeedSDKError::InvalidInput(
                "comment text must not be empty".to_string(),
            ));
        }
        if session.user_id.is_empty() {
            return Err(ClipfeedSDKError::NotAuthenticated(
                "a signed-in user is required to comment".to_string(),
            ));
        }

        let local_id = format!("local-{}", Uuid::new_v4());
        let provisional = Comment {
            id: local_id.clone(),
            text: trimmed.to_string(),
            author: session.as_comment_author(),
            created_at: now_millis(),
            like_count: 0,
            liked_by_me: false,
            replies: Vec::new(),
        };

        // 乐观阶段：先让用户立刻看到自己的评论
        {
            let mut panels = self.panels.write().await;
            let panel = panels.get_mut(video_id).ok_or_else(|| {
                ClipfeedSDKError::InvalidOperation(format!(
                    "comment panel is not open for video {}",
                    video_id
                ))
            })?;
            if panel.loading {
                return Err(ClipfeedSDKError::RefreshInFlight(
                    "comment panel is refreshing".to_string(),
                ));
            }
            panel.comments.insert(0, provisional.clone());
            panel.count += 1;
        }

        self.events.emit(EngagementEvent::CommentAdded {
            video_id: video_id.to_string(),
            comment_id: local_id.clone(),
            timestamp: now_millis(),
        });

        let plan = RepairPlan::RemoveProvisional {
            local_id: local_id.clone(),
        };

        match self
            .remote
            .create_comment(video_id, &session.user_id, trimmed)
            .await
        {
            Ok(server_comment) => {
                // 原位合并服务端字段，评论不消失不闪烁
                let mut panels = self.panels.write().await;
                if let Some(panel) = panels.get_mut(video_id) {
                    if let Some(comment) = panel.find_comment_mut(&local_id) {
                        comment.id = server_comment.id.clone();
                        comment.created_at = server_comment.created_at;
                    }
                }

                info!(
                    "评论提交成功: video_id={}, local_id={}, comment_id={}",
                    video_id, local_id, server_comment.id
                );
                self.events.emit(EngagementEvent::CommentConfirmed {
                    video_id: video_id.to_string(),
                    local_id,
                    comment_id: server_comment.id.clone(),
                    timestamp: now_millis(),
                });

                Ok(server_comment)
            }
            Err(e) => {
                warn!(
                    "评论提交失败，回滚临时评论: video_id={}, local_id={}, error={}",
                    video_id, local_id, e
                );
                self.repair(video_id, plan).await;
                self.events.emit(EngagementEvent::CommentSubmitFailed {
                    video_id: video_id.to_string(),
                    local_id,
                    error: e.to_string(),
                    timestamp: now_millis(),
                });
                Err(e)
            }
        }
    }

    /// 点赞/取消点赞
    ///
    /// 乐观阶段翻转本地状态；远端按 (comment_id, user_id) 幂等落账。
    /// 远端失败或明确拒绝时丢弃乐观视图并整体重拉。
    /// 本地找不到目标评论（如并发删除后的过期 ID）时静默跳过。
    pub async fn toggle_like(
        &self,
        comment_id: &str,
        user_id: &str,
        video_id: &str,
    ) -> Result<()> {
        if user_id.is_empty() || video_id.is_empty() {
            return Err(ClipfeedSDKError::NotAuthenticated(
                "a signed-in user is required to like a comment".to_string(),
            ));
        }

        let liked_now = {
            let mut panels = self.panels.write().await;
            let panel = panels.get_mut(video_id).ok_or_else(|| {
                ClipfeedSDKError::InvalidOperation(format!(
                    "comment panel is not open for video {}",
                    video_id
                ))
            })?;
            if panel.loading {
                return Err(ClipfeedSDKError::RefreshInFlight(
                    "comment panel is refreshing".to_string(),
                ));
            }

            match panel.find_comment_mut(comment_id) {
                Some(comment) => {
                    if comment.liked_by_me {
                        comment.liked_by_me = false;
                        comment.like_count = comment.like_count.saturating_sub(1);
                    } else {
                        comment.liked_by_me = true;
                        comment.like_count += 1;
                    }
                    let liked_by_me = comment.liked_by_me;
                    panel.pending_likes.insert(comment_id.to_string());
                    Some(liked_by_me)
                }
                None => None,
            }
        };

        let liked = match liked_now {
            Some(liked) => liked,
            None => {
                // 过期 ID（如评论刚被并发删除）：静默跳过
                debug!(
                    "点赞目标不在本地树中，跳过: video_id={}, comment_id={}",
                    video_id, comment_id
                );
                return Ok(());
            }
        };

        self.events.emit(EngagementEvent::CommentLikeToggled {
            video_id: video_id.to_string(),
            comment_id: comment_id.to_string(),
            liked,
            timestamp: now_millis(),
        });

        let outcome = self
            .remote
            .toggle_comment_like(comment_id, user_id, video_id)
            .await;

        // 无论结局如何，在途标记都要摘掉
        {
            let mut panels = self.panels.write().await;
            if let Some(panel) = panels.get_mut(video_id) {
                panel.pending_likes.remove(comment_id);
            }
        }

        match outcome {
            Ok(MutationOutcome::Applied) => Ok(()),
            Ok(MutationOutcome::Rejected) => {
                warn!(
                    "远端拒绝点赞翻转，重拉恢复: video_id={}, comment_id={}",
                    video_id, comment_id
                );
                self.repair(video_id, RepairPlan::Refetch).await;
                Err(ClipfeedSDKError::RemoteRejected(
                    "like toggle was rejected by the remote store".to_string(),
                ))
            }
            Err(e) => {
                warn!(
                    "点赞翻转远端失败，重拉恢复: video_id={}, comment_id={}, error={}",
                    video_id, comment_id, e
                );
                self.repair(video_id, RepairPlan::Refetch).await;
                Err(e)
            }
        }
    }

    /// 删除评论
    ///
    /// 授权前置检查（任何本地变更之前）：评论作者本人，或该视频的作者
    /// （视频作者可清理自己视频下的任意评论）。
    pub async fn remove(&self, comment_id: &str, user_id: &str, video_id: &str) -> Result<()> {
        if user_id.is_empty() || video_id.is_empty() {
            return Err(ClipfeedSDKError::NotAuthenticated(
                "a signed-in user is required to delete a comment".to_string(),
            ));
        }

        // 先定位评论拿到作者，再做授权判断
        let comment_author = {
            let panels = self.panels.read().await;
            let panel = panels.get(video_id).ok_or_else(|| {
                ClipfeedSDKError::InvalidOperation(format!(
                    "comment panel is not open for video {}",
                    video_id
                ))
            })?;
            if panel.loading {
                return Err(ClipfeedSDKError::RefreshInFlight(
                    "comment panel is refreshing".to_string(),
                ));
            }
            panel
                .find_comment(comment_id)
                .map(|c| c.author.id.clone())
                .ok_or_else(|| {
                    ClipfeedSDKError::NotFound(format!("comment {} not found", comment_id))
                })?
        };

        let can_delete = if comment_author == user_id {
            true
        } else {
            // 视频作者可删除自己视频下的任意评论
            let video = self.remote.query_video(video_id).await?;
            video.author_id == user_id
        };
        if !can_delete {
            return Err(ClipfeedSDKError::NotAuthorized(
                "only the comment author or the video owner can delete a comment".to_string(),
            ));
        }

        // 乐观阶段：从顶层或父评论的回复里摘除（两条路径只会走其一）
        let nodes_removed = {
            let mut panels = self.panels.write().await;
            let panel = panels.get_mut(video_id).ok_or_else(|| {
                ClipfeedSDKError::InvalidOperation(format!(
                    "comment panel is not open for video {}",
                    video_id
                ))
            })?;
            if panel.loading {
                return Err(ClipfeedSDKError::RefreshInFlight(
                    "comment panel is refreshing".to_string(),
                ));
            }
            let removed = panel.remove_comment(comment_id).ok_or_else(|| {
                ClipfeedSDKError::NotFound(format!("comment {} not found", comment_id))
            })?;
            panel.count = panel.count.saturating_sub(removed.nodes_removed);
            panel.pending_deletes.insert(comment_id.to_string());
            removed.nodes_removed
        };

        self.events.emit(EngagementEvent::CommentRemoved {
            video_id: video_id.to_string(),
            comment_id: comment_id.to_string(),
            timestamp: now_millis(),
        });
        debug!(
            "乐观删除完成: video_id={}, comment_id={}, nodes_removed={}",
            video_id, comment_id, nodes_removed
        );

        let outcome = self
            .remote
            .delete_comment(comment_id, user_id, video_id)
            .await;

        {
            let mut panels = self.panels.write().await;
            if let Some(panel) = panels.get_mut(video_id) {
                panel.pending_deletes.remove(comment_id);
            }
        }

        match outcome {
            Ok(MutationOutcome::Applied) => {
                info!("评论删除成功: video_id={}, comment_id={}", video_id, comment_id);
                Ok(())
            }
            Ok(MutationOutcome::Rejected) => {
                warn!(
                    "远端拒绝删除，重拉恢复: video_id={}, comment_id={}",
                    video_id, comment_id
                );
                self.repair(video_id, RepairPlan::Refetch).await;
                Err(ClipfeedSDKError::RemoteRejected(
                    "comment deletion was rejected by the remote store".to_string(),
                ))
            }
            Err(e) => {
                warn!(
                    "删除评论远端失败，重拉恢复: video_id={}, comment_id={}, error={}",
                    video_id, comment_id, e
                );
                self.repair(video_id, RepairPlan::Refetch).await;
                Err(e)
            }
        }
    }

    /// 统一执行失败修复计划
    ///
    /// 修复自身的失败只记日志：调用方拿到的是原始操作的错误，
    /// 下一次显式刷新仍然会把状态拉回远端真相。
    async fn repair(&self, video_id: &str, plan: RepairPlan) {
        match plan {
            RepairPlan::RemoveProvisional { local_id } => {
                let mut panels = self.panels.write().await;
                if let Some(panel) = panels.get_mut(video_id) {
                    if let Some(removed) = panel.remove_comment(&local_id) {
                        panel.count = panel.count.saturating_sub(removed.nodes_removed);
                    }
                }
            }
            RepairPlan::Refetch => {
                let still_open = self.panels.read().await.contains_key(video_id);
                if !still_open {
                    return;
                }
                if let Err(e) = self.load(video_id).await {
                    warn!("修复性重拉失败: video_id={}, error={}", video_id, e);
                }
            }
        }
    }
}

/// 树中的节点总数（顶层 + 回复）
fn tree_count(comments: &[Comment]) -> u64 {
    comments.iter().map(Comment::node_count).sum()
}
