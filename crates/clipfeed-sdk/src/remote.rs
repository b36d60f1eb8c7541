//! 远端文档库客户端接口
//!
//! 评论、视频、用户的权威副本都在远端文档库里，本核心只通过这组
//! 查询/变更原语访问它。传输细节（HTTP/WebSocket/重连）属于外层应用，
//! 由实现方自行处理；核心不做自动重试。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::comments::entities::Comment;
use crate::error::Result;

/// 远端写操作的确认结果
///
/// 传输失败走 `Err`；远端"明确说不"是 `Ok(Rejected)`。
/// 用显式标签而不是真值判断，合法的 0/空响应不会被误判成失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOutcome {
    /// 远端已应用本次变更
    Applied,
    /// 远端明确拒绝本次变更
    Rejected,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// 视频文档（只读引用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// 视频ID
    pub video_id: String,
    /// 视频作者ID（作者可删除自己视频下的任意评论）
    pub author_id: String,
    /// 完整观看一次可获得的积分
    pub points_award: u64,
}

/// 远端文档库客户端
///
/// 所有客户端共享的唯一事实源；跨端一致性只靠幂等写 + 失败后重拉，
/// 不做任何跨端加锁。
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// 拉取一个视频的完整评论树（顶层按创建时间倒序，回复随父评论下发）
    async fn query_comments(&self, video_id: &str) -> Result<Vec<Comment>>;

    /// 只拉取评论总数（信息流角标等场景，不需要整棵树）
    async fn query_comment_count(&self, video_id: &str) -> Result<u64>;

    /// 创建评论，返回带服务端 ID 等服务端字段的评论文档
    async fn create_comment(&self, video_id: &str, author_id: &str, text: &str)
        -> Result<Comment>;

    /// 点赞/取消点赞，按 (comment_id, user_id) 幂等翻转
    async fn toggle_comment_like(
        &self,
        comment_id: &str,
        user_id: &str,
        video_id: &str,
    ) -> Result<MutationOutcome>;

    /// 删除评论文档
    async fn delete_comment(
        &self,
        comment_id: &str,
        user_id: &str,
        video_id: &str,
    ) -> Result<MutationOutcome>;

    /// 查询视频文档（分值与作者信息）
    async fn query_video(&self, video_id: &str) -> Result<Video>;
}
