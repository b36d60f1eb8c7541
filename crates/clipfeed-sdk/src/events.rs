//! 事件系统模块 - 互动核心的状态变更广播
//!
//! 功能包括：
//! - 积分记账/清零事件
//! - 评论新增、确认、失败、删除事件
//! - 点赞翻转与整体刷新事件
//! - 基于 broadcast 的订阅机制，无订阅者时发送即丢弃

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// 当前毫秒时间戳
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 互动核心对外广播的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngagementEvent {
    /// 积分记账完成（幂等跳过不会广播）
    PointsCredited {
        video_id: String,
        amount: u64,
        total_points: u64,
        timestamp: i64,
    },
    /// 积分台账被用户主动清空
    PointsReset { user_id: String, timestamp: i64 },
    /// 乐观评论已插入本地面板
    CommentAdded {
        video_id: String,
        comment_id: String,
        timestamp: i64,
    },
    /// 临时评论获得服务端 ID（原位替换，无闪烁）
    CommentConfirmed {
        video_id: String,
        local_id: String,
        comment_id: String,
        timestamp: i64,
    },
    /// 评论提交失败，临时评论已回滚
    CommentSubmitFailed {
        video_id: String,
        local_id: String,
        error: String,
        timestamp: i64,
    },
    /// 评论点赞状态翻转（乐观生效）
    CommentLikeToggled {
        video_id: String,
        comment_id: String,
        liked: bool,
        timestamp: i64,
    },
    /// 评论被乐观删除
    CommentRemoved {
        video_id: String,
        comment_id: String,
        timestamp: i64,
    },
    /// 评论面板完成一次整体刷新
    CommentsReloaded {
        video_id: String,
        count: u64,
        timestamp: i64,
    },
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngagementEvent>,
}

impl EventBus {
    /// 创建事件总线，capacity 为滞后订阅者可积压的事件数
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<EngagementEvent> {
        self.sender.subscribe()
    }

    /// 广播事件；没有订阅者时静默丢弃，不影响调用方
    pub fn emit(&self, event: EngagementEvent) {
        if self.sender.send(event).is_err() {
            debug!("事件无订阅者，已丢弃");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        bus.emit(EngagementEvent::PointsCredited {
            video_id: "v1".to_string(),
            amount: 10,
            total_points: 10,
            timestamp: now_millis(),
        });

        match receiver.recv().await.unwrap() {
            EngagementEvent::PointsCredited {
                video_id, amount, ..
            } => {
                assert_eq!(video_id, "v1");
                assert_eq!(amount, 10);
            }
            other => panic!("收到了意料之外的事件: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::default();
        // 没有订阅者也不应该 panic 或报错
        bus.emit(EngagementEvent::PointsReset {
            user_id: "u1".to_string(),
            timestamp: now_millis(),
        });
    }
}
