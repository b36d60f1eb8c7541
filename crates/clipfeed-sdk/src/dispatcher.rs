//! 互动事件分发器
//!
//! UI 埋点（播放器完播检测、评论输入框）只负责产生信号；
//! 分发器把信号路由到积分台账/评论引擎。完播信号可能因为播放器
//! 重新缓冲、回调重复、应用重启后的重放而多次到达，只记一次的
//! 保证完全由台账承担，这里不做任何重试。

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::events::{now_millis, EngagementEvent, EventBus};
use crate::remote::RemoteDocumentStore;
use crate::storage::points::PointsLedger;

/// 互动信号（由 UI 埋点产生，携带最小上下文）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngagementSignal {
    /// 一个视频被完整观看了一次
    VideoCompleted { video_id: String },
}

/// 互动事件分发器
pub struct EngagementDispatcher {
    ledger: Arc<PointsLedger>,
    remote: Arc<dyn RemoteDocumentStore>,
    events: EventBus,
}

impl EngagementDispatcher {
    pub fn new(
        ledger: Arc<PointsLedger>,
        remote: Arc<dyn RemoteDocumentStore>,
        events: EventBus,
    ) -> Self {
        Self {
            ledger,
            remote,
            events,
        }
    }

    /// 处理一条互动信号
    pub async fn dispatch(&self, signal: EngagementSignal) -> Result<()> {
        match signal {
            EngagementSignal::VideoCompleted { video_id } => {
                self.handle_video_completed(&video_id).await
            }
        }
    }

    async fn handle_video_completed(&self, video_id: &str) -> Result<()> {
        // 廉价短路：重复信号不必再查远端分值
        if self.ledger.has_credited(video_id).await {
            debug!("完播信号重复，台账已记账: video_id={}", video_id);
            return Ok(());
        }

        let video = self.remote.query_video(video_id).await?;
        let total = self
            .ledger
            .credit_points(video_id, video.points_award)
            .await?;

        info!(
            "完播记账: video_id={}, amount={}, total_points={}",
            video_id, video.points_award, total
        );
        self.events.emit(EngagementEvent::PointsCredited {
            video_id: video_id.to_string(),
            amount: video.points_award,
            total_points: total,
            timestamp: now_millis(),
        });

        Ok(())
    }
}
