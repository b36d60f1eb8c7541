//! 积分台账 - 观看完成等互动事件的只记一次记账
//!
//! 核心保证：
//! - 同一个 (用户, 视频) 终生最多记一次积分，事件重放/重试/重启都不会重复加分
//! - 内存总分与已记账集合永远满足 total == sum(各视频分值)
//! - 持久化失败时内存状态回滚到记账前，调用方能观察到失败

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ClipfeedSDKError, Result};
use crate::storage::kv::{keys, DurableStore};

/// 持久化的台账记录（每个用户一条，整条原子写入）
///
/// 集合与总分放在同一条记录里，单键 set 即可保证两者不会写半截。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerRecord {
    /// 已记账视频：video_id -> 记账时间（毫秒时间戳）
    entries: HashMap<String, i64>,
    /// 当前累计积分
    total_points: u64,
}

/// 内存镜像（初始化后才存在）
#[derive(Debug, Default)]
struct LedgerState {
    credited: HashMap<String, i64>,
    total_points: u64,
}

/// 积分台账统计信息
#[derive(Debug, Clone)]
pub struct PointsLedgerStats {
    /// 已记账的视频数量
    pub credited_videos: usize,
    /// 当前累计积分
    pub total_points: u64,
    /// 是否已完成初始化
    pub initialized: bool,
}

/// 积分台账
///
/// 显式实例：注入存储依赖 + 显式 user_id，多账号/测试之间不共享任何隐藏状态。
pub struct PointsLedger {
    store: Arc<dyn DurableStore>,
    user_id: String,
    state: RwLock<Option<LedgerState>>,
}

impl PointsLedger {
    /// 创建台账实例（尚未加载持久化数据，需要先 initialize）
    pub fn new(store: Arc<dyn DurableStore>, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
            state: RwLock::new(None),
        }
    }

    fn storage_key(&self) -> String {
        format!("{}{}", keys::POINTS_LEDGER, self.user_id)
    }

    /// 从本地存储加载台账，不存在时初始化为空账
    ///
    /// 每个用户会话记账前必须调用一次；重复调用会重新加载（幂等）。
    pub async fn initialize(&self) -> Result<()> {
        let record = match self.store.get(&self.storage_key()).await? {
            Some(raw) => serde_json::from_str::<LedgerRecord>(&raw)?,
            None => LedgerRecord::default(),
        };

        let mut state = self.state.write().await;
        *state = Some(LedgerState {
            credited: record.entries,
            total_points: record.total_points,
        });

        info!(
            "积分台账初始化完成: user_id={}, credited_videos={}, total_points={}",
            self.user_id,
            state.as_ref().map(|s| s.credited.len()).unwrap_or(0),
            state.as_ref().map(|s| s.total_points).unwrap_or(0)
        );

        Ok(())
    }

    /// 检查某个视频是否已经记过积分
    pub async fn has_credited(&self, video_id: &str) -> bool {
        let state = self.state.read().await;
        state
            .as_ref()
            .map(|s| s.credited.contains_key(video_id))
            .unwrap_or(false)
    }

    /// 当前累计积分（未初始化时为 0）
    pub async fn total_points(&self) -> u64 {
        let state = self.state.read().await;
        state.as_ref().map(|s| s.total_points).unwrap_or(0)
    }

    /// 为一个视频记积分，返回记账后的总分
    ///
    /// 幂等：同一视频再次记账是无操作，直接返回当前总分。
    /// 播放器重复回调、重新缓冲、应用重启后的事件重放都会走到这条路径。
    pub async fn credit_points(&self, video_id: &str, amount: u64) -> Result<u64> {
        if video_id.is_empty() {
            return Err(ClipfeedSDKError::InvalidInput(
                "video_id must not be empty".to_string(),
            ));
        }

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(|| {
            ClipfeedSDKError::NotInitialized("points ledger not initialized".to_string())
        })?;

        // 幂等短路：已记过账则不再变更
        if state.credited.contains_key(video_id) {
            debug!(
                "🔄 视频已记过积分，幂等跳过: user_id={}, video_id={}",
                self.user_id, video_id
            );
            return Ok(state.total_points);
        }

        // 先落盘后提交内存：持久化失败时内存仍是记账前的值，
        // 不会出现"内存已加分但磁盘没有"的半截状态
        let credited_at = chrono::Utc::now().timestamp_millis();
        let new_total = state.total_points + amount;

        let mut record = LedgerRecord {
            entries: state.credited.clone(),
            total_points: new_total,
        };
        record.entries.insert(video_id.to_string(), credited_at);

        let raw = serde_json::to_string(&record)?;
        if let Err(e) = self.store.set(&self.storage_key(), &raw).await {
            warn!(
                "积分记账持久化失败，内存状态保持不变: user_id={}, video_id={}, error={}",
                self.user_id, video_id, e
            );
            return Err(e);
        }

        state.credited.insert(video_id.to_string(), credited_at);
        state.total_points = new_total;

        info!(
            "✅ 积分记账完成: user_id={}, video_id={}, amount={}, total_points={}",
            self.user_id, video_id, amount, new_total
        );

        Ok(new_total)
    }

    /// 清空台账并持久化空账
    ///
    /// 只允许从用户主动发起的"清除数据"入口调用，任何自动流程都不应走到这里。
    pub async fn reset_all(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(|| {
            ClipfeedSDKError::NotInitialized("points ledger not initialized".to_string())
        })?;

        let raw = serde_json::to_string(&LedgerRecord::default())?;
        self.store.set(&self.storage_key(), &raw).await?;

        state.credited.clear();
        state.total_points = 0;

        info!("积分台账已清空: user_id={}", self.user_id);

        Ok(())
    }

    /// 获取统计信息
    pub async fn get_stats(&self) -> PointsLedgerStats {
        let state = self.state.read().await;
        match state.as_ref() {
            Some(s) => PointsLedgerStats {
                credited_videos: s.credited.len(),
                total_points: s.total_points,
                initialized: true,
            },
            None => PointsLedgerStats {
                credited_videos: 0,
                total_points: 0,
                initialized: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 可注入写失败的存储桩
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_set: AtomicBool,
    }

    #[async_trait]
    impl DurableStore for FailingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(ClipfeedSDKError::KvStore("模拟磁盘写入失败".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    fn new_ledger(store: Arc<dyn DurableStore>) -> PointsLedger {
        PointsLedger::new(store, "user_1")
    }

    #[tokio::test]
    async fn test_credit_points_scenario_a() {
        // 场景 A：空账上记 10 分，再次记账总分不变
        let ledger = new_ledger(Arc::new(MemoryStore::new()));
        ledger.initialize().await.unwrap();

        let total = ledger.credit_points("v1", 10).await.unwrap();
        assert_eq!(total, 10);
        assert!(ledger.has_credited("v1").await);

        let total = ledger.credit_points("v1", 10).await.unwrap();
        assert_eq!(total, 10);
        assert_eq!(ledger.total_points().await, 10);
    }

    #[tokio::test]
    async fn test_ledger_invariant_over_mixed_sequence() {
        // 含重复的记账序列之后，总分 == 各不同视频分值之和
        let ledger = new_ledger(Arc::new(MemoryStore::new()));
        ledger.initialize().await.unwrap();

        ledger.credit_points("v1", 10).await.unwrap();
        ledger.credit_points("v2", 5).await.unwrap();
        ledger.credit_points("v1", 10).await.unwrap();
        ledger.credit_points("v3", 0).await.unwrap();
        ledger.credit_points("v2", 5).await.unwrap();

        assert_eq!(ledger.total_points().await, 15);
        let stats = ledger.get_stats().await;
        assert_eq!(stats.credited_videos, 3);
        assert_eq!(stats.total_points, 15);
    }

    #[tokio::test]
    async fn test_credit_requires_initialize() {
        let ledger = new_ledger(Arc::new(MemoryStore::new()));

        let result = ledger.credit_points("v1", 10).await;
        assert!(matches!(
            result,
            Err(ClipfeedSDKError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_credit_rejects_empty_video_id() {
        let ledger = new_ledger(Arc::new(MemoryStore::new()));
        ledger.initialize().await.unwrap();

        let result = ledger.credit_points("", 10).await;
        assert!(matches!(result, Err(ClipfeedSDKError::InvalidInput(_))));
        assert_eq!(ledger.total_points().await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_rolls_back_memory() {
        // 持久化失败时：调用方观察到失败，内存回到记账前，
        // 之后重试同一事件仍然可以成功记账（只记一次不被破坏）
        let store = Arc::new(FailingStore::default());
        let ledger = PointsLedger::new(store.clone(), "user_1");
        ledger.initialize().await.unwrap();

        store.fail_set.store(true, Ordering::SeqCst);
        let result = ledger.credit_points("v1", 10).await;
        assert!(result.is_err());
        assert!(!ledger.has_credited("v1").await);
        assert_eq!(ledger.total_points().await, 0);

        // 存储恢复后重试成功
        store.fail_set.store(false, Ordering::SeqCst);
        let total = ledger.credit_points("v1", 10).await.unwrap();
        assert_eq!(total, 10);
        assert!(ledger.has_credited("v1").await);
    }

    #[tokio::test]
    async fn test_ledger_survives_restart() {
        // 模拟重启：同一存储上重建台账实例，记账集合与总分都还在
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());

        let ledger = PointsLedger::new(store.clone(), "user_1");
        ledger.initialize().await.unwrap();
        ledger.credit_points("v1", 10).await.unwrap();
        ledger.credit_points("v2", 7).await.unwrap();

        let reborn = PointsLedger::new(store.clone(), "user_1");
        reborn.initialize().await.unwrap();
        assert_eq!(reborn.total_points().await, 17);
        assert!(reborn.has_credited("v1").await);

        // 重启后重放完成事件也不会重复加分
        let total = reborn.credit_points("v1", 10).await.unwrap();
        assert_eq!(total, 17);
    }

    #[tokio::test]
    async fn test_reset_all_clears_and_persists() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let ledger = PointsLedger::new(store.clone(), "user_1");
        ledger.initialize().await.unwrap();
        ledger.credit_points("v1", 10).await.unwrap();

        ledger.reset_all().await.unwrap();
        assert_eq!(ledger.total_points().await, 0);
        assert!(!ledger.has_credited("v1").await);

        // 清空也持久化了：重建实例后仍是空账
        let reborn = PointsLedger::new(store, "user_1");
        reborn.initialize().await.unwrap();
        assert_eq!(reborn.total_points().await, 0);
        // 清空后允许重新记账
        assert_eq!(reborn.credit_points("v1", 10).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_ledgers_are_isolated_per_user() {
        // 不同用户的台账互不可见（显式实例，没有全局单例）
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());

        let ledger_a = PointsLedger::new(store.clone(), "user_a");
        let ledger_b = PointsLedger::new(store.clone(), "user_b");
        ledger_a.initialize().await.unwrap();
        ledger_b.initialize().await.unwrap();

        ledger_a.credit_points("v1", 10).await.unwrap();

        assert!(!ledger_b.has_credited("v1").await);
        assert_eq!(ledger_b.total_points().await, 0);
        assert_eq!(ledger_b.credit_points("v1", 10).await.unwrap(), 10);
        assert_eq!(ledger_a.total_points().await, 10);
    }
}
