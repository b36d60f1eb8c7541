//! KV 存储模块 - 基于 sled 的本地持久层
//!
//! 本模块提供：
//! - 进程重启后仍然存活的键值存储
//! - 用户隔离的命名空间（每个用户一棵独立的 Tree）
//! - 面向积分台账的窄接口 `DurableStore`，方便注入内存实现做测试

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Db, Tree};
use tokio::sync::RwLock;

use crate::error::{ClipfeedSDKError, Result};

/// 本地持久存储的窄接口
///
/// 积分台账只依赖 get/set/remove 三个原语；写入在返回前必须已落盘，
/// 否则"事件重试 + 内存已变更"会破坏只记一次的保证。
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 读取键值，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入键值，成功返回前必须保证已持久化
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 删除键值
    async fn remove(&self, key: &str) -> Result<()>;
}

/// KV 存储组件（生产实现）
#[derive(Debug)]
pub struct SledStore {
    #[allow(dead_code)]
    base_path: PathBuf,
    /// 主数据库实例
    db: Arc<Db>,
    /// 用户专属的 Tree 实例
    user_trees: Arc<RwLock<HashMap<String, Tree>>>,
    /// 当前用户ID
    current_user: Arc<RwLock<Option<String>>>,
}

impl SledStore {
    /// 创建新的 KV 存储实例
    pub async fn new(base_path: &Path) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| ClipfeedSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 打开 sled 数据库（切换账号后旧实例可能刚释放锁，重试多次带退避）
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            ClipfeedSDKError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        Ok(Self {
            base_path,
            db: Arc::new(db),
            user_trees: Arc::new(RwLock::new(HashMap::new())),
            current_user: Arc::new(RwLock::new(None)),
        })
    }

    /// 初始化用户 Tree
    pub async fn init_user_tree(&self, uid: &str) -> Result<()> {
        let tree_name = format!("user_{}", uid);
        let tree = self
            .db
            .open_tree(&tree_name)
            .map_err(|e| ClipfeedSDKError::KvStore(format!("打开用户 Tree 失败: {}", e)))?;

        let mut user_trees = self.user_trees.write().await;
        user_trees.insert(uid.to_string(), tree);

        tracing::info!("用户 KV Tree 初始化完成: {}", uid);

        Ok(())
    }

    /// 切换用户
    pub async fn switch_user(&self, uid: &str) -> Result<()> {
        // 如果用户 Tree 不存在，先初始化
        let user_trees = self.user_trees.read().await;
        if !user_trees.contains_key(uid) {
            drop(user_trees);
            self.init_user_tree(uid).await?;
        }

        // 更新当前用户
        let mut current_user = self.current_user.write().await;
        *current_user = Some(uid.to_string());

        Ok(())
    }

    /// 清理用户数据
    pub async fn cleanup_user_data(&self, uid: &str) -> Result<()> {
        let mut user_trees = self.user_trees.write().await;
        user_trees.remove(uid);

        let tree_name = format!("user_{}", uid);
        self.db
            .drop_tree(&tree_name)
            .map_err(|e| ClipfeedSDKError::KvStore(format!("删除用户 Tree 失败: {}", e)))?;

        Ok(())
    }

    /// 获取当前用户的 Tree
    async fn get_current_tree(&self) -> Result<Tree> {
        let current_user = self.current_user.read().await;
        let uid = current_user
            .as_ref()
            .ok_or_else(|| ClipfeedSDKError::NotInitialized("尚未切换到任何用户".to_string()))?;

        let user_trees = self.user_trees.read().await;
        let tree = user_trees
            .get(uid)
            .ok_or_else(|| ClipfeedSDKError::KvStore("用户 Tree 不存在".to_string()))?;

        Ok(tree.clone())
    }
}

#[async_trait]
impl DurableStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let tree = self.get_current_tree().await?;

        let result = tree
            .get(key)
            .map_err(|e| ClipfeedSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = String::from_utf8(value_bytes.to_vec()).map_err(|e| {
                    ClipfeedSDKError::Serialization(format!("键值不是合法 UTF-8: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let tree = self.get_current_tree().await?;

        tree.insert(key, value.as_bytes())
            .map_err(|e| ClipfeedSDKError::KvStore(format!("设置键值对失败: {}", e)))?;

        // 写入必须在返回前落盘：台账的只记一次保证依赖这一点
        tree.flush_async()
            .await
            .map_err(|e| ClipfeedSDKError::KvStore(format!("刷盘失败: {}", e)))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let tree = self.get_current_tree().await?;

        tree.remove(key)
            .map_err(|e| ClipfeedSDKError::KvStore(format!("删除键值对失败: {}", e)))?;

        tree.flush_async()
            .await
            .map_err(|e| ClipfeedSDKError::KvStore(format!("刷盘失败: {}", e)))?;

        Ok(())
    }
}

/// 内存实现，用于测试和模拟器场景
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// 常用的键前缀常量
pub mod keys {
    /// 积分台账前缀
    pub const POINTS_LEDGER: &str = "points_ledger_";
}
