use std::fmt;

#[derive(Debug)]
pub enum ClipfeedSDKError {
    /// 输入校验失败（空文本、空 ID 等），在任何变更之前拒绝
    InvalidInput(String),
    /// 缺少用户身份（未登录 / 会话失效）
    NotAuthenticated(String),
    /// 无权限执行该操作（如删除他人评论），与校验错误区分开，UI 据此展示权限提示
    NotAuthorized(String),
    /// 本地 KV 存储错误
    KvStore(String),
    /// 序列化/反序列化错误
    Serialization(String),
    IO(String),
    /// 远端文档库传输错误（网络/数据库异常）
    Remote(String),
    /// 远端明确拒绝了本次变更（非传输错误，不可与空响应混淆）
    RemoteRejected(String),
    NotFound(String),
    InvalidOperation(String),
    /// 组件尚未初始化（台账未 initialize、面板未 open）
    NotInitialized(String),
    /// 评论面板正在整体刷新，本次乐观变更被丢弃
    RefreshInFlight(String),
}

impl fmt::Display for ClipfeedSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipfeedSDKError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            ClipfeedSDKError::NotAuthenticated(e) => write!(f, "Not authenticated: {}", e),
            ClipfeedSDKError::NotAuthorized(e) => write!(f, "Not authorized: {}", e),
            ClipfeedSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            ClipfeedSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ClipfeedSDKError::IO(e) => write!(f, "IO error: {}", e),
            ClipfeedSDKError::Remote(e) => write!(f, "Remote store error: {}", e),
            ClipfeedSDKError::RemoteRejected(e) => write!(f, "Remote store rejected: {}", e),
            ClipfeedSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            ClipfeedSDKError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            ClipfeedSDKError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            ClipfeedSDKError::RefreshInFlight(e) => write!(f, "Refresh in flight: {}", e),
        }
    }
}

impl std::error::Error for ClipfeedSDKError {}

impl From<serde_json::Error> for ClipfeedSDKError {
    fn from(error: serde_json::Error) -> Self {
        ClipfeedSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for ClipfeedSDKError {
    fn from(error: std::io::Error) -> Self {
        ClipfeedSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for ClipfeedSDKError {
    fn from(error: sled::Error) -> Self {
        ClipfeedSDKError::KvStore(error.to_string())
    }
}

impl ClipfeedSDKError {
    /// 判断是否是远端失败（传输错误或明确拒绝），UI 据此走"回弹"提示路径
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            ClipfeedSDKError::Remote(_) | ClipfeedSDKError::RemoteRejected(_)
        )
    }

    /// 判断是否是权限类失败
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, ClipfeedSDKError::NotAuthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, ClipfeedSDKError>;
