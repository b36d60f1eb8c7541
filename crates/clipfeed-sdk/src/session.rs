//! 用户会话
//!
//! 身份由外部认证方提供并保持稳定，本核心只读不改。

use serde::{Deserialize, Serialize};

use crate::comments::entities::CommentAuthor;

/// 当前登录用户的会话信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// 用户ID（认证方保证稳定）
    pub user_id: String,
    /// 展示名
    pub username: String,
    /// 头像引用（可选）
    pub avatar: Option<String>,
    /// 是否认证账号
    pub verified: bool,
}

impl UserSession {
    /// 以当前会话身份构造评论作者信息（临时评论立即可渲染）
    pub(crate) fn as_comment_author(&self) -> CommentAuthor {
        CommentAuthor {
            id: self.user_id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            verified: self.verified,
        }
    }
}
