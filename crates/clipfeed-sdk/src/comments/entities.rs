//! 评论数据实体
//!
//! 评论构成两级树：顶层评论 + 平铺的回复列表，回复下面不再嵌套。
//! 内存中的面板状态归评论同步引擎独占，远端文档库持有权威副本。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 评论作者信息（随评论文档冗余下发，渲染时不用再查用户文档）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    /// 用户ID
    pub id: String,
    /// 展示名
    pub username: String,
    /// 头像引用（可选）
    pub avatar: Option<String>,
    /// 是否认证账号
    pub verified: bool,
}

/// 评论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// 评论ID（提交中为 local- 前缀的临时 ID，确认后替换为服务端 ID）
    pub id: String,
    /// 评论内容
    pub text: String,
    /// 作者信息
    pub author: CommentAuthor,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
    /// 点赞数
    pub like_count: u64,
    /// 当前用户是否点过赞
    pub liked_by_me: bool,
    /// 回复列表（两级树的第二级，平铺）
    pub replies: Vec<Comment>,
}

impl Comment {
    /// 本条评论携带的节点数（自身 + 回复）
    pub fn node_count(&self) -> u64 {
        1 + self.replies.len() as u64
    }
}

/// 从面板状态中摘除的评论
#[derive(Debug, Clone)]
pub(crate) struct RemovedComment {
    #[allow(dead_code)]
    pub comment: Comment,
    /// 是否是回复（回复与顶层评论只会命中其一）
    pub was_reply: bool,
    /// 离开树的节点数（顶层评论会带走自己的回复）
    pub nodes_removed: u64,
}

/// 单个视频的评论面板状态（内存态，随面板开关而生灭，从不持久化）
#[derive(Debug, Clone, Default)]
pub struct CommentPanelState {
    /// 评论树，顶层按创建时间倒序
    pub comments: Vec<Comment>,
    /// 节点总数（顶层 + 回复）
    pub count: u64,
    /// 是否有整体刷新在途
    pub loading: bool,
    /// 删除确认在途的评论ID
    pub pending_deletes: HashSet<String>,
    /// 点赞确认在途的评论ID
    pub pending_likes: HashSet<String>,
    /// 加载代数：只有最新一次 load 的结果会被提交，旧结果直接丢弃
    pub(crate) load_generation: u64,
}

impl CommentPanelState {
    /// 在顶层和回复里查找评论（只读）
    pub fn find_comment(&self, comment_id: &str) -> Option<&Comment> {
        for comment in &self.comments {
            if comment.id == comment_id {
                return Some(comment);
            }
            for reply in &comment.replies {
                if reply.id == comment_id {
                    return Some(reply);
                }
            }
        }
        None
    }

    /// 在顶层和回复里查找评论（可变）
    pub(crate) fn find_comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        for comment in &mut self.comments {
            if comment.id == comment_id {
                return Some(comment);
            }
            for reply in &mut comment.replies {
                if reply.id == comment_id {
                    return Some(reply);
                }
            }
        }
        None
    }

    /// 摘除一条评论：顶层和回复两条路径只会走其一
    pub(crate) fn remove_comment(&mut self, comment_id: &str) -> Option<RemovedComment> {
        if let Some(index) = self.comments.iter().position(|c| c.id == comment_id) {
            let comment = self.comments.remove(index);
            let nodes_removed = comment.node_count();
            return Some(RemovedComment {
                comment,
                was_reply: false,
                nodes_removed,
            });
        }

        for parent in &mut self.comments {
            if let Some(index) = parent.replies.iter().position(|r| r.id == comment_id) {
                let comment = parent.replies.remove(index);
                return Some(RemovedComment {
                    comment,
                    was_reply: true,
                    nodes_removed: 1,
                });
            }
        }

        None
    }

    /// 树中的节点总数（顶层 + 回复）
    pub fn derived_count(&self) -> u64 {
        self.comments.iter().map(Comment::node_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(id: &str) -> CommentAuthor {
        CommentAuthor {
            id: id.to_string(),
            username: format!("user-{}", id),
            avatar: None,
            verified: false,
        }
    }

    fn comment(id: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            id: id.to_string(),
            text: "hello".to_string(),
            author: author("u1"),
            created_at: 0,
            like_count: 0,
            liked_by_me: false,
            replies,
        }
    }

    #[test]
    fn test_find_comment_in_both_levels() {
        let mut state = CommentPanelState::default();
        state.comments = vec![comment("c1", vec![comment("r1", vec![])])];

        assert!(state.find_comment("c1").is_some());
        assert!(state.find_comment("r1").is_some());
        assert!(state.find_comment("missing").is_none());
    }

    #[test]
    fn test_remove_top_level_takes_replies_along() {
        let mut state = CommentPanelState::default();
        state.comments = vec![
            comment("c1", vec![comment("r1", vec![]), comment("r2", vec![])]),
            comment("c2", vec![]),
        ];
        state.count = state.derived_count();
        assert_eq!(state.count, 4);

        let removed = state.remove_comment("c1").unwrap();
        assert!(!removed.was_reply);
        assert_eq!(removed.nodes_removed, 3);
        assert_eq!(state.derived_count(), 1);
    }

    #[test]
    fn test_remove_reply_leaves_siblings_untouched() {
        let mut state = CommentPanelState::default();
        state.comments = vec![comment(
            "c1",
            vec![comment("r1", vec![]), comment("r2", vec![])],
        )];

        let removed = state.remove_comment("r1").unwrap();
        assert!(removed.was_reply);
        assert_eq!(removed.nodes_removed, 1);

        let parent = state.find_comment("c1").unwrap();
        assert_eq!(parent.replies.len(), 1);
        assert_eq!(parent.replies[0].id, "r2");
    }
}
