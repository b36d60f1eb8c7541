//! 乐观变更的统一修复计划
//!
//! 每个评论变更在发起远端调用之前就确定好失败时的修复方式，
//! 失败路径由引擎统一执行，不在各调用点各写一套回滚逻辑。

/// 远端失败（传输错误或明确拒绝）后的本地修复方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairPlan {
    /// 按本地 ID 撤掉临时评论（提交失败的逆操作）
    RemoveProvisional { local_id: String },
    /// 丢弃本地乐观视图，整体重拉远端状态
    ///
    /// 点赞/删除走这条路：低价值高频操作，过期状态用一次重拉修复
    /// 比逐字段修补更可靠。
    Refetch,
}
