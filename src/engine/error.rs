// ==========================================
// 志愿者配对系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约束: 引擎错误均发生在写入之前，状态不变
// ==========================================

use crate::engine::invariants::InvariantViolation;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 容量违规、重复配对、缺少名称等
    #[error("校验失败: {reason}")]
    Validation { reason: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// 同一客户组存在分歧的暂存分配
    #[error("分配冲突: group_id={group_id}, {reason}")]
    Conflict { group_id: String, reason: String },

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EngineError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
