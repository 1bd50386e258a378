// ==========================================
// 志愿者配对系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把仓储/引擎/地理编码错误转换为用户可读的错误
// 约束: 所有错误信息必须包含显式原因
// ==========================================

use crate::app::project_lock::ProjectLockError;
use crate::engine::error::EngineError;
use crate::engine::invariants::InvariantViolation;
use crate::geocoding::oracle::GeocodeError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 同组暂存分歧、并发修改、唯一约束
    #[error("冲突: {0}")]
    Conflict(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("项目已最终确认，禁止修改: project_id={0}")]
    ProjectFinalized(String),

    #[error("破坏性操作需要显式确认: {0}")]
    ConfirmationRequired(String),

    // ==========================================
    // 外部依赖错误
    // ==========================================
    #[error("外部服务不可用: {0}")]
    ExternalDependency(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::Conflict(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation { reason } => ApiError::ValidationError(reason),
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            EngineError::Conflict { group_id, reason } => {
                ApiError::Conflict(format!("group_id={}: {}", group_id, reason))
            }
            EngineError::Invariant(v) => ApiError::BusinessRuleViolation(v.to_string()),
        }
    }
}

impl From<InvariantViolation> for ApiError {
    fn from(err: InvariantViolation) -> Self {
        ApiError::BusinessRuleViolation(err.to_string())
    }
}

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        ApiError::ExternalDependency(err.to_string())
    }
}

impl From<ProjectLockError> for ApiError {
    fn from(err: ProjectLockError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
