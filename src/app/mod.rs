// ==========================================
// 志愿者配对系统 - 应用层
// ==========================================
// 职责: 组装共享连接、仓储与 API，提供项目级写锁
// ==========================================

pub mod project_lock;
pub mod state;

// 重导出
pub use project_lock::{ProjectLockError, ProjectLocks};
pub use state::{get_default_db_path, AppState};
