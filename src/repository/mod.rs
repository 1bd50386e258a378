// ==========================================
// 志愿者配对系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化且按 project_id 过滤
// 约束: 每个写入方法自带事务，并在同一事务内写入操作日志
// ==========================================

pub mod action_log_repo;
pub mod assignment_repo;
pub mod client_repo;
mod codec;
pub mod error;
pub mod group_repo;
pub mod pair_repo;
pub mod project_repo;
pub mod volunteer_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use assignment_repo::AssignmentRepository;
pub use client_repo::ClientRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use group_repo::GroupRepository;
pub use pair_repo::PairRepository;
pub use project_repo::{FinalizationWriteSummary, ProjectRepository};
pub use volunteer_repo::VolunteerRepository;
