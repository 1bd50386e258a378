// ==========================================
// 志愿者配对系统 - API 层
// ==========================================
// 职责: 提供业务用例接口（校验 → 项目锁 → 引擎 → 单事务落库）
// 说明: 操作人由外部鉴权方提供，这里只记录
// ==========================================

pub mod assignment_api;
pub mod common;
pub mod error;
pub mod finalize_api;
pub mod geocode_api;
pub mod group_api;
pub mod pair_api;
pub mod project_api;

// 重导出核心类型
pub use assignment_api::{AssignmentApi, AssignmentSummary, CommitReport, GroupCommitOutcome};
pub use common::{BulkDeleteSummary, ProjectGate};
pub use error::{ApiError, ApiResult};
pub use finalize_api::{FinalizationSummary, FinalizeApi};
pub use geocode_api::GeocodeApi;
pub use group_api::{AutoBuildReport, GroupApi, GroupEditSummary};
pub use pair_api::{PairApi, PairDeleteSummary};
pub use project_api::ProjectApi;
