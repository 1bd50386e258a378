// ==========================================
// 志愿者配对系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: 引擎只处理内存集合，写入由 API 层在事务中完成
// ==========================================
// 依赖顺序: clusterer → group_builder → compatibility → pairer
//           → assigner → attendance → finalizer
// ==========================================

pub mod assigner;
pub mod attendance;
pub mod clusterer;
pub mod compatibility;
pub mod error;
pub mod finalizer;
pub mod group_builder;
pub mod invariants;
pub mod pairer;

// 重导出核心引擎
pub use assigner::{committed_pair_for_group, pair_usage, Assigner, PlanningSession, StagedAssignment};
pub use attendance::{AttendancePolicy, AttendanceResolver, PairAttendance, ReplacementPlan};
pub use clusterer::{ClusterResult, LocationCluster, LocationClusterer, DEFAULT_MAX_DISTANCE_KM};
pub use compatibility::{
    CompatibilityScorer, ExactSetMatcher, GroupScore, OverlapMatcher, PairScore,
    SubstringOverlapMatcher,
};
pub use error::{EngineError, EngineResult};
pub use finalizer::{FinalizationPlan, Finalizer};
pub use group_builder::{GroupBuilder, UNNAMED_LOCATION_LABEL};
pub use invariants::InvariantViolation;
pub use pairer::{AutoPairResult, Pairer, UnpairedMember};
