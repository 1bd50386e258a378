// ==========================================
// 志愿者配对系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (人工最终确认)
// 流程: 导入名单 → 客户分组 → 志愿者配对 → 分配 → 出勤替补 → 最终确认
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 地理编码 - 外部服务
pub mod geocoding;

// 配置层 - 项目配置
pub mod config;

// 数据库基础设施（连接初始化/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务用例
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AssignmentStatus, AttendanceState, ClientTier, ClusterMode, VolunteerStatus,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Assignment, Client, ClientGroup, GeoPoint, GroupCapacity,
    GroupMembershipRequest, Project, Replacement, Volunteer, VolunteerPair,
};

// 引擎
pub use engine::{
    Assigner, AttendanceResolver, CompatibilityScorer, Finalizer, GroupBuilder,
    LocationClusterer, Pairer, PlanningSession, ReplacementPlan,
};

// API
pub use api::{ApiError, ApiResult};
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 包名（用于外部服务标识）
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

// 系统名称
pub const APP_NAME: &str = "志愿者配对系统";
