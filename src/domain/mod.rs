// ==========================================
// 志愿者配对系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod client;
pub mod group;
pub mod pair;
pub mod project;
pub mod types;
pub mod volunteer;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use client::{parse_delimited_list, Client, GeoPoint};
pub use group::{ClientGroup, GroupCapacity, GroupMembershipRequest};
pub use pair::{Assignment, Replacement, VolunteerPair};
pub use project::Project;
pub use types::{AssignmentStatus, AttendanceState, ClientTier, ClusterMode, VolunteerStatus};
pub use volunteer::Volunteer;
