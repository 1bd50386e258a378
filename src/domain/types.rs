// ==========================================
// 志愿者配对系统 - 领域类型定义
// ==========================================
// 职责: 状态枚举、聚类模式、数据库字符串映射
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 志愿者状态 (Volunteer Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolunteerStatus {
    Pending,    // 待定
    Selected,   // 已入选
    Waitlisted, // 候补
}

impl VolunteerStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            VolunteerStatus::Pending => "PENDING",
            VolunteerStatus::Selected => "SELECTED",
            VolunteerStatus::Waitlisted => "WAITLISTED",
        }
    }

    /// 从数据库字符串解析（未知值按 PENDING 处理）
    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SELECTED" => VolunteerStatus::Selected,
            "WAITLISTED" => VolunteerStatus::Waitlisted,
            _ => VolunteerStatus::Pending,
        }
    }
}

impl fmt::Display for VolunteerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 培训出勤状态 (Attendance State)
// ==========================================
// 说明: 区分"记录缺席"与"从未记录"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceState {
    Present, // 已出勤
    Absent,  // 记录缺席
    Unknown, // 未记录
}

impl AttendanceState {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AttendanceState::Present => "PRESENT",
            AttendanceState::Absent => "ABSENT",
            AttendanceState::Unknown => "UNKNOWN",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PRESENT" => AttendanceState::Present,
            "ABSENT" => AttendanceState::Absent,
            _ => AttendanceState::Unknown,
        }
    }

    /// 兼容旧的布尔出勤字段: true → PRESENT, false → ABSENT, 缺失 → UNKNOWN
    pub fn from_legacy_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => AttendanceState::Present,
            Some(false) => AttendanceState::Absent,
            None => AttendanceState::Unknown,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, AttendanceState::Present)
    }
}

impl fmt::Display for AttendanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 聚类模式 (Cluster Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterMode {
    Name, // 按区域名精确匹配
    Geo,  // 按地理距离
}

impl ClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMode::Name => "NAME",
            ClusterMode::Geo => "GEO",
        }
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClusterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NAME" => Ok(ClusterMode::Name),
            "GEO" => Ok(ClusterMode::Geo),
            other => Err(format!("未知聚类模式: {}", other)),
        }
    }
}

// ==========================================
// 组内客户层级 (Client Tier)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientTier {
    Mandatory, // 必须服务
    Optional,  // 尽力服务
}

impl ClientTier {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ClientTier::Mandatory => "MANDATORY",
            ClientTier::Optional => "OPTIONAL",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "OPTIONAL" => ClientTier::Optional,
            _ => ClientTier::Mandatory,
        }
    }
}

// ==========================================
// 分配状态 (Assignment Status)
// ==========================================
// NEEDS_REASSIGNMENT: 所属配对已删除，等待重新分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    NeedsReassignment,
}

impl AssignmentStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::NeedsReassignment => "NEEDS_REASSIGNMENT",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "NEEDS_REASSIGNMENT" => AssignmentStatus::NeedsReassignment,
            _ => AssignmentStatus::Active,
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volunteer_status_db_roundtrip_and_fallback() {
        assert_eq!(VolunteerStatus::from_db_str("selected"), VolunteerStatus::Selected);
        assert_eq!(VolunteerStatus::from_db_str(" WAITLISTED "), VolunteerStatus::Waitlisted);
        assert_eq!(VolunteerStatus::from_db_str("garbage"), VolunteerStatus::Pending);
    }

    #[test]
    fn test_attendance_legacy_flag_mapping() {
        assert_eq!(AttendanceState::from_legacy_flag(Some(true)), AttendanceState::Present);
        assert_eq!(AttendanceState::from_legacy_flag(Some(false)), AttendanceState::Absent);
        assert_eq!(AttendanceState::from_legacy_flag(None), AttendanceState::Unknown);
    }

    #[test]
    fn test_cluster_mode_parse() {
        assert_eq!("geo".parse::<ClusterMode>().unwrap(), ClusterMode::Geo);
        assert!("radius".parse::<ClusterMode>().is_err());
    }
}
