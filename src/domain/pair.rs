// ==========================================
// 志愿者配对系统 - 志愿者配对领域模型
// ==========================================
// 对齐: volunteer_pair / assignment 表
// 红线: 一名志愿者同时最多属于一个有效配对
// 红线: 每个客户同时最多一条分配记录
// ==========================================

use crate::domain::types::AssignmentStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// VolunteerPair - 志愿者配对
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerPair {
    pub pair_id: String,
    pub project_id: String,
    pub volunteer1_id: String, // 无序
    pub volunteer2_id: String,
    pub compatibility_score: f64, // 取值 {0, 0.5, 1.0}
    pub is_manual: bool,
    pub created_at: NaiveDateTime,
}

impl VolunteerPair {
    pub fn new(
        project_id: &str,
        volunteer1_id: &str,
        volunteer2_id: &str,
        compatibility_score: f64,
        is_manual: bool,
    ) -> Self {
        Self {
            pair_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            volunteer1_id: volunteer1_id.to_string(),
            volunteer2_id: volunteer2_id.to_string(),
            compatibility_score,
            is_manual,
            created_at: chrono::Local::now().naive_local(),
        }
    }

    pub fn members(&self) -> [&str; 2] {
        [self.volunteer1_id.as_str(), self.volunteer2_id.as_str()]
    }

    pub fn contains(&self, volunteer_id: &str) -> bool {
        self.volunteer1_id == volunteer_id || self.volunteer2_id == volunteer_id
    }

    /// 另一名成员
    pub fn partner_of(&self, volunteer_id: &str) -> Option<&str> {
        if self.volunteer1_id == volunteer_id {
            Some(&self.volunteer2_id)
        } else if self.volunteer2_id == volunteer_id {
            Some(&self.volunteer1_id)
        } else {
            None
        }
    }
}

// ==========================================
// Assignment - 客户分配（客户 → 配对）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub project_id: String,
    pub client_id: String,
    pub group_id: String,
    pub volunteer_pair_id: String,

    // ===== 匹配度（同组共享） =====
    pub language_match: bool,
    pub region_match: bool,
    pub language_match_pct: f64,
    pub region_match_pct: f64,
    pub confidence: f64,

    pub status: AssignmentStatus,
    pub assigned_at: NaiveDateTime,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

// ==========================================
// Replacement - 缺席替补
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replacement {
    pub pair_id: String,
    pub absent_volunteer_id: String,
    pub substitute_volunteer_id: String,
}
