// ==========================================
// 志愿者配对系统 - 志愿者领域模型
// ==========================================
// 对齐: volunteer 表
// 红线: 只有 SELECTED 志愿者可参与配对
// ==========================================

use crate::domain::types::{AttendanceState, VolunteerStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// Volunteer - 志愿者
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    // ===== 主键 =====
    pub volunteer_id: String,
    pub project_id: String,

    // ===== 基本信息 =====
    pub name: String,
    pub email: Option<String>,
    pub languages: Vec<String>,
    pub regions: Vec<String>,
    pub available_days: Vec<String>,
    pub available_time: Option<String>,

    // ===== 组队报名 =====
    pub is_joining_as_group: bool,
    pub group_name: Option<String>,

    // ===== 外部派生 =====
    pub has_experience: bool, // 由导入方按历史项目数计算

    // ===== 状态 =====
    pub status: VolunteerStatus,
    pub selected_for_training: bool, // 仅 WAITLISTED 时有意义
    pub training_attended: AttendanceState,
}

impl Volunteer {
    pub fn new(project_id: &str, name: &str, status: VolunteerStatus) -> Self {
        Self {
            volunteer_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            email: None,
            languages: Vec::new(),
            regions: Vec::new(),
            available_days: Vec::new(),
            available_time: None,
            is_joining_as_group: false,
            group_name: None,
            has_experience: false,
            status,
            selected_for_training: false,
            training_attended: AttendanceState::Unknown,
        }
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_regions(mut self, regions: &[&str]) -> Self {
        self.regions = regions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn joining_group(mut self, group_name: &str) -> Self {
        self.is_joining_as_group = true;
        self.group_name = Some(group_name.to_string());
        self
    }

    pub fn with_attendance(mut self, state: AttendanceState) -> Self {
        self.training_attended = state;
        self
    }

    pub fn selected_for_training(mut self) -> Self {
        self.selected_for_training = true;
        self
    }

    pub fn is_selected(&self) -> bool {
        self.status == VolunteerStatus::Selected
    }

    /// 组队分桶键: 仅 is_joining_as_group 且组名非空时有效
    pub fn group_key(&self) -> Option<&str> {
        if !self.is_joining_as_group {
            return None;
        }
        self.group_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
