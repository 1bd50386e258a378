// ==========================================
// 志愿者配对系统 - 客户组领域模型
// ==========================================
// 对齐: client_group / client_group_member 表
// 红线: 必须客户 1..=3, 可选客户 0..=2, 合计 ≤ 5
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 必须客户上限
pub const MAX_MANDATORY_CLIENTS: usize = 3;
/// 可选客户上限
pub const MAX_OPTIONAL_CLIENTS: usize = 2;

// ==========================================
// GroupCapacity - 组容量约束
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCapacity {
    pub max_mandatory: usize,
    pub max_optional: usize,
}

impl GroupCapacity {
    /// 创建容量约束（超过系统上限的配置会被截断）
    pub fn new(max_mandatory: usize, max_optional: usize) -> Self {
        Self {
            max_mandatory: max_mandatory.clamp(1, MAX_MANDATORY_CLIENTS),
            max_optional: max_optional.min(MAX_OPTIONAL_CLIENTS),
        }
    }

    pub fn max_total(&self) -> usize {
        self.max_mandatory + self.max_optional
    }
}

impl Default for GroupCapacity {
    fn default() -> Self {
        Self::new(MAX_MANDATORY_CLIENTS, MAX_OPTIONAL_CLIENTS)
    }
}

// ==========================================
// ClientGroup - 客户组
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientGroup {
    pub group_id: String,
    pub project_id: String,
    pub name: String,
    pub location: String,

    pub mandatory_clients: Vec<String>, // 客户ID，保持顺序
    pub optional_clients: Vec<String>,  // 客户ID，保持顺序

    pub is_auto: bool, // 自动生成 / 人工维护
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ClientGroup {
    pub fn new(
        project_id: &str,
        name: &str,
        location: &str,
        mandatory_clients: Vec<String>,
        optional_clients: Vec<String>,
        is_auto: bool,
    ) -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            group_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            mandatory_clients,
            optional_clients,
            is_auto,
            created_at: now,
            updated_at: now,
        }
    }

    /// 全部客户ID（必须在前，可选在后）
    pub fn client_ids(&self) -> impl Iterator<Item = &String> {
        self.mandatory_clients.iter().chain(self.optional_clients.iter())
    }

    pub fn total_clients(&self) -> usize {
        self.mandatory_clients.len() + self.optional_clients.len()
    }

    pub fn contains_client(&self, client_id: &str) -> bool {
        self.client_ids().any(|id| id == client_id)
    }
}

// ==========================================
// GroupMembershipRequest - 人工建组/编辑请求
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMembershipRequest {
    pub name: String,
    pub location: Option<String>,
    pub mandatory_clients: Vec<String>,
    pub optional_clients: Vec<String>,
}
