// ==========================================
// 志愿者配对系统 - 项目领域模型
// ==========================================
// 职责: 租户根；finalized_at 非空即锁定全部规划数据
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub finalized_at: Option<NaiveDateTime>,
}

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            project_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: chrono::Local::now().naive_local(),
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}
