// ==========================================
// 志愿者配对系统 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录
// 用途: 审计追踪
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub project_id: String,
    pub action_type: String,      // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime, // 操作时间戳
    pub actor: String,            // 操作人（由鉴权方提供）

    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

impl ActionLog {
    pub fn new(
        project_id: &str,
        action_type: ActionType,
        actor: &str,
        payload_json: Option<JsonValue>,
        detail: Option<String>,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.to_string(),
            payload_json,
            detail,
        }
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    AutoBuildGroups,     // 自动建组
    CreateGroup,         // 人工建组
    EditGroup,           // 编辑组
    DeleteGroup,         // 删除组
    DeleteAllGroups,     // 批量删除组
    RemoveAllClients,    // 批量删除客户
    ClearAllVolunteers,  // 批量删除志愿者
    CreatePair,          // 人工配对
    AutoPair,            // 自动组队配对
    DeletePair,          // 删除配对
    AssignPair,          // 分配配对到组
    CommitAssignments,   // 提交暂存分配
    RemoveAssignment,    // 移除分配
    Finalize,            // 最终确认
    ImportClients,       // 导入客户
    ImportVolunteers,    // 导入志愿者
    GeocodeClients,      // 地理编码
    RecordAttendance,    // 登记培训出勤
    UpdateConfig,        // 修改项目配置
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AutoBuildGroups => "AUTO_BUILD_GROUPS",
            ActionType::CreateGroup => "CREATE_GROUP",
            ActionType::EditGroup => "EDIT_GROUP",
            ActionType::DeleteGroup => "DELETE_GROUP",
            ActionType::DeleteAllGroups => "DELETE_ALL_GROUPS",
            ActionType::RemoveAllClients => "REMOVE_ALL_CLIENTS",
            ActionType::ClearAllVolunteers => "CLEAR_ALL_VOLUNTEERS",
            ActionType::CreatePair => "CREATE_PAIR",
            ActionType::AutoPair => "AUTO_PAIR",
            ActionType::DeletePair => "DELETE_PAIR",
            ActionType::AssignPair => "ASSIGN_PAIR",
            ActionType::CommitAssignments => "COMMIT_ASSIGNMENTS",
            ActionType::RemoveAssignment => "REMOVE_ASSIGNMENT",
            ActionType::Finalize => "FINALIZE",
            ActionType::ImportClients => "IMPORT_CLIENTS",
            ActionType::ImportVolunteers => "IMPORT_VOLUNTEERS",
            ActionType::GeocodeClients => "GEOCODE_CLIENTS",
            ActionType::RecordAttendance => "RECORD_ATTENDANCE",
            ActionType::UpdateConfig => "UPDATE_CONFIG",
        }
    }
}
