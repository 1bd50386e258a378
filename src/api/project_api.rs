// ==========================================
// 志愿者配对系统 - 项目与名单 API
// ==========================================
// 职责: 项目创建、客户/志愿者导入、出勤登记、批量清除、项目配置
// 说明: 导入解析由外部完成，这里接收规范化记录
// ==========================================

use std::sync::Arc;

use serde_json::json;

use crate::api::common::{require_confirmation, require_non_empty, BulkDeleteSummary, ProjectGate};
use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::client::Client;
use crate::domain::project::Project;
use crate::domain::types::AttendanceState;
use crate::domain::volunteer::Volunteer;
use crate::repository::{
    ActionLogRepository, ClientRepository, ProjectRepository, VolunteerRepository,
};

pub struct ProjectApi {
    gate: Arc<ProjectGate>,
    project_repo: Arc<ProjectRepository>,
    client_repo: Arc<ClientRepository>,
    volunteer_repo: Arc<VolunteerRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
}

impl ProjectApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        project_repo: Arc<ProjectRepository>,
        client_repo: Arc<ClientRepository>,
        volunteer_repo: Arc<VolunteerRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            gate,
            project_repo,
            client_repo,
            volunteer_repo,
            action_log_repo,
            config_manager,
        }
    }

    // ==========================================
    // 项目
    // ==========================================

    pub fn create_project(&self, name: &str) -> ApiResult<Project> {
        require_non_empty(name, "项目名称")?;
        let project = Project::new(name.trim());
        self.project_repo.insert(&project)?;
        tracing::info!(project_id = %project.project_id, name = %project.name, "项目已创建");
        Ok(project)
    }

    pub fn get_project(&self, project_id: &str) -> ApiResult<Project> {
        self.gate.load_project(project_id)
    }

    pub fn list_projects(&self) -> ApiResult<Vec<Project>> {
        Ok(self.project_repo.list()?)
    }

    // ==========================================
    // 名单导入
    // ==========================================

    /// 导入客户（upsert）
    pub fn import_clients(&self, project_id: &str, clients: Vec<Client>, actor: &str) -> ApiResult<usize> {
        for c in &clients {
            if c.project_id != project_id {
                return Err(ApiError::InvalidInput(format!(
                    "客户{}不属于项目{}",
                    c.client_id, project_id
                )));
            }
            require_non_empty(&c.name, "客户姓名")?;
            require_non_empty(&c.location, "客户区域")?;
        }

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::ImportClients,
                actor,
                Some(json!({ "count": clients.len() })),
                None,
            );
            let count = self.client_repo.upsert_batch(&clients, &log)?;
            tracing::info!(project_id, count, "客户导入完成");
            Ok(count)
        })
    }

    /// 导入志愿者（upsert）
    pub fn import_volunteers(
        &self,
        project_id: &str,
        volunteers: Vec<Volunteer>,
        actor: &str,
    ) -> ApiResult<usize> {
        for v in &volunteers {
            if v.project_id != project_id {
                return Err(ApiError::InvalidInput(format!(
                    "志愿者{}不属于项目{}",
                    v.volunteer_id, project_id
                )));
            }
            require_non_empty(&v.name, "志愿者姓名")?;
        }

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::ImportVolunteers,
                actor,
                Some(json!({ "count": volunteers.len() })),
                None,
            );
            let count = self.volunteer_repo.upsert_batch(&volunteers, &log)?;
            tracing::info!(project_id, count, "志愿者导入完成");
            Ok(count)
        })
    }

    pub fn list_clients(&self, project_id: &str) -> ApiResult<Vec<Client>> {
        self.gate.load_project(project_id)?;
        Ok(self.client_repo.find_by_project(project_id)?)
    }

    pub fn list_volunteers(&self, project_id: &str) -> ApiResult<Vec<Volunteer>> {
        self.gate.load_project(project_id)?;
        Ok(self.volunteer_repo.find_by_project(project_id)?)
    }

    /// 登记培训出勤
    pub fn record_attendance(
        &self,
        project_id: &str,
        volunteer_id: &str,
        state: AttendanceState,
        actor: &str,
    ) -> ApiResult<()> {
        require_non_empty(volunteer_id, "志愿者ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::RecordAttendance,
                actor,
                Some(json!({ "volunteer_id": volunteer_id, "state": state.to_db_str() })),
                None,
            );
            self.volunteer_repo
                .update_attendance(project_id, volunteer_id, state, &log)?;
            Ok(())
        })
    }

    // ==========================================
    // 批量清除（需显式确认）
    // ==========================================

    /// 删除全部客户（连带客户组与分配）
    pub fn remove_all_clients(
        &self,
        project_id: &str,
        confirm: bool,
        actor: &str,
    ) -> ApiResult<BulkDeleteSummary> {
        require_confirmation(confirm, "删除项目内全部客户")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::RemoveAllClients,
                actor,
                None,
                Some("删除全部客户".to_string()),
            );
            let count = self.client_repo.delete_all(project_id, &log)?;
            tracing::info!(project_id, count, "全部客户已删除");
            Ok(BulkDeleteSummary { count })
        })
    }

    /// 删除全部志愿者（连带配对与分配）
    pub fn clear_all_volunteers(
        &self,
        project_id: &str,
        confirm: bool,
        actor: &str,
    ) -> ApiResult<BulkDeleteSummary> {
        require_confirmation(confirm, "删除项目内全部志愿者")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::ClearAllVolunteers,
                actor,
                None,
                Some("删除全部志愿者".to_string()),
            );
            let count = self.volunteer_repo.delete_all(project_id, &log)?;
            tracing::info!(project_id, count, "全部志愿者已删除");
            Ok(BulkDeleteSummary { count })
        })
    }

    // ==========================================
    // 配置与审计
    // ==========================================

    pub fn set_config(&self, project_id: &str, key: &str, value: &str, actor: &str) -> ApiResult<()> {
        if !config_keys::ALL.contains(&key) {
            return Err(ApiError::InvalidInput(format!("未知配置项: {}", key)));
        }
        require_non_empty(value, "配置值")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::UpdateConfig,
                actor,
                Some(json!({ "key": key, "value": value })),
                None,
            );
            self.config_manager
                .set_config_value(project_id, key, value.trim(), &log)?;
            Ok(())
        })
    }

    pub fn get_config_snapshot(&self, project_id: &str) -> ApiResult<serde_json::Value> {
        self.gate.load_project(project_id)?;
        let raw = self.config_manager.get_config_snapshot(project_id)?;
        serde_json::from_str(&raw).map_err(|e| ApiError::InternalError(e.to_string()))
    }

    pub fn list_action_logs(&self, project_id: &str, limit: i32) -> ApiResult<Vec<ActionLog>> {
        self.gate.load_project(project_id)?;
        if limit <= 0 {
            return Err(ApiError::InvalidInput("limit必须为正数".to_string()));
        }
        Ok(self.action_log_repo.find_by_project(project_id, limit)?)
    }
}
