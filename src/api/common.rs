// ==========================================
// 志愿者配对系统 - API 公共设施
// ==========================================
// 职责: 写操作闸门（参数校验 → 项目锁 → 项目存在 → 未最终确认）
// 职责: 破坏性操作确认
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::app::project_lock::ProjectLocks;
use crate::domain::project::Project;
use crate::repository::project_repo::ProjectRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 批量删除结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteSummary {
    pub count: usize,
}

/// 写操作闸门
pub struct ProjectGate {
    locks: Arc<ProjectLocks>,
    project_repo: Arc<ProjectRepository>,
}

impl ProjectGate {
    pub fn new(locks: Arc<ProjectLocks>, project_repo: Arc<ProjectRepository>) -> Self {
        Self {
            locks,
            project_repo,
        }
    }

    /// 读取项目（不加锁）
    pub fn load_project(&self, project_id: &str) -> ApiResult<Project> {
        require_non_empty(project_id, "项目ID")?;
        self.project_repo
            .find_by_id(project_id)?
            .ok_or_else(|| ApiError::NotFound(format!("项目{}不存在", project_id)))
    }

    /// 未最终确认的项目（不加锁）
    pub fn load_open_project(&self, project_id: &str) -> ApiResult<Project> {
        let project = self.load_project(project_id)?;
        if project.is_finalized() {
            return Err(ApiError::ProjectFinalized(project_id.to_string()));
        }
        Ok(project)
    }

    /// 持有项目锁执行写操作
    ///
    /// # 校验
    /// - 项目ID与操作人非空
    /// - 项目存在且未最终确认（在锁内检查）
    pub fn mutate<T>(
        &self,
        project_id: &str,
        actor: &str,
        f: impl FnOnce(&Project) -> ApiResult<T>,
    ) -> ApiResult<T> {
        require_non_empty(project_id, "项目ID")?;
        require_non_empty(actor, "操作人")?;
        self.locks.with_lock(project_id, || {
            let project = self.load_open_project(project_id)?;
            f(&project)
        })
    }
}

pub fn require_non_empty(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}

/// 破坏性操作必须显式确认
pub fn require_confirmation(confirm: bool, operation: &str) -> ApiResult<()> {
    if !confirm {
        return Err(ApiError::ConfirmationRequired(operation.to_string()));
    }
    Ok(())
}
