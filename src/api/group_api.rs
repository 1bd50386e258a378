// ==========================================
// 志愿者配对系统 - 客户组 API
// ==========================================
// 职责: 自动建组、人工建组/编辑/删除、未分组客户查询
// 流程: 校验 → 项目锁 → 读取 → 引擎计算 → 不变量守卫 → 单事务落库
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{require_confirmation, require_non_empty, BulkDeleteSummary, ProjectGate};
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::client::Client;
use crate::domain::group::{ClientGroup, GroupMembershipRequest};
use crate::domain::types::ClusterMode;
use crate::domain::pair::Assignment;
use crate::engine::invariants::{
    check_client_single_group, check_group_capacity, check_single_assignment_per_client,
};
use crate::engine::{
    committed_pair_for_group, Assigner, CompatibilityScorer, GroupBuilder, LocationClusterer,
};
use crate::repository::{
    AssignmentRepository, ClientRepository, GroupRepository, PairRepository, VolunteerRepository,
};

/// 自动建组结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBuildReport {
    pub mode: ClusterMode,
    pub groups: Vec<ClientGroup>,
    /// GEO 模式下缺少坐标、未参与建组的客户
    pub ungeocoded_client_ids: Vec<String>,
}

/// 编辑客户组结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEditSummary {
    pub group: ClientGroup,
    /// 未获得新分配而被释放的原分配数
    pub released_assignments: usize,
    /// 按新成员重算的分配数（组未提交配对时为 0）
    pub rebuilt_assignments: usize,
}

pub struct GroupApi {
    gate: Arc<ProjectGate>,
    client_repo: Arc<ClientRepository>,
    group_repo: Arc<GroupRepository>,
    volunteer_repo: Arc<VolunteerRepository>,
    pair_repo: Arc<PairRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    config_manager: Arc<ConfigManager>,
    scorer: CompatibilityScorer,
}

impl GroupApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        client_repo: Arc<ClientRepository>,
        group_repo: Arc<GroupRepository>,
        volunteer_repo: Arc<VolunteerRepository>,
        pair_repo: Arc<PairRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        config_manager: Arc<ConfigManager>,
        scorer: CompatibilityScorer,
    ) -> Self {
        Self {
            gate,
            client_repo,
            group_repo,
            volunteer_repo,
            pair_repo,
            assignment_repo,
            config_manager,
            scorer,
        }
    }

    /// 对未分组客户自动聚类建组
    ///
    /// # 参数
    /// - `mode`: 聚类模式；None 时使用项目配置
    pub fn auto_build_groups(
        &self,
        project_id: &str,
        mode: Option<ClusterMode>,
        actor: &str,
    ) -> ApiResult<AutoBuildReport> {
        self.gate.mutate(project_id, actor, |_| {
            let mode = match mode {
                Some(m) => m,
                None => self.config_manager.get_cluster_mode(project_id)?,
            };
            let capacity = self.config_manager.get_group_capacity(project_id)?;
            let max_distance_km = self.config_manager.get_max_distance_km(project_id)?;

            let ungrouped = self.client_repo.find_ungrouped(project_id)?;
            let clustered = LocationClusterer::new(max_distance_km).cluster(&ungrouped, mode);
            let existing_names = self.group_repo.names(project_id)?;
            let groups = GroupBuilder::new(capacity).build_auto(
                project_id,
                &clustered.clusters,
                &existing_names,
            );

            for group in &groups {
                check_group_capacity(group, &capacity)?;
            }
            let mut all_groups = self.group_repo.find_by_project(project_id)?;
            all_groups.extend(groups.iter().cloned());
            check_client_single_group(&all_groups)?;

            let ungeocoded_client_ids: Vec<String> = clustered
                .ungeocoded
                .iter()
                .map(|c| c.client_id.clone())
                .collect();

            if !groups.is_empty() {
                let log = ActionLog::new(
                    project_id,
                    ActionType::AutoBuildGroups,
                    actor,
                    Some(json!({
                        "mode": mode.as_str(),
                        "groups": groups.len(),
                        "ungeocoded": ungeocoded_client_ids.len(),
                    })),
                    None,
                );
                self.group_repo.insert_groups(&groups, &log)?;
            }

            tracing::info!(
                project_id,
                mode = %mode,
                groups = groups.len(),
                ungrouped = ungrouped.len(),
                ungeocoded = ungeocoded_client_ids.len(),
                "自动建组完成"
            );

            Ok(AutoBuildReport {
                mode,
                groups,
                ungeocoded_client_ids,
            })
        })
    }

    /// 人工建组
    pub fn create_group(
        &self,
        project_id: &str,
        request: &GroupMembershipRequest,
        actor: &str,
    ) -> ApiResult<ClientGroup> {
        self.gate.mutate(project_id, actor, |_| {
            let capacity = self.config_manager.get_group_capacity(project_id)?;
            let clients = self.client_repo.find_by_project(project_id)?;
            let membership = self.group_repo.membership(project_id)?;

            let group = GroupBuilder::new(capacity).validate_membership(
                project_id,
                request,
                &clients,
                &membership,
                None,
            )?;
            check_group_capacity(&group, &capacity)?;

            let log = ActionLog::new(
                project_id,
                ActionType::CreateGroup,
                actor,
                Some(json!({
                    "group_id": group.group_id,
                    "name": group.name,
                    "mandatory": group.mandatory_clients,
                    "optional": group.optional_clients,
                })),
                None,
            );
            self.group_repo.insert_groups(std::slice::from_ref(&group), &log)?;
            Ok(group)
        })
    }

    /// 编辑客户组（整体替换成员列表）
    pub fn edit_group(
        &self,
        project_id: &str,
        group_id: &str,
        request: &GroupMembershipRequest,
        actor: &str,
    ) -> ApiResult<GroupEditSummary> {
        require_non_empty(group_id, "客户组ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let existing = self
                .group_repo
                .find_by_id(project_id, group_id)?
                .ok_or_else(|| ApiError::NotFound(format!("客户组{}不存在", group_id)))?;
            let capacity = self.config_manager.get_group_capacity(project_id)?;
            let clients = self.client_repo.find_by_project(project_id)?;
            let membership = self.group_repo.membership(project_id)?;

            let builder = GroupBuilder::new(capacity);
            let validated = builder.validate_membership(
                project_id,
                request,
                &clients,
                &membership,
                Some(group_id),
            )?;
            let group = builder.apply_edit(&existing, validated);
            check_group_capacity(&group, &capacity)?;
            let rebuilt = self.rebuild_assignments(project_id, &group, &clients)?;

            let log = ActionLog::new(
                project_id,
                ActionType::EditGroup,
                actor,
                Some(json!({
                    "group_id": group.group_id,
                    "name": group.name,
                    "mandatory": group.mandatory_clients,
                    "optional": group.optional_clients,
                    "rebuilt_assignments": rebuilt.len(),
                })),
                None,
            );
            let released_assignments = self.group_repo.update_group(&group, &rebuilt, &log)?;
            tracing::info!(
                project_id,
                group_id,
                released_assignments,
                rebuilt_assignments = rebuilt.len(),
                "客户组已编辑"
            );

            Ok(GroupEditSummary {
                group,
                released_assignments,
                rebuilt_assignments: rebuilt.len(),
            })
        })
    }

    /// 组已提交配对时，按编辑后的成员重算分配
    fn rebuild_assignments(
        &self,
        project_id: &str,
        group: &ClientGroup,
        clients: &[Client],
    ) -> ApiResult<Vec<Assignment>> {
        let all_assignments = self.assignment_repo.find_by_project(project_id)?;
        let Some(pair_id) = committed_pair_for_group(&group.group_id, &all_assignments) else {
            return Ok(Vec::new());
        };

        let pair = self
            .pair_repo
            .find_by_id(project_id, pair_id)?
            .ok_or_else(|| ApiError::NotFound(format!("配对{}不存在", pair_id)))?;
        let v1 = self
            .volunteer_repo
            .find_by_id(project_id, &pair.volunteer1_id)?
            .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", pair.volunteer1_id)))?;
        let v2 = self
            .volunteer_repo
            .find_by_id(project_id, &pair.volunteer2_id)?
            .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", pair.volunteer2_id)))?;

        let (_, rebuilt) =
            Assigner::new(self.scorer.clone()).build_assignments(group, clients, &pair, &v1, &v2)?;

        let mut after: Vec<Assignment> = all_assignments
            .into_iter()
            .filter(|a| a.group_id != group.group_id)
            .collect();
        after.extend(rebuilt.iter().cloned());
        check_single_assignment_per_client(&after)?;
        Ok(rebuilt)
    }

    /// 删除客户组（成员回到未分组池）
    pub fn delete_group(&self, project_id: &str, group_id: &str, actor: &str) -> ApiResult<()> {
        require_non_empty(group_id, "客户组ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::DeleteGroup,
                actor,
                Some(json!({ "group_id": group_id })),
                None,
            );
            self.group_repo.delete_group(project_id, group_id, &log)?;
            Ok(())
        })
    }

    /// 删除全部客户组
    pub fn delete_all_groups(
        &self,
        project_id: &str,
        confirm: bool,
        actor: &str,
    ) -> ApiResult<BulkDeleteSummary> {
        require_confirmation(confirm, "删除项目内全部客户组")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::DeleteAllGroups,
                actor,
                None,
                Some("删除全部客户组".to_string()),
            );
            let count = self.group_repo.delete_all(project_id, &log)?;
            tracing::info!(project_id, count, "全部客户组已删除");
            Ok(BulkDeleteSummary { count })
        })
    }

    pub fn list_groups(&self, project_id: &str) -> ApiResult<Vec<ClientGroup>> {
        self.gate.load_project(project_id)?;
        Ok(self.group_repo.find_by_project(project_id)?)
    }

    pub fn list_ungrouped_clients(&self, project_id: &str) -> ApiResult<Vec<Client>> {
        self.gate.load_project(project_id)?;
        Ok(self.client_repo.find_ungrouped(project_id)?)
    }
}
