// ==========================================
// 志愿者配对系统 - 分配 API
// ==========================================
// 职责: 暂存/撤销暂存、提交会话、直接分配、移除分配、使用情况
// 红线: 提交在项目锁内完成；每个组独立事务，失败组保留在会话中
// 红线: 重新分配替换组内全部分配，不保留旧配对的记录
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{require_non_empty, ProjectGate};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::group::ClientGroup;
use crate::domain::pair::{Assignment, VolunteerPair};
use crate::engine::invariants::check_single_assignment_per_client;
use crate::engine::{
    committed_pair_for_group, pair_usage, Assigner, CompatibilityScorer, GroupScore,
    PlanningSession, StagedAssignment,
};
use crate::repository::{
    AssignmentRepository, ClientRepository, GroupRepository, PairRepository, VolunteerRepository,
};

/// 单组分配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub group_id: String,
    pub pair_id: String,
    pub assignment_count: usize,
    pub score: GroupScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupCommitOutcome {
    Committed(AssignmentSummary),
    Failed { group_id: String, reason: String },
}

/// 会话提交结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    pub outcomes: Vec<GroupCommitOutcome>,
}

impl CommitReport {
    pub fn committed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GroupCommitOutcome::Committed(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.committed_count()
    }
}

pub struct AssignmentApi {
    gate: Arc<ProjectGate>,
    client_repo: Arc<ClientRepository>,
    volunteer_repo: Arc<VolunteerRepository>,
    group_repo: Arc<GroupRepository>,
    pair_repo: Arc<PairRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    scorer: CompatibilityScorer,
}

impl AssignmentApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        client_repo: Arc<ClientRepository>,
        volunteer_repo: Arc<VolunteerRepository>,
        group_repo: Arc<GroupRepository>,
        pair_repo: Arc<PairRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        scorer: CompatibilityScorer,
    ) -> Self {
        Self {
            gate,
            client_repo,
            volunteer_repo,
            group_repo,
            pair_repo,
            assignment_repo,
            scorer,
        }
    }

    // ==========================================
    // 暂存
    // ==========================================

    /// 暂存 group → pair（不落库）
    pub fn stage(
        &self,
        session: &mut PlanningSession,
        group_id: &str,
        pair_id: &str,
    ) -> ApiResult<StagedAssignment> {
        require_non_empty(group_id, "客户组ID")?;
        require_non_empty(pair_id, "配对ID")?;
        let project_id = session.project_id.clone();
        self.gate.load_open_project(&project_id)?;

        self.load_group(&project_id, group_id)?;
        self.load_pair(&project_id, pair_id)?;
        let current = self.assignment_repo.find_by_group(&project_id, group_id)?;
        let committed = committed_pair_for_group(group_id, &current);

        let staged = session.stage(group_id, pair_id, committed)?.clone();
        tracing::debug!(
            project_id = %project_id,
            session_id = %session.session_id,
            group_id,
            pair_id,
            "分配已暂存"
        );
        Ok(staged)
    }

    pub fn unstage(&self, session: &mut PlanningSession, group_id: &str) -> Option<StagedAssignment> {
        session.unstage(group_id)
    }

    /// 提交会话中的全部暂存分配
    ///
    /// 每个组单独落库；成功的组从会话移除，失败的组保留并在结果中给出原因。
    pub fn commit_session(&self, session: &mut PlanningSession, actor: &str) -> ApiResult<CommitReport> {
        let project_id = session.project_id.clone();
        let staged: Vec<StagedAssignment> = session.staged().cloned().collect();

        let report = self.gate.mutate(&project_id, actor, |_| {
            let mut report = CommitReport::default();
            for entry in &staged {
                match self.commit_group(&project_id, &entry.group_id, &entry.pair_id, Some(entry), actor) {
                    Ok(summary) => report.outcomes.push(GroupCommitOutcome::Committed(summary)),
                    Err(e) => {
                        tracing::warn!(
                            project_id = %project_id,
                            group_id = %entry.group_id,
                            pair_id = %entry.pair_id,
                            error = %e,
                            "暂存分配提交失败"
                        );
                        report.outcomes.push(GroupCommitOutcome::Failed {
                            group_id: entry.group_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Ok(report)
        })?;

        for outcome in &report.outcomes {
            if let GroupCommitOutcome::Committed(s) = outcome {
                session.unstage(&s.group_id);
            }
        }
        tracing::info!(
            project_id = %project_id,
            committed = report.committed_count(),
            failed = report.failed_count(),
            "会话提交完成"
        );
        Ok(report)
    }

    // ==========================================
    // 直接分配 / 移除
    // ==========================================

    /// 直接分配（不经过会话）
    pub fn assign_pair_to_group(
        &self,
        project_id: &str,
        group_id: &str,
        pair_id: &str,
        actor: &str,
    ) -> ApiResult<AssignmentSummary> {
        require_non_empty(group_id, "客户组ID")?;
        require_non_empty(pair_id, "配对ID")?;

        self.gate
            .mutate(project_id, actor, |_| self.commit_group(project_id, group_id, pair_id, None, actor))
    }

    /// 移除组内属于指定配对的分配
    pub fn remove_assignment(
        &self,
        project_id: &str,
        group_id: &str,
        pair_id: &str,
        actor: &str,
    ) -> ApiResult<usize> {
        require_non_empty(group_id, "客户组ID")?;
        require_non_empty(pair_id, "配对ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let group = self.load_group(project_id, group_id)?;
            let current = self.assignment_repo.find_by_group(project_id, group_id)?;
            let ids = Assigner::plan_removal(&group, pair_id, &current);
            if ids.is_empty() {
                return Err(ApiError::NotFound(format!(
                    "客户组{}没有配对{}的分配",
                    group_id, pair_id
                )));
            }

            let log = ActionLog::new(
                project_id,
                ActionType::RemoveAssignment,
                actor,
                Some(json!({ "group_id": group_id, "pair_id": pair_id, "count": ids.len() })),
                None,
            );
            Ok(self.assignment_repo.delete_by_ids(project_id, &ids, &log)?)
        })
    }

    pub fn list_assignments(&self, project_id: &str) -> ApiResult<Vec<Assignment>> {
        self.gate.load_project(project_id)?;
        Ok(self.assignment_repo.find_by_project(project_id)?)
    }

    /// pair_id → 分配到的组数
    pub fn pair_usage(&self, project_id: &str) -> ApiResult<BTreeMap<String, usize>> {
        self.gate.load_project(project_id)?;
        let assignments = self.assignment_repo.find_by_project(project_id)?;
        Ok(pair_usage(&assignments))
    }

    // ==========================================
    // 内部
    // ==========================================

    // 调用方须已持有项目锁
    fn commit_group(
        &self,
        project_id: &str,
        group_id: &str,
        pair_id: &str,
        staged: Option<&StagedAssignment>,
        actor: &str,
    ) -> ApiResult<AssignmentSummary> {
        let group = self.load_group(project_id, group_id)?;
        let pair = self.load_pair(project_id, pair_id)?;

        let all_assignments = self.assignment_repo.find_by_project(project_id)?;
        if let Some(staged) = staged {
            let current = committed_pair_for_group(group_id, &all_assignments);
            Assigner::check_commit_base(staged, current)?;
        }

        let v1 = self
            .volunteer_repo
            .find_by_id(project_id, &pair.volunteer1_id)?
            .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", pair.volunteer1_id)))?;
        let v2 = self
            .volunteer_repo
            .find_by_id(project_id, &pair.volunteer2_id)?
            .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", pair.volunteer2_id)))?;
        let clients = self.client_repo.find_by_project(project_id)?;

        let (score, assignments) =
            Assigner::new(self.scorer.clone()).build_assignments(&group, &clients, &pair, &v1, &v2)?;

        let mut after: Vec<Assignment> = all_assignments
            .into_iter()
            .filter(|a| a.group_id != group_id)
            .collect();
        after.extend(assignments.iter().cloned());
        check_single_assignment_per_client(&after)?;

        let action_type = if staged.is_some() {
            ActionType::CommitAssignments
        } else {
            ActionType::AssignPair
        };
        let log = ActionLog::new(
            project_id,
            action_type,
            actor,
            Some(json!({
                "group_id": group_id,
                "pair_id": pair_id,
                "clients": assignments.len(),
                "confidence": score.confidence,
            })),
            None,
        );
        let assignment_count = self
            .assignment_repo
            .replace_group_assignments(project_id, group_id, &assignments, &log)?;

        Ok(AssignmentSummary {
            group_id: group_id.to_string(),
            pair_id: pair_id.to_string(),
            assignment_count,
            score,
        })
    }

    fn load_group(&self, project_id: &str, group_id: &str) -> ApiResult<ClientGroup> {
        self.group_repo
            .find_by_id(project_id, group_id)?
            .ok_or_else(|| ApiError::NotFound(format!("客户组{}不存在", group_id)))
    }

    fn load_pair(&self, project_id: &str, pair_id: &str) -> ApiResult<VolunteerPair> {
        self.pair_repo
            .find_by_id(project_id, pair_id)?
            .ok_or_else(|| ApiError::NotFound(format!("配对{}不存在", pair_id)))
    }
}
