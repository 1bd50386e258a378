// ==========================================
// 志愿者配对系统 - 出勤替补与最终确认 API
// ==========================================
// 职责: 缺席配对查询、替补选择/撤销、最终确认预览与执行
// 红线: 替补只写入调用方持有的 ReplacementPlan，最终确认前不改配对记录
// 红线: 最终确认为终态，之后项目上的全部写操作返回 ProjectFinalized
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{require_confirmation, require_non_empty, ProjectGate};
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::pair::Replacement;
use crate::domain::volunteer::Volunteer;
use crate::engine::invariants::check_replacements_not_cascaded;
use crate::engine::{AttendanceResolver, FinalizationPlan, Finalizer, PairAttendance, ReplacementPlan};
use crate::repository::{
    AssignmentRepository, FinalizationWriteSummary, PairRepository, ProjectRepository,
    VolunteerRepository,
};

/// 最终确认结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationSummary {
    pub plan: FinalizationPlan,
    pub written: FinalizationWriteSummary,
}

pub struct FinalizeApi {
    gate: Arc<ProjectGate>,
    project_repo: Arc<ProjectRepository>,
    volunteer_repo: Arc<VolunteerRepository>,
    pair_repo: Arc<PairRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    config_manager: Arc<ConfigManager>,
}

impl FinalizeApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        project_repo: Arc<ProjectRepository>,
        volunteer_repo: Arc<VolunteerRepository>,
        pair_repo: Arc<PairRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            gate,
            project_repo,
            volunteer_repo,
            pair_repo,
            assignment_repo,
            config_manager,
        }
    }

    fn resolver(&self, project_id: &str) -> ApiResult<AttendanceResolver> {
        let policy = self.config_manager.get_attendance_policy(project_id)?;
        Ok(AttendanceResolver::new(policy))
    }

    // ==========================================
    // 出勤与替补
    // ==========================================

    /// 至少一名成员未出勤的配对
    pub fn pairs_needing_replacement(&self, project_id: &str) -> ApiResult<Vec<PairAttendance>> {
        self.gate.load_project(project_id)?;
        let pairs = self.pair_repo.find_by_project(project_id)?;
        let volunteers = self.volunteer_repo.find_by_project(project_id)?;
        Ok(self
            .resolver(project_id)?
            .pairs_needing_replacement(&pairs, &volunteers)?)
    }

    /// 当前可选替补（排除 plan 中已替补他人的志愿者）
    pub fn eligible_substitutes(
        &self,
        project_id: &str,
        plan: &ReplacementPlan,
    ) -> ApiResult<Vec<Volunteer>> {
        self.gate.load_project(project_id)?;
        let pairs = self.pair_repo.find_by_project(project_id)?;
        let volunteers = self.volunteer_repo.find_by_project(project_id)?;
        Ok(self
            .resolver(project_id)?
            .eligible_substitutes(&volunteers, &pairs, plan)
            .into_iter()
            .cloned()
            .collect())
    }

    /// 为缺席成员选择替补
    pub fn select_substitute(
        &self,
        project_id: &str,
        plan: &mut ReplacementPlan,
        pair_id: &str,
        absent_volunteer_id: &str,
        substitute_volunteer_id: &str,
    ) -> ApiResult<()> {
        require_non_empty(pair_id, "配对ID")?;
        require_non_empty(absent_volunteer_id, "缺席志愿者ID")?;
        require_non_empty(substitute_volunteer_id, "替补志愿者ID")?;
        self.gate.load_open_project(project_id)?;

        let pairs = self.pair_repo.find_by_project(project_id)?;
        let pair = pairs
            .iter()
            .find(|p| p.pair_id == pair_id)
            .ok_or_else(|| ApiError::NotFound(format!("配对{}不存在", pair_id)))?;
        let absent = self.load_volunteer(project_id, absent_volunteer_id)?;
        let substitute = self.load_volunteer(project_id, substitute_volunteer_id)?;

        // 先在副本上选择并校验，失败时调用方的 plan 保持不变
        let resolver = self.resolver(project_id)?;
        let mut candidate = plan.clone();
        candidate.select(&resolver, pair, &absent, &substitute, &pairs)?;
        let applied: Vec<_> = pairs.iter().map(|p| candidate.applied_to(p)).collect();
        check_replacements_not_cascaded(&pairs, &applied, candidate.entries())?;
        *plan = candidate;

        tracing::info!(
            project_id,
            pair_id,
            absent = absent_volunteer_id,
            substitute = substitute_volunteer_id,
            "替补已选择"
        );
        Ok(())
    }

    pub fn clear_substitute(
        &self,
        plan: &mut ReplacementPlan,
        pair_id: &str,
        absent_volunteer_id: &str,
    ) -> Option<Replacement> {
        plan.clear(pair_id, absent_volunteer_id)
    }

    // ==========================================
    // 最终确认
    // ==========================================

    /// 预览最终确认（不落库）
    pub fn preview_finalization(
        &self,
        project_id: &str,
        plan: &ReplacementPlan,
    ) -> ApiResult<FinalizationPlan> {
        self.gate.load_open_project(project_id)?;
        self.compute_plan(project_id, plan)
    }

    /// 最终确认: 应用替补、移除未保留志愿者、锁定项目
    pub fn finalize(
        &self,
        project_id: &str,
        plan: &ReplacementPlan,
        confirm: bool,
        actor: &str,
    ) -> ApiResult<FinalizationSummary> {
        require_confirmation(confirm, "最终确认项目")?;

        self.gate.mutate(project_id, actor, |_| {
            let final_plan = self.compute_plan(project_id, plan)?;

            let log = ActionLog::new(
                project_id,
                ActionType::Finalize,
                actor,
                Some(json!({
                    "final_pairs": final_plan.final_pairs.len(),
                    "removed_volunteers": final_plan.removed_volunteer_ids.len(),
                    "promoted_volunteers": final_plan.promoted_volunteer_ids,
                    "replacements_applied": final_plan.replacements_applied,
                })),
                None,
            );
            let written = self
                .project_repo
                .apply_finalization(project_id, &final_plan, &log)?;

            tracing::info!(
                project_id,
                pairs_rewritten = written.pairs_rewritten,
                pairs_deleted = written.pairs_deleted,
                volunteers_deleted = written.volunteers_deleted,
                volunteers_promoted = written.volunteers_promoted,
                "项目已最终确认"
            );
            Ok(FinalizationSummary {
                plan: final_plan,
                written,
            })
        })
    }

    fn compute_plan(&self, project_id: &str, plan: &ReplacementPlan) -> ApiResult<FinalizationPlan> {
        let pairs = self.pair_repo.find_by_project(project_id)?;
        let assignments = self.assignment_repo.find_by_project(project_id)?;
        let volunteers = self.volunteer_repo.find_by_project(project_id)?;

        // 选择替补后出勤状态可能已改变
        for r in plan.entries() {
            let still_eligible = volunteers
                .iter()
                .find(|v| v.volunteer_id == r.substitute_volunteer_id)
                .map(AttendanceResolver::is_eligible_substitute)
                .unwrap_or(false);
            if !still_eligible {
                return Err(ApiError::ValidationError(format!(
                    "替补志愿者{}已不符合替补条件",
                    r.substitute_volunteer_id
                )));
            }
        }

        Ok(Finalizer::new().plan(plan, &pairs, &assignments, &volunteers)?)
    }

    fn load_volunteer(&self, project_id: &str, volunteer_id: &str) -> ApiResult<Volunteer> {
        self.volunteer_repo
            .find_by_id(project_id, volunteer_id)?
            .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", volunteer_id)))
    }
}
