// ==========================================
// 志愿者配对系统 - 志愿者配对 API
// ==========================================
// 职责: 人工配对、组队报名自动配对、删除配对
// 红线: 删除配对时其分配标记为 NEEDS_REASSIGNMENT，不静默丢弃
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{require_non_empty, ProjectGate};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::pair::VolunteerPair;
use crate::engine::invariants::check_volunteer_single_pair;
use crate::engine::{AutoPairResult, CompatibilityScorer, Pairer};
use crate::repository::{PairRepository, VolunteerRepository};

/// 删除配对结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDeleteSummary {
    pub pair_id: String,
    /// 被标记为 NEEDS_REASSIGNMENT 的分配数
    pub invalidated_assignments: usize,
}

pub struct PairApi {
    gate: Arc<ProjectGate>,
    volunteer_repo: Arc<VolunteerRepository>,
    pair_repo: Arc<PairRepository>,
    scorer: CompatibilityScorer,
}

impl PairApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        volunteer_repo: Arc<VolunteerRepository>,
        pair_repo: Arc<PairRepository>,
        scorer: CompatibilityScorer,
    ) -> Self {
        Self {
            gate,
            volunteer_repo,
            pair_repo,
            scorer,
        }
    }

    /// 人工配对两名 SELECTED 志愿者
    pub fn create_pair(
        &self,
        project_id: &str,
        volunteer1_id: &str,
        volunteer2_id: &str,
        actor: &str,
    ) -> ApiResult<VolunteerPair> {
        require_non_empty(volunteer1_id, "志愿者1 ID")?;
        require_non_empty(volunteer2_id, "志愿者2 ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let v1 = self
                .volunteer_repo
                .find_by_id(project_id, volunteer1_id)?
                .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", volunteer1_id)))?;
            let v2 = self
                .volunteer_repo
                .find_by_id(project_id, volunteer2_id)?
                .ok_or_else(|| ApiError::NotFound(format!("志愿者{}不存在", volunteer2_id)))?;
            let mut pairs = self.pair_repo.find_by_project(project_id)?;

            let pair = Pairer::new(self.scorer.clone()).create_manual(project_id, &v1, &v2, &pairs)?;
            pairs.push(pair.clone());
            check_volunteer_single_pair(&pairs)?;

            let log = ActionLog::new(
                project_id,
                ActionType::CreatePair,
                actor,
                Some(json!({
                    "pair_id": pair.pair_id,
                    "volunteer1_id": pair.volunteer1_id,
                    "volunteer2_id": pair.volunteer2_id,
                    "score": pair.compatibility_score,
                })),
                None,
            );
            self.pair_repo.insert_pairs(std::slice::from_ref(&pair), &log)?;
            Ok(pair)
        })
    }

    /// 组队报名自动配对
    pub fn auto_pair(&self, project_id: &str, actor: &str) -> ApiResult<AutoPairResult> {
        self.gate.mutate(project_id, actor, |_| {
            let volunteers = self.volunteer_repo.find_by_project(project_id)?;
            let mut pairs = self.pair_repo.find_by_project(project_id)?;

            let result =
                Pairer::new(self.scorer.clone()).auto_pair_groups(project_id, &volunteers, &pairs);
            pairs.extend(result.pairs.iter().cloned());
            check_volunteer_single_pair(&pairs)?;

            if !result.pairs.is_empty() {
                let log = ActionLog::new(
                    project_id,
                    ActionType::AutoPair,
                    actor,
                    Some(json!({
                        "pairs": result.pairs.len(),
                        "unpaired": result.unpaired.len(),
                    })),
                    None,
                );
                self.pair_repo.insert_pairs(&result.pairs, &log)?;
            }

            tracing::info!(
                project_id,
                pairs = result.pairs.len(),
                unpaired = result.unpaired.len(),
                "自动配对完成"
            );
            Ok(result)
        })
    }

    /// 删除配对
    pub fn delete_pair(&self, project_id: &str, pair_id: &str, actor: &str) -> ApiResult<PairDeleteSummary> {
        require_non_empty(pair_id, "配对ID")?;

        self.gate.mutate(project_id, actor, |_| {
            let log = ActionLog::new(
                project_id,
                ActionType::DeletePair,
                actor,
                Some(json!({ "pair_id": pair_id })),
                None,
            );
            let invalidated_assignments = self.pair_repo.delete_pair(project_id, pair_id, &log)?;
            if invalidated_assignments > 0 {
                tracing::warn!(project_id, pair_id, invalidated_assignments, "配对已删除，相关分配待重新分配");
            }
            Ok(PairDeleteSummary {
                pair_id: pair_id.to_string(),
                invalidated_assignments,
            })
        })
    }

    pub fn list_pairs(&self, project_id: &str) -> ApiResult<Vec<VolunteerPair>> {
        self.gate.load_project(project_id)?;
        Ok(self.pair_repo.find_by_project(project_id)?)
    }
}
