// ==========================================
// 志愿者配对系统 - 志愿者配对引擎
// ==========================================
// 职责: 人工配对 / 组队报名自动配对
// 红线: 只有 SELECTED 志愿者可配对；一名志愿者最多属于一个有效配对
// 说明: 贪心且确定性，不做跨组最优
// ==========================================

use crate::domain::pair::VolunteerPair;
use crate::domain::volunteer::Volunteer;
use crate::engine::compatibility::CompatibilityScorer;
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;

/// 自动配对结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoPairResult {
    pub pairs: Vec<VolunteerPair>,
    /// 桶内落单的志愿者ID（按组名分组）
    pub unpaired: Vec<UnpairedMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpairedMember {
    pub group_name: String,
    pub volunteer_id: String,
}

// ==========================================
// Pairer - 志愿者配对引擎
// ==========================================
pub struct Pairer {
    scorer: CompatibilityScorer,
}

impl Pairer {
    pub fn new(scorer: CompatibilityScorer) -> Self {
        Self { scorer }
    }

    /// 人工配对
    ///
    /// # 参数
    /// - `active_pairs`: 项目内现有配对
    ///
    /// # 返回
    /// - Err(Validation): 同一人、非 SELECTED、已在其他配对中
    pub fn create_manual(
        &self,
        project_id: &str,
        v1: &Volunteer,
        v2: &Volunteer,
        active_pairs: &[VolunteerPair],
    ) -> EngineResult<VolunteerPair> {
        if v1.volunteer_id == v2.volunteer_id {
            return Err(EngineError::validation("不能将志愿者与自己配对"));
        }
        for v in [v1, v2] {
            if !v.is_selected() {
                return Err(EngineError::validation(format!(
                    "志愿者{}状态为{}，只有SELECTED可配对",
                    v.volunteer_id, v.status
                )));
            }
            if let Some(existing) = active_pairs.iter().find(|p| p.contains(&v.volunteer_id)) {
                return Err(EngineError::validation(format!(
                    "志愿者{}已在配对{}中",
                    v.volunteer_id, existing.pair_id
                )));
            }
        }

        let score = self.scorer.pair_score(v1, v2);
        Ok(VolunteerPair::new(
            project_id,
            &v1.volunteer_id,
            &v2.volunteer_id,
            score.score,
            true,
        ))
    }

    /// 组队报名自动配对
    ///
    /// 规则：
    /// 1) is_joining_as_group=true 且组名相同的志愿者为一桶，桶按首次出现排序
    /// 2) 桶内按输入顺序，连续两名未配对的 SELECTED 成员组成一对
    /// 3) 奇数落单者保持未配对
    #[instrument(skip(self, volunteers, active_pairs), fields(volunteers_count = volunteers.len()))]
    pub fn auto_pair_groups(
        &self,
        project_id: &str,
        volunteers: &[Volunteer],
        active_pairs: &[VolunteerPair],
    ) -> AutoPairResult {
        let already_paired: HashSet<&str> = active_pairs
            .iter()
            .flat_map(|p| p.members())
            .collect();

        let mut buckets: Vec<(&str, Vec<&Volunteer>)> = Vec::new();
        for v in volunteers {
            let Some(key) = v.group_key() else {
                continue;
            };
            if !v.is_selected() || already_paired.contains(v.volunteer_id.as_str()) {
                continue;
            }
            match buckets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(v),
                None => buckets.push((key, vec![v])),
            }
        }

        let mut pairs = Vec::new();
        let mut unpaired = Vec::new();
        for (group_name, members) in buckets {
            let mut chunks = members.chunks_exact(2);
            for chunk in chunks.by_ref() {
                let score = self.scorer.pair_score(chunk[0], chunk[1]);
                pairs.push(VolunteerPair::new(
                    project_id,
                    &chunk[0].volunteer_id,
                    &chunk[1].volunteer_id,
                    score.score,
                    false,
                ));
            }
            for odd in chunks.remainder() {
                unpaired.push(UnpairedMember {
                    group_name: group_name.to_string(),
                    volunteer_id: odd.volunteer_id.clone(),
                });
            }
        }

        tracing::debug!(pairs = pairs.len(), unpaired = unpaired.len(), "自动配对完成");
        AutoPairResult { pairs, unpaired }
    }
}
