// ==========================================
// 志愿者配对系统 - 最终确认引擎
// ==========================================
// 职责: 应用替补 → 冻结名单 → 计算需移除的志愿者
// 规则: 未被任何最终分配（替补后）引用的志愿者全部移除，包括全部 PENDING
// 红线: 终态操作，不建模"撤销确认"
// ==========================================

use crate::domain::pair::{Assignment, VolunteerPair};
use crate::domain::types::VolunteerStatus;
use crate::domain::volunteer::Volunteer;
use crate::engine::attendance::ReplacementPlan;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::invariants::{check_replacements_not_cascaded, check_volunteer_single_pair};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::instrument;

/// 最终确认方案（纯计算结果，由 API 层在单一事务内落库）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationPlan {
    /// 替补后被最终分配引用的配对
    pub final_pairs: Vec<VolunteerPair>,
    /// 无最终分配的配对（随成员一并删除）
    pub dropped_pair_ids: Vec<String>,
    pub retained_volunteer_ids: BTreeSet<String>,
    pub removed_volunteer_ids: Vec<String>,
    /// 替补者（WAITLISTED → SELECTED）
    pub promoted_volunteer_ids: Vec<String>,
    pub assignment_count: usize,
    pub replacements_applied: usize,
}

pub struct Finalizer;

impl Default for Finalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Finalizer {
    pub fn new() -> Self {
        Self
    }

    /// 计算最终确认方案
    ///
    /// # 参数
    /// - `replacements`: 替补映射
    /// - `pairs`: 项目内全部配对（原始记录）
    /// - `final_assignments`: 最终分配（仅 ACTIVE 计入）
    /// - `volunteers`: 项目内全部志愿者
    #[instrument(skip_all, fields(
        pairs_count = pairs.len(),
        assignments_count = final_assignments.len(),
        volunteers_count = volunteers.len()
    ))]
    pub fn plan(
        &self,
        replacements: &ReplacementPlan,
        pairs: &[VolunteerPair],
        final_assignments: &[Assignment],
        volunteers: &[Volunteer],
    ) -> EngineResult<FinalizationPlan> {
        let by_id: HashMap<&str, &Volunteer> = volunteers
            .iter()
            .map(|v| (v.volunteer_id.as_str(), v))
            .collect();
        let pairs_by_id: HashMap<&str, &VolunteerPair> =
            pairs.iter().map(|p| (p.pair_id.as_str(), p)).collect();

        // 1. 校验替补映射
        for r in replacements.entries() {
            let pair = pairs_by_id
                .get(r.pair_id.as_str())
                .ok_or_else(|| EngineError::not_found("VolunteerPair", &r.pair_id))?;
            if !pair.contains(&r.absent_volunteer_id) {
                return Err(EngineError::validation(format!(
                    "替补记录无效: {}不属于配对{}",
                    r.absent_volunteer_id, r.pair_id
                )));
            }
            if !by_id.contains_key(r.substitute_volunteer_id.as_str()) {
                return Err(EngineError::not_found("Volunteer", &r.substitute_volunteer_id));
            }
        }

        // 2. 被最终分配引用的配对
        let active: Vec<&Assignment> = final_assignments.iter().filter(|a| a.is_active()).collect();
        let referenced: HashSet<&str> = active.iter().map(|a| a.volunteer_pair_id.as_str()).collect();
        for pair_id in &referenced {
            if !pairs_by_id.contains_key(pair_id) {
                return Err(EngineError::not_found("VolunteerPair", pair_id));
            }
        }

        let mut kept = Vec::new();
        let mut final_pairs = Vec::new();
        let mut dropped_pair_ids = Vec::new();
        for pair in pairs {
            if referenced.contains(pair.pair_id.as_str()) {
                kept.push(pair.clone());
                final_pairs.push(replacements.applied_to(pair));
            } else {
                dropped_pair_ids.push(pair.pair_id.clone());
            }
        }
        check_replacements_not_cascaded(&kept, &final_pairs, replacements.entries())?;
        check_volunteer_single_pair(&final_pairs)?;

        // 3. 保留名单
        let retained: BTreeSet<String> = final_pairs
            .iter()
            .flat_map(|p| p.members())
            .map(str::to_string)
            .collect();
        for id in &retained {
            match by_id.get(id.as_str()) {
                None => return Err(EngineError::not_found("Volunteer", id)),
                Some(v) if v.status == VolunteerStatus::Pending => {
                    return Err(EngineError::validation(format!(
                        "最终配对成员{}状态为PENDING",
                        id
                    )))
                }
                Some(_) => {}
            }
        }

        let removed: Vec<String> = volunteers
            .iter()
            .filter(|v| !retained.contains(&v.volunteer_id))
            .map(|v| v.volunteer_id.clone())
            .collect();
        let promoted: Vec<String> = retained
            .iter()
            .filter(|id| {
                by_id
                    .get(id.as_str())
                    .map(|v| v.status == VolunteerStatus::Waitlisted)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        let replacements_applied = replacements
            .entries()
            .iter()
            .filter(|r| referenced.contains(r.pair_id.as_str()))
            .count();

        tracing::info!(
            final_pairs = final_pairs.len(),
            retained = retained.len(),
            removed = removed.len(),
            replacements_applied,
            "最终确认方案已生成"
        );

        Ok(FinalizationPlan {
            final_pairs,
            dropped_pair_ids,
            retained_volunteer_ids: retained,
            removed_volunteer_ids: removed,
            promoted_volunteer_ids: promoted,
            assignment_count: active.len(),
            replacements_applied,
        })
    }
}
