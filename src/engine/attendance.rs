// ==========================================
// 志愿者配对系统 - 出勤替补引擎
// ==========================================
// 职责: 标记存在缺席成员的配对，挑选合格替补
// 合格替补: WAITLISTED ∧ selected_for_training ∧ 培训出勤=PRESENT ∧ 本轮未替补他人
// 红线: 选择替补只写 replacements 映射，原配对记录在最终确认前保持不变
// ==========================================

use crate::domain::pair::{Replacement, VolunteerPair};
use crate::domain::types::{AttendanceState, VolunteerStatus};
use crate::domain::volunteer::Volunteer;
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// AttendancePolicy - 出勤判定策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    /// 未记录出勤（UNKNOWN）是否视为需要替补
    pub unknown_needs_replacement: bool,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            unknown_needs_replacement: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAttendance {
    pub volunteer_id: String,
    pub state: AttendanceState,
    pub needs_replacement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAttendance {
    pub pair_id: String,
    pub members: Vec<MemberAttendance>,
    pub needs_replacement: bool,
}

impl PairAttendance {
    pub fn absent_members(&self) -> impl Iterator<Item = &MemberAttendance> {
        self.members.iter().filter(|m| m.needs_replacement)
    }
}

// ==========================================
// AttendanceResolver - 出勤替补引擎
// ==========================================
pub struct AttendanceResolver {
    policy: AttendancePolicy,
}

impl Default for AttendanceResolver {
    fn default() -> Self {
        Self::new(AttendancePolicy::default())
    }
}

impl AttendanceResolver {
    pub fn new(policy: AttendancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    pub fn member_needs_replacement(&self, state: AttendanceState) -> bool {
        match state {
            AttendanceState::Present => false,
            AttendanceState::Absent => true,
            AttendanceState::Unknown => self.policy.unknown_needs_replacement,
        }
    }

    /// 逐对评估成员出勤
    pub fn evaluate_pairs(
        &self,
        pairs: &[VolunteerPair],
        volunteers: &[Volunteer],
    ) -> EngineResult<Vec<PairAttendance>> {
        let by_id: HashMap<&str, &Volunteer> = volunteers
            .iter()
            .map(|v| (v.volunteer_id.as_str(), v))
            .collect();

        pairs
            .iter()
            .map(|pair| {
                let members = pair
                    .members()
                    .iter()
                    .map(|id| {
                        let v = by_id
                            .get(id)
                            .ok_or_else(|| EngineError::not_found("Volunteer", id))?;
                        Ok(MemberAttendance {
                            volunteer_id: id.to_string(),
                            state: v.training_attended,
                            needs_replacement: self.member_needs_replacement(v.training_attended),
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                let needs_replacement = members.iter().any(|m| m.needs_replacement);
                Ok(PairAttendance {
                    pair_id: pair.pair_id.clone(),
                    members,
                    needs_replacement,
                })
            })
            .collect()
    }

    /// 至少一名成员未到场的配对
    pub fn pairs_needing_replacement(
        &self,
        pairs: &[VolunteerPair],
        volunteers: &[Volunteer],
    ) -> EngineResult<Vec<PairAttendance>> {
        Ok(self
            .evaluate_pairs(pairs, volunteers)?
            .into_iter()
            .filter(|p| p.needs_replacement)
            .collect())
    }

    /// 替补资格（不含"本轮未替补他人"条件）
    pub fn is_eligible_substitute(volunteer: &Volunteer) -> bool {
        volunteer.status == VolunteerStatus::Waitlisted
            && volunteer.selected_for_training
            && volunteer.training_attended == AttendanceState::Present
    }

    /// 当前可选替补: 合格 且 不在任何配对中 且 未在 plan 中替补他人
    pub fn eligible_substitutes<'a>(
        &self,
        volunteers: &'a [Volunteer],
        active_pairs: &[VolunteerPair],
        plan: &ReplacementPlan,
    ) -> Vec<&'a Volunteer> {
        volunteers
            .iter()
            .filter(|v| Self::is_eligible_substitute(v))
            .filter(|v| !active_pairs.iter().any(|p| p.contains(&v.volunteer_id)))
            .filter(|v| !plan.is_substituting(&v.volunteer_id))
            .collect()
    }
}

// ==========================================
// ReplacementPlan - 替补映射 (pair, absent) → substitute
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementPlan {
    entries: Vec<Replacement>,
}

impl ReplacementPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 选择替补（同一缺席位可重复选择，后选覆盖前选）
    pub fn select(
        &mut self,
        resolver: &AttendanceResolver,
        pair: &VolunteerPair,
        absent: &Volunteer,
        substitute: &Volunteer,
        active_pairs: &[VolunteerPair],
    ) -> EngineResult<()> {
        if !pair.contains(&absent.volunteer_id) {
            return Err(EngineError::validation(format!(
                "志愿者{}不属于配对{}",
                absent.volunteer_id, pair.pair_id
            )));
        }
        if !resolver.member_needs_replacement(absent.training_attended) {
            return Err(EngineError::validation(format!(
                "志愿者{}已出勤，无需替补",
                absent.volunteer_id
            )));
        }
        if !AttendanceResolver::is_eligible_substitute(substitute) {
            return Err(EngineError::validation(format!(
                "志愿者{}不符合替补条件（需WAITLISTED、入选培训且已出勤）",
                substitute.volunteer_id
            )));
        }
        if active_pairs.iter().any(|p| p.contains(&substitute.volunteer_id)) {
            return Err(EngineError::validation(format!(
                "志愿者{}已在配对中",
                substitute.volunteer_id
            )));
        }
        if let Some(other) = self.entries.iter().find(|r| {
            r.substitute_volunteer_id == substitute.volunteer_id
                && !(r.pair_id == pair.pair_id && r.absent_volunteer_id == absent.volunteer_id)
        }) {
            return Err(EngineError::validation(format!(
                "志愿者{}已替补配对{}中的{}",
                substitute.volunteer_id, other.pair_id, other.absent_volunteer_id
            )));
        }

        self.clear(&pair.pair_id, &absent.volunteer_id);
        self.entries.push(Replacement {
            pair_id: pair.pair_id.clone(),
            absent_volunteer_id: absent.volunteer_id.clone(),
            substitute_volunteer_id: substitute.volunteer_id.clone(),
        });
        Ok(())
    }

    /// 撤销替补
    pub fn clear(&mut self, pair_id: &str, absent_volunteer_id: &str) -> Option<Replacement> {
        let idx = self
            .entries
            .iter()
            .position(|r| r.pair_id == pair_id && r.absent_volunteer_id == absent_volunteer_id)?;
        Some(self.entries.remove(idx))
    }

    pub fn substitute_for(&self, pair_id: &str, absent_volunteer_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|r| r.pair_id == pair_id && r.absent_volunteer_id == absent_volunteer_id)
            .map(|r| r.substitute_volunteer_id.as_str())
    }

    pub fn is_substituting(&self, volunteer_id: &str) -> bool {
        self.entries
            .iter()
            .any(|r| r.substitute_volunteer_id == volunteer_id)
    }

    pub fn entries(&self) -> &[Replacement] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 替补后的配对视图（不修改原配对）
    pub fn applied_to(&self, pair: &VolunteerPair) -> VolunteerPair {
        let mut applied = pair.clone();
        if let Some(sub) = self.substitute_for(&pair.pair_id, &pair.volunteer1_id) {
            applied.volunteer1_id = sub.to_string();
        }
        if let Some(sub) = self.substitute_for(&pair.pair_id, &pair.volunteer2_id) {
            applied.volunteer2_id = sub.to_string();
        }
        applied
    }
}
