// ==========================================
// 志愿者配对系统 - 分配引擎
// ==========================================
// 职责: 配对 → 客户组（按组粒度，展开为每客户一条分配）
// 红线: 一个组同一时刻只对应一个配对；重新分配是替换，不是追加
// 红线: 同组暂存分歧必须报告冲突，禁止后写覆盖
// 说明: 一个配对可分配给多个组，使用次数仅供参考，不设上限
// ==========================================

use crate::domain::client::Client;
use crate::domain::group::ClientGroup;
use crate::domain::pair::{Assignment, VolunteerPair};
use crate::domain::types::AssignmentStatus;
use crate::domain::volunteer::Volunteer;
use crate::engine::compatibility::{CompatibilityScorer, GroupScore};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ==========================================
// PlanningSession - 编辑会话内的暂存分配
// ==========================================

/// 暂存分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedAssignment {
    pub group_id: String,
    pub pair_id: String,
    /// 暂存时该组已提交的配对（用于提交时检测并发修改）
    pub base_pair_id: Option<String>,
    pub staged_at: NaiveDateTime,
}

/// 规划会话
///
/// 显式持有暂存分配，由调用方按引用传入分配操作；
/// 提交时整体取出并清空。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningSession {
    pub session_id: String,
    pub project_id: String,
    staged: BTreeMap<String, StagedAssignment>,
}

impl PlanningSession {
    pub fn new(project_id: &str) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            staged: BTreeMap::new(),
        }
    }

    /// 暂存 group → pair
    ///
    /// - 同组同配对重复暂存: 幂等
    /// - 同组不同配对: Conflict（需先 unstage）
    pub fn stage(
        &mut self,
        group_id: &str,
        pair_id: &str,
        committed_pair_id: Option<&str>,
    ) -> EngineResult<&StagedAssignment> {
        if let Some(existing) = self.staged.get(group_id) {
            if existing.pair_id != pair_id {
                return Err(EngineError::Conflict {
                    group_id: group_id.to_string(),
                    reason: format!(
                        "已暂存配对{}，与新配对{}分歧",
                        existing.pair_id, pair_id
                    ),
                });
            }
        } else {
            self.staged.insert(
                group_id.to_string(),
                StagedAssignment {
                    group_id: group_id.to_string(),
                    pair_id: pair_id.to_string(),
                    base_pair_id: committed_pair_id.map(str::to_string),
                    staged_at: chrono::Local::now().naive_local(),
                },
            );
        }
        self.staged
            .get(group_id)
            .ok_or_else(|| EngineError::not_found("StagedAssignment", group_id))
    }

    pub fn unstage(&mut self, group_id: &str) -> Option<StagedAssignment> {
        self.staged.remove(group_id)
    }

    pub fn get(&self, group_id: &str) -> Option<&StagedAssignment> {
        self.staged.get(group_id)
    }

    pub fn staged(&self) -> impl Iterator<Item = &StagedAssignment> {
        self.staged.values()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// 取出全部暂存并清空会话
    pub fn take_all(&mut self) -> Vec<StagedAssignment> {
        std::mem::take(&mut self.staged).into_values().collect()
    }
}

// ==========================================
// Assigner - 分配引擎
// ==========================================
pub struct Assigner {
    scorer: CompatibilityScorer,
}

impl Assigner {
    pub fn new(scorer: CompatibilityScorer) -> Self {
        Self { scorer }
    }

    /// 生成组内每个客户的分配记录（共享评分）
    ///
    /// # 参数
    /// - `clients`: 至少包含组内全部客户
    /// - `v1`/`v2`: 配对的两名成员
    pub fn build_assignments(
        &self,
        group: &ClientGroup,
        clients: &[Client],
        pair: &VolunteerPair,
        v1: &Volunteer,
        v2: &Volunteer,
    ) -> EngineResult<(GroupScore, Vec<Assignment>)> {
        if !(pair.contains(&v1.volunteer_id) && pair.contains(&v2.volunteer_id))
            || v1.volunteer_id == v2.volunteer_id
        {
            return Err(EngineError::validation(format!(
                "志愿者与配对{}成员不一致",
                pair.pair_id
            )));
        }

        let by_id: HashMap<&str, &Client> =
            clients.iter().map(|c| (c.client_id.as_str(), c)).collect();
        let mut members = Vec::with_capacity(group.total_clients());
        for client_id in group.client_ids() {
            let client = by_id
                .get(client_id.as_str())
                .ok_or_else(|| EngineError::not_found("Client", client_id))?;
            members.push(*client);
        }
        if members.is_empty() {
            return Err(EngineError::validation(format!(
                "客户组{}没有客户",
                group.group_id
            )));
        }

        let score = self.scorer.group_score(v1, v2, &members);
        let now = chrono::Local::now().naive_local();
        let assignments = members
            .iter()
            .map(|client| Assignment {
                assignment_id: uuid::Uuid::new_v4().to_string(),
                project_id: group.project_id.clone(),
                client_id: client.client_id.clone(),
                group_id: group.group_id.clone(),
                volunteer_pair_id: pair.pair_id.clone(),
                language_match: score.language_match,
                region_match: score.region_match,
                language_match_pct: score.language_match_pct,
                region_match_pct: score.region_match_pct,
                confidence: score.confidence,
                status: AssignmentStatus::Active,
                assigned_at: now,
            })
            .collect();

        Ok((score, assignments))
    }

    /// 提交前检查: 暂存基线必须与当前已提交配对一致
    pub fn check_commit_base(
        staged: &StagedAssignment,
        current_pair_id: Option<&str>,
    ) -> EngineResult<()> {
        if current_pair_id == Some(staged.pair_id.as_str()) {
            return Ok(());
        }
        if staged.base_pair_id.as_deref() != current_pair_id {
            return Err(EngineError::Conflict {
                group_id: staged.group_id.clone(),
                reason: format!(
                    "暂存后组的已提交配对已变更: 暂存时={:?}, 当前={:?}",
                    staged.base_pair_id, current_pair_id
                ),
            });
        }
        Ok(())
    }

    /// 待移除的分配ID: 组内客户 且 属于指定配对
    pub fn plan_removal(
        group: &ClientGroup,
        pair_id: &str,
        assignments: &[Assignment],
    ) -> Vec<String> {
        assignments
            .iter()
            .filter(|a| a.volunteer_pair_id == pair_id && group.contains_client(&a.client_id))
            .map(|a| a.assignment_id.clone())
            .collect()
    }
}

/// 组当前已提交（ACTIVE）的配对
pub fn committed_pair_for_group<'a>(
    group_id: &str,
    assignments: &'a [Assignment],
) -> Option<&'a str> {
    assignments
        .iter()
        .find(|a| a.group_id == group_id && a.is_active())
        .map(|a| a.volunteer_pair_id.as_str())
}

/// 配对使用情况: pair_id → 分配到的组数（仅供参考）
pub fn pair_usage(assignments: &[Assignment]) -> BTreeMap<String, usize> {
    let mut groups: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for a in assignments.iter().filter(|a| a.is_active()) {
        groups
            .entry(a.volunteer_pair_id.clone())
            .or_default()
            .insert(a.group_id.as_str());
    }
    groups.into_iter().map(|(k, v)| (k, v.len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VolunteerStatus;

    fn volunteer(id: &str, languages: &[&str], regions: &[&str]) -> Volunteer {
        let mut v = Volunteer::new("P1", id, VolunteerStatus::Selected)
            .with_languages(languages)
            .with_regions(regions);
        v.volunteer_id = id.to_string();
        v
    }

    fn group_of(clients: &[Client]) -> ClientGroup {
        ClientGroup::new(
            "P1",
            "Central-1",
            "Central",
            clients.iter().map(|c| c.client_id.clone()).collect(),
            Vec::new(),
            true,
        )
    }

    #[test]
    fn test_build_assignments_one_per_client_full_match() {
        let clients = vec![
            Client::new("P1", "X", "Central").with_languages("English"),
            Client::new("P1", "Y", "Central").with_languages("English"),
            Client::new("P1", "Z", "Central").with_languages("Malay"),
        ];
        let group = group_of(&clients);
        let p1 = volunteer("p1", &["English"], &["Central"]);
        let p2 = volunteer("p2", &["Mandarin"], &["North"]);
        let pair = VolunteerPair::new("P1", "p1", "p2", 0.0, true);

        let assigner = Assigner::new(CompatibilityScorer::new());
        let (score, assignments) = assigner
            .build_assignments(&group, &clients, &pair, &p1, &p2)
            .unwrap();

        assert_eq!(score.confidence, 1.0);
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|a| a.confidence == 1.0 && a.volunteer_pair_id == pair.pair_id));
        assert!((assignments[0].language_match_pct - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_assignments_rejects_mismatched_volunteers() {
        let clients = vec![Client::new("P1", "X", "Central")];
        let group = group_of(&clients);
        let pair = VolunteerPair::new("P1", "p1", "p2", 0.0, true);
        let p1 = volunteer("p1", &[], &[]);
        let other = volunteer("zz", &[], &[]);

        let assigner = Assigner::new(CompatibilityScorer::new());
        assert!(assigner.build_assignments(&group, &clients, &pair, &p1, &other).is_err());
    }

    #[test]
    fn test_session_stage_conflict_and_idempotence() {
        let mut session = PlanningSession::new("P1");
        session.stage("G1", "PAIR-A", None).unwrap();
        session.stage("G1", "PAIR-A", None).unwrap();
        assert_eq!(session.len(), 1);

        let result = session.stage("G1", "PAIR-B", None);
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
        assert_eq!(session.get("G1").unwrap().pair_id, "PAIR-A");

        session.unstage("G1");
        session.stage("G1", "PAIR-B", None).unwrap();
        assert_eq!(session.get("G1").unwrap().pair_id, "PAIR-B");
    }

    #[test]
    fn test_take_all_drains_session() {
        let mut session = PlanningSession::new("P1");
        session.stage("G1", "A", None).unwrap();
        session.stage("G2", "A", None).unwrap();
        let taken = session.take_all();
        assert_eq!(taken.len(), 2);
        assert!(session.is_empty());
    }

    #[test]
    fn test_commit_base_detects_concurrent_change() {
        let staged = StagedAssignment {
            group_id: "G1".into(),
            pair_id: "NEW".into(),
            base_pair_id: Some("OLD".into()),
            staged_at: chrono::Local::now().naive_local(),
        };
        assert!(Assigner::check_commit_base(&staged, Some("OLD")).is_ok());
        assert!(Assigner::check_commit_base(&staged, Some("NEW")).is_ok());
        assert!(Assigner::check_commit_base(&staged, Some("OTHER")).is_err());
        assert!(Assigner::check_commit_base(&staged, None).is_err());
    }

    #[test]
    fn test_plan_removal_only_touches_that_pair() {
        let clients = vec![Client::new("P1", "X", "Central"), Client::new("P1", "Y", "Central")];
        let group = group_of(&clients);
        let pair = VolunteerPair::new("P1", "p1", "p2", 0.0, true);
        let assigner = Assigner::new(CompatibilityScorer::new());
        let (_, mut assignments) = assigner
            .build_assignments(&group, &clients, &pair, &volunteer("p1", &[], &[]), &volunteer("p2", &[], &[]))
            .unwrap();
        assignments[1].volunteer_pair_id = "OTHER".into();

        let removed = Assigner::plan_removal(&group, &pair.pair_id, &assignments);
        assert_eq!(removed, vec![assignments[0].assignment_id.clone()]);
    }

    #[test]
    fn test_pair_usage_counts_groups_without_cap() {
        let mk = |group: &str, pair: &str, client: &str| Assignment {
            assignment_id: uuid::Uuid::new_v4().to_string(),
            project_id: "P1".into(),
            client_id: client.into(),
            group_id: group.into(),
            volunteer_pair_id: pair.into(),
            language_match: false,
            region_match: false,
            language_match_pct: 0.0,
            region_match_pct: 0.0,
            confidence: 0.0,
            status: AssignmentStatus::Active,
            assigned_at: chrono::Local::now().naive_local(),
        };
        let assignments = vec![
            mk("G1", "A", "c1"),
            mk("G1", "A", "c2"),
            mk("G2", "A", "c3"),
            mk("G3", "A", "c4"),
            mk("G4", "B", "c5"),
        ];
        let usage = pair_usage(&assignments);
        assert_eq!(usage.get("A"), Some(&3));
        assert_eq!(usage.get("B"), Some(&1));
        assert_eq!(committed_pair_for_group("G4", &assignments), Some("B"));
    }
}
