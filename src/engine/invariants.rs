// ==========================================
// 志愿者配对系统 - 不变量校验
// ==========================================
// 职责: 集中定义跨实体不变量，供 API 层落库前守卫与性质测试复用
// 说明: 配对可跨组无限复用，不在此处设上限
// ==========================================

use crate::domain::group::{ClientGroup, GroupCapacity};
use crate::domain::pair::{Assignment, Replacement, VolunteerPair};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("客户组容量违规: group={group_id}, mandatory={mandatory}, optional={optional}")]
    GroupCapacity {
        group_id: String,
        mandatory: usize,
        optional: usize,
    },

    #[error("客户重复入组: client={client_id}, groups={groups:?}")]
    ClientInMultipleGroups {
        client_id: String,
        groups: Vec<String>,
    },

    #[error("志愿者重复配对: volunteer={volunteer_id}, pairs={pairs:?}")]
    VolunteerInMultiplePairs {
        volunteer_id: String,
        pairs: Vec<String>,
    },

    #[error("配对成员不合法: pair={pair_id}")]
    PairMembersNotDistinct { pair_id: String },

    #[error("客户存在多条分配: client={client_id}, count={count}")]
    DuplicateAssignment { client_id: String, count: usize },

    #[error("替补操作改写了原配对: pair={pair_id}")]
    ReplacementCascaded { pair_id: String },
}

/// 组容量: 1 ≤ 必须 ≤ max_mandatory, 0 ≤ 可选 ≤ max_optional, 合计 ≤ max_total
pub fn check_group_capacity(
    group: &ClientGroup,
    capacity: &GroupCapacity,
) -> Result<(), InvariantViolation> {
    let mandatory = group.mandatory_clients.len();
    let optional = group.optional_clients.len();
    let ok = (1..=capacity.max_mandatory).contains(&mandatory)
        && optional <= capacity.max_optional
        && mandatory + optional <= capacity.max_total();
    if ok {
        Ok(())
    } else {
        Err(InvariantViolation::GroupCapacity {
            group_id: group.group_id.clone(),
            mandatory,
            optional,
        })
    }
}

/// 每个客户最多属于一个客户组（组内重复也视为违规）
pub fn check_client_single_group(groups: &[ClientGroup]) -> Result<(), InvariantViolation> {
    let mut seen: HashMap<&str, Vec<String>> = HashMap::new();
    for group in groups {
        for client_id in group.client_ids() {
            seen.entry(client_id.as_str())
                .or_default()
                .push(group.group_id.clone());
        }
    }
    match seen.into_iter().find(|(_, g)| g.len() > 1) {
        Some((client_id, groups)) => Err(InvariantViolation::ClientInMultipleGroups {
            client_id: client_id.to_string(),
            groups,
        }),
        None => Ok(()),
    }
}

/// 每名志愿者最多属于一个有效配对，且配对两名成员互不相同
pub fn check_volunteer_single_pair(pairs: &[VolunteerPair]) -> Result<(), InvariantViolation> {
    let mut seen: HashMap<&str, Vec<String>> = HashMap::new();
    for pair in pairs {
        if pair.volunteer1_id == pair.volunteer2_id {
            return Err(InvariantViolation::PairMembersNotDistinct {
                pair_id: pair.pair_id.clone(),
            });
        }
        for member in pair.members() {
            seen.entry(member).or_default().push(pair.pair_id.clone());
        }
    }
    match seen.into_iter().find(|(_, p)| p.len() > 1) {
        Some((volunteer_id, pairs)) => Err(InvariantViolation::VolunteerInMultiplePairs {
            volunteer_id: volunteer_id.to_string(),
            pairs,
        }),
        None => Ok(()),
    }
}

/// 每个客户最多一条分配记录
pub fn check_single_assignment_per_client(
    assignments: &[Assignment],
) -> Result<(), InvariantViolation> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in assignments {
        *counts.entry(a.client_id.as_str()).or_default() += 1;
    }
    match counts.into_iter().find(|(_, n)| *n > 1) {
        Some((client_id, count)) => Err(InvariantViolation::DuplicateAssignment {
            client_id: client_id.to_string(),
            count,
        }),
        None => Ok(()),
    }
}

/// 替补映射只替换缺席成员，不改写配对的其他任何字段
///
/// # 参数
/// - `stored`: 库中原配对记录
/// - `applied`: 应用替补映射后的配对（与 `stored` 一一对应）
/// - `replacements`: 替补映射
pub fn check_replacements_not_cascaded(
    stored: &[VolunteerPair],
    applied: &[VolunteerPair],
    replacements: &[Replacement],
) -> Result<(), InvariantViolation> {
    let substitute = |pair_id: &str, member: &str| -> String {
        replacements
            .iter()
            .find(|r| r.pair_id == pair_id && r.absent_volunteer_id == member)
            .map(|r| r.substitute_volunteer_id.clone())
            .unwrap_or_else(|| member.to_string())
    };

    let applied_by_id: HashMap<&str, &VolunteerPair> =
        applied.iter().map(|p| (p.pair_id.as_str(), p)).collect();
    for pair in stored {
        let mut expected = pair.clone();
        expected.volunteer1_id = substitute(&pair.pair_id, &pair.volunteer1_id);
        expected.volunteer2_id = substitute(&pair.pair_id, &pair.volunteer2_id);
        match applied_by_id.get(pair.pair_id.as_str()) {
            Some(current) if **current == expected => {}
            _ => {
                return Err(InvariantViolation::ReplacementCascaded {
                    pair_id: pair.pair_id.clone(),
                })
            }
        }
    }
    if applied.len() != stored.len() {
        if let Some(extra) = applied
            .iter()
            .find(|p| !stored.iter().any(|s| s.pair_id == p.pair_id))
        {
            return Err(InvariantViolation::ReplacementCascaded {
                pair_id: extra.pair_id.clone(),
            });
        }
    }
    Ok(())
}
