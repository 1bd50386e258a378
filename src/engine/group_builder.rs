// ==========================================
// 志愿者配对系统 - 客户组构建引擎
// ==========================================
// 职责: 聚类 → 容量受限的客户组（自动 / 人工 / 编辑）
// 红线: 必须 1..=3, 可选 0..=2, 合计 ≤ 5；违规整体拒绝，不做部分修改
// ==========================================

use crate::domain::client::Client;
use crate::domain::group::{ClientGroup, GroupCapacity, GroupMembershipRequest};
use crate::engine::clusterer::LocationCluster;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// 区域为空的聚类使用的组名前缀与区域
pub const UNNAMED_LOCATION_LABEL: &str = "Ungrouped";

// ==========================================
// GroupBuilder - 客户组构建引擎
// ==========================================
pub struct GroupBuilder {
    capacity: GroupCapacity,
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new(GroupCapacity::default())
    }
}

impl GroupBuilder {
    pub fn new(capacity: GroupCapacity) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> &GroupCapacity {
        &self.capacity
    }

    // ==========================================
    // 自动建组
    // ==========================================

    /// 将每个聚类切分为连续的 ≤ max_total 片段
    ///
    /// 规则：
    /// 1) 片段内前 max_mandatory 个为必须客户，其余为可选客户
    /// 2) 组名 = "{label}-{seq}"，seq 按 label 递增，并跳过 existing_names 已占用的序号
    /// 3) label 为空白时使用 UNNAMED_LOCATION_LABEL
    ///
    /// # 参数
    /// - `clusters`: 聚类结果（客户应已排除已入组客户）
    /// - `existing_names`: 项目内已有组名
    #[instrument(skip(self, clusters, existing_names), fields(clusters_count = clusters.len()))]
    pub fn build_auto(
        &self,
        project_id: &str,
        clusters: &[LocationCluster],
        existing_names: &[String],
    ) -> Vec<ClientGroup> {
        let chunk_size = self.capacity.max_total();
        let mut next_seq: HashMap<String, usize> = HashMap::new();
        let mut groups = Vec::new();

        for cluster in clusters {
            let label = match cluster.label.trim() {
                "" => UNNAMED_LOCATION_LABEL,
                trimmed => trimmed,
            };
            let seq = next_seq
                .entry(label.to_string())
                .or_insert_with(|| max_existing_seq(label, existing_names) + 1);

            for chunk in cluster.clients.chunks(chunk_size) {
                let split = chunk.len().min(self.capacity.max_mandatory);
                let mandatory = chunk[..split].iter().map(|c| c.client_id.clone()).collect();
                let optional = chunk[split..].iter().map(|c| c.client_id.clone()).collect();

                groups.push(ClientGroup::new(
                    project_id,
                    &format!("{}-{}", label, seq),
                    label,
                    mandatory,
                    optional,
                    true,
                ));
                *seq += 1;
            }
        }

        tracing::debug!(groups = groups.len(), "自动建组完成");
        groups
    }

    // ==========================================
    // 人工建组 / 编辑
    // ==========================================

    /// 校验完整成员列表
    ///
    /// # 参数
    /// - `clients`: 项目内全部客户
    /// - `membership`: 现有 client_id → group_id 映射
    /// - `editing_group_id`: 编辑时为被编辑组ID（其原成员不视为冲突）
    ///
    /// # 返回
    /// - Ok(ClientGroup): 新组（编辑时由调用方保留原 group_id）
    /// - Err(EngineError::Validation / NotFound): 整体拒绝
    pub fn validate_membership(
        &self,
        project_id: &str,
        request: &GroupMembershipRequest,
        clients: &[Client],
        membership: &HashMap<String, String>,
        editing_group_id: Option<&str>,
    ) -> EngineResult<ClientGroup> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("组名不能为空"));
        }

        let mandatory_count = request.mandatory_clients.len();
        if mandatory_count == 0 {
            return Err(EngineError::validation("至少需要1名必须客户"));
        }
        if mandatory_count > self.capacity.max_mandatory {
            return Err(EngineError::validation(format!(
                "必须客户最多{}名，实际{}名",
                self.capacity.max_mandatory, mandatory_count
            )));
        }
        if request.optional_clients.len() > self.capacity.max_optional {
            return Err(EngineError::validation(format!(
                "可选客户最多{}名，实际{}名",
                self.capacity.max_optional,
                request.optional_clients.len()
            )));
        }

        let by_id: HashMap<&str, &Client> =
            clients.iter().map(|c| (c.client_id.as_str(), c)).collect();
        let mut seen = HashSet::new();
        for client_id in request
            .mandatory_clients
            .iter()
            .chain(request.optional_clients.iter())
        {
            if !seen.insert(client_id.as_str()) {
                return Err(EngineError::validation(format!(
                    "客户{}在组内重复出现",
                    client_id
                )));
            }
            if !by_id.contains_key(client_id.as_str()) {
                return Err(EngineError::not_found("Client", client_id));
            }
            if let Some(owner) = membership.get(client_id) {
                if Some(owner.as_str()) != editing_group_id {
                    return Err(EngineError::validation(format!(
                        "客户{}已属于客户组{}",
                        client_id, owner
                    )));
                }
            }
        }

        let location = request
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| {
                by_id
                    .get(request.mandatory_clients[0].as_str())
                    .map(|c| c.location.clone())
            })
            .unwrap_or_default();

        Ok(ClientGroup::new(
            project_id,
            name,
            &location,
            request.mandatory_clients.clone(),
            request.optional_clients.clone(),
            false,
        ))
    }

    /// 编辑: 整体替换成员（保留 group_id 与 created_at）
    pub fn apply_edit(&self, existing: &ClientGroup, validated: ClientGroup) -> ClientGroup {
        ClientGroup {
            group_id: existing.group_id.clone(),
            project_id: existing.project_id.clone(),
            created_at: existing.created_at,
            updated_at: chrono::Local::now().naive_local(),
            is_auto: false,
            ..validated
        }
    }
}

// 解析 "{label}-{n}" 形式的已有组名中最大的 n
fn max_existing_seq(label: &str, existing_names: &[String]) -> usize {
    let prefix = format!("{}-", label);
    existing_names
        .iter()
        .filter_map(|name| name.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(label: &str, n: usize) -> LocationCluster {
        LocationCluster {
            label: label.to_string(),
            seed_client_id: None,
            clients: (0..n)
                .map(|i| Client::new("P1", &format!("{}{}", label, i), label))
                .collect(),
        }
    }

    #[test]
    fn test_auto_chunks_of_five_three_mandatory() {
        let builder = GroupBuilder::default();
        let groups = builder.build_auto("P1", &[cluster("Central", 7)], &[]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Central-1");
        assert_eq!(groups[0].mandatory_clients.len(), 3);
        assert_eq!(groups[0].optional_clients.len(), 2);
        assert_eq!(groups[1].name, "Central-2");
        assert_eq!(groups[1].mandatory_clients.len(), 2);
        assert_eq!(groups[1].optional_clients.len(), 0);
        assert!(groups.iter().all(|g| g.is_auto));
    }

    #[test]
    fn test_auto_naming_continues_after_existing_and_across_clusters() {
        let builder = GroupBuilder::default();
        let existing = vec!["East-1".to_string(), "East-4".to_string(), "Eastside-9".to_string()];
        let groups = builder.build_auto("P1", &[cluster("East", 2), cluster("East", 1)], &existing);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["East-5", "East-6"]);
    }

    #[test]
    fn test_auto_blank_location_gets_fallback_label() {
        let builder = GroupBuilder::default();
        let existing = vec![format!("{}-1", UNNAMED_LOCATION_LABEL)];
        let groups = builder.build_auto("P1", &[cluster("", 2), cluster("  ", 1)], &existing);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Ungrouped-2", "Ungrouped-3"]);
        assert!(groups.iter().all(|g| g.location == UNNAMED_LOCATION_LABEL));
    }

    #[test]
    fn test_manual_rejects_capacity_violations() {
        let builder = GroupBuilder::default();
        let clients: Vec<Client> = (0..6).map(|i| Client::new("P1", &format!("C{}", i), "Central")).collect();
        let ids: Vec<String> = clients.iter().map(|c| c.client_id.clone()).collect();
        let membership = HashMap::new();

        let cases = vec![
            GroupMembershipRequest { name: "  ".into(), mandatory_clients: vec![ids[0].clone()], ..Default::default() },
            GroupMembershipRequest { name: "G".into(), ..Default::default() },
            GroupMembershipRequest { name: "G".into(), mandatory_clients: ids[0..4].to_vec(), ..Default::default() },
            GroupMembershipRequest {
                name: "G".into(),
                mandatory_clients: vec![ids[0].clone()],
                optional_clients: ids[1..4].to_vec(),
                ..Default::default()
            },
        ];
        for request in cases {
            let result = builder.validate_membership("P1", &request, &clients, &membership, None);
            assert!(matches!(result, Err(EngineError::Validation { .. })), "{:?}", request);
        }
    }

    #[test]
    fn test_manual_rejects_client_grouped_elsewhere_but_allows_own_group_on_edit() {
        let builder = GroupBuilder::default();
        let clients = vec![Client::new("P1", "C0", "Central"), Client::new("P1", "C1", "Central")];
        let mut membership = HashMap::new();
        membership.insert(clients[0].client_id.clone(), "G-OTHER".to_string());

        let request = GroupMembershipRequest {
            name: "G".into(),
            mandatory_clients: vec![clients[0].client_id.clone()],
            ..Default::default()
        };
        assert!(builder
            .validate_membership("P1", &request, &clients, &membership, None)
            .is_err());
        assert!(builder
            .validate_membership("P1", &request, &clients, &membership, Some("G-OTHER"))
            .is_ok());
    }

    #[test]
    fn test_manual_unknown_client_is_not_found() {
        let builder = GroupBuilder::default();
        let request = GroupMembershipRequest {
            name: "G".into(),
            mandatory_clients: vec!["missing".into()],
            ..Default::default()
        };
        let result = builder.validate_membership("P1", &request, &[], &HashMap::new(), None);
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_location_defaults_to_first_mandatory_client() {
        let builder = GroupBuilder::default();
        let clients = vec![Client::new("P1", "C0", "Woodlands")];
        let request = GroupMembershipRequest {
            name: "Custom".into(),
            mandatory_clients: vec![clients[0].client_id.clone()],
            ..Default::default()
        };
        let group = builder
            .validate_membership("P1", &request, &clients, &HashMap::new(), None)
            .unwrap();
        assert_eq!(group.location, "Woodlands");
        assert!(!group.is_auto);
    }
}
