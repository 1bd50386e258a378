// ==========================================
// 志愿者配对系统 - 区域聚类引擎
// ==========================================
// 职责: 按区域名或地理距离对客户聚类
// 输入: 客户列表（稳定顺序）+ 聚类模式
// 输出: 聚类列表 + 未编码客户列表
// ==========================================
// 红线: 每个客户恰好出现在一个聚类或未编码列表中，不得静默丢弃
// ==========================================

use crate::domain::client::Client;
use crate::domain::types::ClusterMode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// 默认聚类半径（公里）
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 2.0;

// ==========================================
// 聚类结果
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationCluster {
    pub label: String,                  // NAME: 区域名; GEO: 种子客户区域名
    pub seed_client_id: Option<String>, // 仅 GEO 模式
    pub clients: Vec<Client>,           // 非空，保持输入顺序
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResult {
    pub mode: ClusterMode,
    pub clusters: Vec<LocationCluster>,
    pub ungeocoded: Vec<Client>, // 仅 GEO 模式下非空
}

impl ClusterResult {
    pub fn clustered_count(&self) -> usize {
        self.clusters.iter().map(|c| c.clients.len()).sum()
    }
}

// ==========================================
// LocationClusterer - 区域聚类引擎
// ==========================================
pub struct LocationClusterer {
    max_distance_km: f64,
}

impl Default for LocationClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE_KM)
    }
}

impl LocationClusterer {
    /// # 参数
    /// - `max_distance_km`: 与种子客户的最大距离（非正数或非法值回退为默认 2.0）
    pub fn new(max_distance_km: f64) -> Self {
        let max_distance_km = if max_distance_km.is_finite() && max_distance_km > 0.0 {
            max_distance_km
        } else {
            DEFAULT_MAX_DISTANCE_KM
        };
        Self { max_distance_km }
    }

    pub fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }

    #[instrument(skip(self, clients), fields(clients_count = clients.len(), mode = %mode))]
    pub fn cluster(&self, clients: &[Client], mode: ClusterMode) -> ClusterResult {
        let result = match mode {
            ClusterMode::Name => self.cluster_by_name(clients),
            ClusterMode::Geo => self.cluster_by_geo(clients),
        };
        tracing::debug!(
            clusters = result.clusters.len(),
            ungeocoded = result.ungeocoded.len(),
            "聚类完成"
        );
        result
    }

    /// NAME 模式: location 精确（大小写敏感）匹配，聚类按首次出现排序
    pub fn cluster_by_name(&self, clients: &[Client]) -> ClusterResult {
        let mut clusters: Vec<LocationCluster> = Vec::new();
        for client in clients {
            match clusters.iter_mut().find(|c| c.label == client.location) {
                Some(cluster) => cluster.clients.push(client.clone()),
                None => clusters.push(LocationCluster {
                    label: client.location.clone(),
                    seed_client_id: None,
                    clients: vec![client.clone()],
                }),
            }
        }
        ClusterResult {
            mode: ClusterMode::Name,
            clusters,
            ungeocoded: Vec::new(),
        }
    }

    /// GEO 模式: 贪心种子扫描
    ///
    /// 1) 取下一个未处理且有坐标的客户作为种子
    /// 2) 扫描其余未处理客户，与**种子**距离 ≤ max_distance_km 的加入本簇（非传递）
    /// 3) 标记已处理，重复
    pub fn cluster_by_geo(&self, clients: &[Client]) -> ClusterResult {
        let (located, ungeocoded): (Vec<&Client>, Vec<&Client>) =
            clients.iter().partition(|c| c.geo_point().is_some());

        let mut processed = vec![false; located.len()];
        let mut clusters = Vec::new();

        for seed_idx in 0..located.len() {
            if processed[seed_idx] {
                continue;
            }
            processed[seed_idx] = true;

            let seed = located[seed_idx];
            let Some(seed_point) = seed.geo_point() else {
                continue;
            };
            let mut members = vec![seed.clone()];

            for idx in (seed_idx + 1)..located.len() {
                if processed[idx] {
                    continue;
                }
                let within = located[idx]
                    .geo_point()
                    .map(|p| seed_point.haversine_km(&p) <= self.max_distance_km)
                    .unwrap_or(false);
                if within {
                    processed[idx] = true;
                    members.push(located[idx].clone());
                }
            }

            clusters.push(LocationCluster {
                label: seed.location.clone(),
                seed_client_id: Some(seed.client_id.clone()),
                clients: members,
            });
        }

        if !ungeocoded.is_empty() {
            tracing::warn!(count = ungeocoded.len(), "存在未地理编码客户，已单独列出");
        }

        ClusterResult {
            mode: ClusterMode::Geo,
            clusters,
            ungeocoded: ungeocoded.into_iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 纬度 1 度 ≈ 111.195 km
    const KM_PER_DEG_LAT: f64 = 111.195;

    fn at_km_north(name: &str, km: f64) -> Client {
        Client::new("P1", name, "Central").with_coordinates(1.30 + km / KM_PER_DEG_LAT, 103.80)
    }

    #[test]
    fn test_name_mode_is_case_sensitive_and_ordered() {
        let clients = vec![
            Client::new("P1", "A", "Central"),
            Client::new("P1", "B", "central"),
            Client::new("P1", "C", "Central"),
            Client::new("P1", "D", "East"),
        ];
        let result = LocationClusterer::default().cluster(&clients, ClusterMode::Name);
        let labels: Vec<&str> = result.clusters.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Central", "central", "East"]);
        assert_eq!(result.clusters[0].clients.len(), 2);
        assert_eq!(result.clustered_count(), 4);
    }

    #[test]
    fn test_geo_clients_1_5km_apart_cluster_together() {
        let clients = vec![at_km_north("A", 0.0), at_km_north("B", 1.5)];
        let clusterer = LocationClusterer::new(2.0);

        let result = clusterer.cluster(&clients, ClusterMode::Geo);
        assert_eq!(result.clusters.len(), 1);

        // 反向种子顺序
        let reversed: Vec<Client> = clients.iter().rev().cloned().collect();
        let result = clusterer.cluster(&reversed, ClusterMode::Geo);
        assert_eq!(result.clusters.len(), 1);
    }

    #[test]
    fn test_geo_clients_5km_apart_never_cluster() {
        let clients = vec![at_km_north("A", 0.0), at_km_north("B", 5.0)];
        let result = LocationClusterer::new(2.0).cluster(&clients, ClusterMode::Geo);
        assert_eq!(result.clusters.len(), 2);
    }

    #[test]
    fn test_geo_membership_is_seed_relative_not_transitive() {
        // A-1.5km-B-1.5km-C: C 距种子 A 3km，不得加入 A 的簇
        let clients = vec![
            at_km_north("A", 0.0),
            at_km_north("B", 1.5),
            at_km_north("C", 3.0),
        ];
        let result = LocationClusterer::new(2.0).cluster(&clients, ClusterMode::Geo);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters[0].clients.len(), 2);
        assert_eq!(result.clusters[1].clients[0].name, "C");
        assert_eq!(
            result.clusters[1].seed_client_id.as_deref(),
            Some(result.clusters[1].clients[0].client_id.as_str())
        );
    }

    #[test]
    fn test_geo_ungeocoded_reported_separately() {
        let clients = vec![
            at_km_north("A", 0.0),
            Client::new("P1", "NoGeo", "East"),
            at_km_north("B", 0.5),
        ];
        let result = LocationClusterer::new(2.0).cluster(&clients, ClusterMode::Geo);
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.ungeocoded.len(), 1);
        assert_eq!(result.ungeocoded[0].name, "NoGeo");
        assert_eq!(result.clustered_count() + result.ungeocoded.len(), clients.len());
    }

    #[test]
    fn test_invalid_radius_falls_back_to_default() {
        assert_eq!(LocationClusterer::new(-1.0).max_distance_km(), DEFAULT_MAX_DISTANCE_KM);
        assert_eq!(LocationClusterer::new(f64::NAN).max_distance_km(), DEFAULT_MAX_DISTANCE_KM);
    }
}
