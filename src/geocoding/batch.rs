// ==========================================
// 志愿者配对系统 - 批量地理编码
// ==========================================
// 职责: 顺序、限流、逐地址超时地解析客户坐标
// 红线: 单个地址失败/超时/取消只影响该客户，不中断整批
// 说明: 已有坐标的客户不重复解析；结果逐条累积，取消不破坏已完成部分
// ==========================================

use crate::domain::client::Client;
use crate::geocoding::oracle::GeocodingOracle;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 默认单地址超时（毫秒）
pub const DEFAULT_GEOCODE_TIMEOUT_MS: u64 = 5_000;
/// 默认请求间隔（毫秒）
pub const DEFAULT_GEOCODE_MIN_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct GeocodeBatchConfig {
    pub per_address_timeout: Duration,
    pub min_interval: Duration,
}

impl Default for GeocodeBatchConfig {
    fn default() -> Self {
        Self {
            per_address_timeout: Duration::from_millis(DEFAULT_GEOCODE_TIMEOUT_MS),
            min_interval: Duration::from_millis(DEFAULT_GEOCODE_MIN_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeocodeFailureReason {
    NoAddress,
    NotFound,
    Timeout,
    Error(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeFailure {
    pub client_id: String,
    pub address: Option<String>,
    pub reason: GeocodeFailureReason,
}

/// 批量解析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeReport {
    /// 全部输入客户（顺序不变；成功者已写入坐标）
    pub clients: Vec<Client>,
    pub failures: Vec<GeocodeFailure>,
    pub resolved_count: usize,
}

// ==========================================
// GeocodeBatch - 批量地理编码
// ==========================================
pub struct GeocodeBatch {
    oracle: Arc<dyn GeocodingOracle>,
    config: GeocodeBatchConfig,
}

impl GeocodeBatch {
    pub fn new(oracle: Arc<dyn GeocodingOracle>, config: GeocodeBatchConfig) -> Self {
        Self { oracle, config }
    }

    /// 解析缺少坐标的客户
    ///
    /// # 参数
    /// - `cancel`: 置为 true 后剩余客户记为 Cancelled
    pub async fn run(&self, clients: Vec<Client>, cancel: &AtomicBool) -> GeocodeReport {
        let calls = AtomicUsize::new(0);
        let outcomes: Vec<(Client, Option<GeocodeFailure>, bool)> = stream::iter(clients)
            .then(|client| self.resolve_one(client, cancel, &calls))
            .collect()
            .await;

        let mut report = GeocodeReport {
            clients: Vec::with_capacity(outcomes.len()),
            failures: Vec::new(),
            resolved_count: 0,
        };
        for (client, failure, resolved) in outcomes {
            if resolved {
                report.resolved_count += 1;
            }
            if let Some(f) = failure {
                report.failures.push(f);
            }
            report.clients.push(client);
        }

        tracing::info!(
            total = report.clients.len(),
            resolved = report.resolved_count,
            failed = report.failures.len(),
            "批量地理编码完成"
        );
        report
    }

    async fn resolve_one(
        &self,
        mut client: Client,
        cancel: &AtomicBool,
        calls: &AtomicUsize,
    ) -> (Client, Option<GeocodeFailure>, bool) {
        if client.geo_point().is_some() {
            return (client, None, false);
        }

        let address = client
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let failure = |client: &Client, reason| GeocodeFailure {
            client_id: client.client_id.clone(),
            address: client.address.clone(),
            reason,
        };

        if cancel.load(Ordering::SeqCst) {
            let f = failure(&client, GeocodeFailureReason::Cancelled);
            return (client, Some(f), false);
        }
        let Some(address) = address else {
            let f = failure(&client, GeocodeFailureReason::NoAddress);
            return (client, Some(f), false);
        };

        // 限流: 第二次及以后的调用前等待
        if calls.fetch_add(1, Ordering::SeqCst) > 0 && !self.config.min_interval.is_zero() {
            tokio::time::sleep(self.config.min_interval).await;
            if cancel.load(Ordering::SeqCst) {
                let f = failure(&client, GeocodeFailureReason::Cancelled);
                return (client, Some(f), false);
            }
        }

        let reason = match tokio::time::timeout(
            self.config.per_address_timeout,
            self.oracle.resolve(&address),
        )
        .await
        {
            Ok(Ok(Some(point))) if point.is_valid() => {
                client.coordinates = Some(point);
                return (client, None, true);
            }
            Ok(Ok(_)) => GeocodeFailureReason::NotFound,
            Ok(Err(e)) => GeocodeFailureReason::Error(e.to_string()),
            Err(_) => GeocodeFailureReason::Timeout,
        };

        tracing::warn!(
            client_id = %client.client_id,
            address = %address,
            reason = ?reason,
            "地理编码失败，客户将不参与本次地理聚类"
        );
        let f = failure(&client, reason);
        (client, Some(f), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::GeoPoint;
    use crate::geocoding::oracle::GeocodeError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeOracle {
        points: HashMap<String, GeoPoint>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodingOracle for FakeOracle {
        async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match address {
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(None)
                }
                "boom" => Err(GeocodeError::Http("status=503".into())),
                other => Ok(self.points.get(other).copied()),
            }
        }
    }

    fn fast_config() -> GeocodeBatchConfig {
        GeocodeBatchConfig {
            per_address_timeout: Duration::from_millis(50),
            min_interval: Duration::ZERO,
        }
    }

    fn oracle() -> Arc<FakeOracle> {
        let mut points = HashMap::new();
        points.insert("1 Main St".to_string(), GeoPoint::new(1.30, 103.80));
        Arc::new(FakeOracle {
            points,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_failures_degrade_only_affected_clients() {
        let fake = oracle();
        let batch = GeocodeBatch::new(fake.clone(), fast_config());
        let clients = vec![
            Client::new("P1", "ok", "Central").with_address("1 Main St"),
            Client::new("P1", "slow", "Central").with_address("slow"),
            Client::new("P1", "err", "Central").with_address("boom"),
            Client::new("P1", "miss", "Central").with_address("nowhere"),
            Client::new("P1", "blank", "Central"),
            Client::new("P1", "known", "Central").with_coordinates(1.31, 103.81),
        ];

        let report = batch.run(clients, &AtomicBool::new(false)).await;

        assert_eq!(report.clients.len(), 6);
        assert_eq!(report.resolved_count, 1);
        assert!(report.clients[0].coordinates.is_some());
        let reasons: Vec<&GeocodeFailureReason> = report.failures.iter().map(|f| &f.reason).collect();
        assert_eq!(reasons.len(), 4);
        assert_eq!(reasons[0], &GeocodeFailureReason::Timeout);
        assert!(matches!(reasons[1], GeocodeFailureReason::Error(_)));
        assert_eq!(reasons[2], &GeocodeFailureReason::NotFound);
        assert_eq!(reasons[3], &GeocodeFailureReason::NoAddress);
        // 已有坐标的客户不调用服务
        assert_eq!(fake.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_batch_keeps_clients() {
        let batch = GeocodeBatch::new(oracle(), fast_config());
        let clients = vec![
            Client::new("P1", "a", "Central").with_address("1 Main St"),
            Client::new("P1", "b", "Central").with_address("1 Main St"),
        ];

        let report = batch.run(clients, &AtomicBool::new(true)).await;
        assert_eq!(report.clients.len(), 2);
        assert_eq!(report.resolved_count, 0);
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == GeocodeFailureReason::Cancelled));
    }
}
