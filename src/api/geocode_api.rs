// ==========================================
// 志愿者配对系统 - 地理编码 API
// ==========================================
// 职责: 为缺少坐标的客户批量解析坐标并落库
// 说明: 外部调用在项目锁外执行；只在写回坐标时持锁
// ==========================================

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::json;

use crate::api::common::ProjectGate;
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::geocoding::{GeocodeBatch, GeocodeReport, GeocodingOracle};
use crate::repository::ClientRepository;

pub struct GeocodeApi {
    gate: Arc<ProjectGate>,
    client_repo: Arc<ClientRepository>,
    config_manager: Arc<ConfigManager>,
    oracle: Option<Arc<dyn GeocodingOracle>>,
}

impl GeocodeApi {
    pub fn new(
        gate: Arc<ProjectGate>,
        client_repo: Arc<ClientRepository>,
        config_manager: Arc<ConfigManager>,
        oracle: Option<Arc<dyn GeocodingOracle>>,
    ) -> Self {
        Self {
            gate,
            client_repo,
            config_manager,
            oracle,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.oracle.is_some()
    }

    /// 批量地理编码
    ///
    /// # 参数
    /// - `cancel`: 置为 true 后剩余客户记为取消，已解析的坐标仍会写回
    pub async fn geocode_clients(
        &self,
        project_id: &str,
        cancel: &AtomicBool,
        actor: &str,
    ) -> ApiResult<GeocodeReport> {
        let oracle = self
            .oracle
            .clone()
            .ok_or_else(|| ApiError::ExternalDependency("未配置地理编码服务".to_string()))?;
        self.gate.load_open_project(project_id)?;

        let config = self.config_manager.get_geocode_config(project_id)?;
        let pending: Vec<_> = self
            .client_repo
            .find_by_project(project_id)?
            .into_iter()
            .filter(|c| c.geo_point().is_none())
            .collect();
        if pending.is_empty() {
            return Ok(GeocodeReport {
                clients: Vec::new(),
                failures: Vec::new(),
                resolved_count: 0,
            });
        }

        let report = GeocodeBatch::new(oracle, config).run(pending, cancel).await;

        if report.resolved_count > 0 {
            self.gate.mutate(project_id, actor, |_| {
                let log = ActionLog::new(
                    project_id,
                    ActionType::GeocodeClients,
                    actor,
                    Some(json!({
                        "resolved": report.resolved_count,
                        "failed": report.failures.len(),
                    })),
                    None,
                );
                self.client_repo
                    .update_coordinates(project_id, &report.clients, &log)?;
                Ok(())
            })?;
        }

        Ok(report)
    }
}
