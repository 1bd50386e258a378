// ==========================================
// 志愿者配对系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (project_id + key → value)
// 说明: 值以字符串存储，读取时解析；缺失或格式错误回退默认值
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::group::GroupCapacity;
use crate::domain::types::ClusterMode;
use crate::engine::attendance::AttendancePolicy;
use crate::engine::clusterer::DEFAULT_MAX_DISTANCE_KM;
use crate::geocoding::batch::{
    GeocodeBatchConfig, DEFAULT_GEOCODE_MIN_INTERVAL_MS, DEFAULT_GEOCODE_TIMEOUT_MS,
};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取项目配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, project_id: &str, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE project_id = ?1 AND key = ?2",
            params![project_id, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入项目配置值（UPSERT，与操作日志同一事务）
    pub fn set_config_value(
        &self,
        project_id: &str,
        key: &str,
        value: &str,
        log: &ActionLog,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO config_kv (project_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(project_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')
            "#,
            params![project_id, key, value],
        )?;
        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    fn get_config_or_default(&self, project_id: &str, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(project_id, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析；格式错误记录告警并回退默认值
    fn get_parsed<T: FromStr>(&self, project_id: &str, key: &str, default: T) -> RepositoryResult<T> {
        let Some(raw) = self.get_config_value(project_id, key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    project_id,
                    config_key = key,
                    raw_value = %raw,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取项目配置快照（JSON格式，键有序）
    pub fn get_config_snapshot(&self, project_id: &str) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE project_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 聚类配置 =====

    /// 地理聚类半径（公里，默认 2.0；非正数回退默认）
    pub fn get_max_distance_km(&self, project_id: &str) -> RepositoryResult<f64> {
        let v = self.get_parsed(project_id, config_keys::MAX_DISTANCE_KM, DEFAULT_MAX_DISTANCE_KM)?;
        Ok(if v.is_finite() && v > 0.0 { v } else { DEFAULT_MAX_DISTANCE_KM })
    }

    /// 聚类模式（默认 NAME）
    pub fn get_cluster_mode(&self, project_id: &str) -> RepositoryResult<ClusterMode> {
        let value = self.get_config_or_default(project_id, config_keys::CLUSTER_MODE, "NAME")?;
        Ok(ClusterMode::from_str(&value).unwrap_or(ClusterMode::Name))
    }

    // ===== 客户组配置 =====

    /// 客户组容量（超出上限的配置值会被截断）
    pub fn get_group_capacity(&self, project_id: &str) -> RepositoryResult<GroupCapacity> {
        let defaults = GroupCapacity::default();
        let max_mandatory = self.get_parsed(project_id, config_keys::MAX_MANDATORY, defaults.max_mandatory)?;
        let max_optional = self.get_parsed(project_id, config_keys::MAX_OPTIONAL, defaults.max_optional)?;
        Ok(GroupCapacity::new(max_mandatory, max_optional))
    }

    // ===== 出勤配置 =====

    pub fn get_attendance_policy(&self, project_id: &str) -> RepositoryResult<AttendancePolicy> {
        let unknown_needs_replacement =
            self.get_parsed(project_id, config_keys::UNKNOWN_NEEDS_REPLACEMENT, true)?;
        Ok(AttendancePolicy {
            unknown_needs_replacement,
        })
    }

    // ===== 地理编码配置 =====

    pub fn get_geocode_config(&self, project_id: &str) -> RepositoryResult<GeocodeBatchConfig> {
        let timeout_ms = self.get_parsed(project_id, config_keys::GEOCODE_TIMEOUT_MS, DEFAULT_GEOCODE_TIMEOUT_MS)?;
        let interval_ms = self.get_parsed(
            project_id,
            config_keys::GEOCODE_MIN_INTERVAL_MS,
            DEFAULT_GEOCODE_MIN_INTERVAL_MS,
        )?;
        Ok(GeocodeBatchConfig {
            per_address_timeout: Duration::from_millis(timeout_ms),
            min_interval: Duration::from_millis(interval_ms),
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 聚类
    pub const MAX_DISTANCE_KM: &str = "cluster.max_distance_km";
    pub const CLUSTER_MODE: &str = "cluster.mode";

    // 客户组容量
    pub const MAX_MANDATORY: &str = "group.max_mandatory";
    pub const MAX_OPTIONAL: &str = "group.max_optional";

    // 出勤
    pub const UNKNOWN_NEEDS_REPLACEMENT: &str = "attendance.unknown_needs_replacement";

    // 地理编码
    pub const GEOCODE_TIMEOUT_MS: &str = "geocode.timeout_ms";
    pub const GEOCODE_MIN_INTERVAL_MS: &str = "geocode.min_interval_ms";

    pub const ALL: &[&str] = &[
        MAX_DISTANCE_KM,
        CLUSTER_MODE,
        MAX_MANDATORY,
        MAX_OPTIONAL,
        UNKNOWN_NEEDS_REPLACEMENT,
        GEOCODE_TIMEOUT_MS,
        GEOCODE_MIN_INTERVAL_MS,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action_log::ActionType;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_defaults_when_missing() {
        let cfg = manager();
        assert_eq!(cfg.get_max_distance_km("P1").unwrap(), 2.0);
        assert_eq!(cfg.get_cluster_mode("P1").unwrap(), ClusterMode::Name);
        assert_eq!(cfg.get_group_capacity("P1").unwrap(), GroupCapacity::new(3, 2));
        assert!(cfg.get_attendance_policy("P1").unwrap().unknown_needs_replacement);
        let geo = cfg.get_geocode_config("P1").unwrap();
        assert_eq!(geo.per_address_timeout, Duration::from_millis(5_000));
        assert_eq!(geo.min_interval, Duration::from_millis(1_000));
    }

    #[test]
    fn test_overrides_are_project_scoped_and_clamped() {
        let cfg = manager();
        let log = ActionLog::new("P1", ActionType::UpdateConfig, "tester", None, None);
        let set = |key: &str, value: &str| {
            let mut log = log.clone();
            log.action_id = uuid::Uuid::new_v4().to_string();
            cfg.set_config_value("P1", key, value, &log).unwrap();
        };
        set(config_keys::CLUSTER_MODE, "GEO");
        set(config_keys::MAX_MANDATORY, "9");
        set(config_keys::MAX_DISTANCE_KM, "abc");
        set(config_keys::UNKNOWN_NEEDS_REPLACEMENT, "false");

        assert_eq!(cfg.get_cluster_mode("P1").unwrap(), ClusterMode::Geo);
        assert_eq!(cfg.get_cluster_mode("P2").unwrap(), ClusterMode::Name);
        assert_eq!(cfg.get_group_capacity("P1").unwrap().max_mandatory, 3);
        assert_eq!(cfg.get_max_distance_km("P1").unwrap(), 2.0);
        assert!(!cfg.get_attendance_policy("P1").unwrap().unknown_needs_replacement);

        let snapshot: BTreeMap<String, String> =
            serde_json::from_str(&cfg.get_config_snapshot("P1").unwrap()).unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[config_keys::CLUSTER_MODE], "GEO");
    }
}
