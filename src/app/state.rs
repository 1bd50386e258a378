// ==========================================
// 志愿者配对系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 全部仓储共享同一个 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AssignmentApi, FinalizeApi, GeocodeApi, GroupApi, PairApi, ProjectApi, ProjectGate};
use crate::app::project_lock::ProjectLocks;
use crate::config::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection, read_schema_version};
use crate::engine::CompatibilityScorer;
use crate::geocoding::{GeocodingOracle, NominatimOracle, DEFAULT_NOMINATIM_URL};
use crate::repository::{
    ActionLogRepository, AssignmentRepository, ClientRepository, GroupRepository, PairRepository,
    ProjectRepository, VolunteerRepository,
};

/// 覆盖默认数据库路径
pub const DB_PATH_ENV: &str = "VOLUNTEER_MATCH_DB_PATH";
/// 覆盖地理编码服务地址
pub const GEOCODER_URL_ENV: &str = "VOLUNTEER_MATCH_GEOCODER_URL";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub project_api: Arc<ProjectApi>,
    pub group_api: Arc<GroupApi>,
    pub pair_api: Arc<PairApi>,
    pub assignment_api: Arc<AssignmentApi>,
    pub finalize_api: Arc<FinalizeApi>,
    pub geocode_api: Arc<GeocodeApi>,

    /// 项目级写锁（同项目写操作串行）
    pub project_locks: Arc<ProjectLocks>,
}

impl AppState {
    /// 创建新的AppState实例（使用 Nominatim 地理编码）
    ///
    /// # 返回
    /// - Err(String): 数据库无法打开或建表失败
    pub fn new(db_path: String) -> Result<Self, String> {
        let base_url = std::env::var(GEOCODER_URL_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_NOMINATIM_URL.to_string());
        let user_agent = format!("{}/{}", crate::PKG_NAME, crate::VERSION);

        let oracle: Option<Arc<dyn GeocodingOracle>> = match NominatimOracle::new(base_url, &user_agent) {
            Ok(o) => Some(Arc::new(o)),
            Err(e) => {
                tracing::warn!(error = %e, "地理编码客户端初始化失败，地理编码不可用");
                None
            }
        };
        Self::with_oracle(db_path, oracle)
    }

    /// 创建AppState并注入地理编码实现（None 表示不启用）
    pub fn with_oracle(
        db_path: String,
        oracle: Option<Arc<dyn GeocodingOracle>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        match read_schema_version(&conn) {
            Ok(Some(v)) => tracing::info!(schema_version = v, "数据库结构就绪"),
            Ok(None) => tracing::warn!("未读取到 schema_version"),
            Err(e) => tracing::warn!(error = %e, "读取 schema_version 失败"),
        }
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // Repository层
        // ==========================================
        let project_repo = Arc::new(ProjectRepository::from_connection(conn.clone()));
        let client_repo = Arc::new(ClientRepository::from_connection(conn.clone()));
        let volunteer_repo = Arc::new(VolunteerRepository::from_connection(conn.clone()));
        let group_repo = Arc::new(GroupRepository::from_connection(conn.clone()));
        let pair_repo = Arc::new(PairRepository::from_connection(conn.clone()));
        let assignment_repo = Arc::new(AssignmentRepository::from_connection(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));

        // ==========================================
        // API层
        // ==========================================
        let project_locks = Arc::new(ProjectLocks::new());
        let gate = Arc::new(ProjectGate::new(project_locks.clone(), project_repo.clone()));
        let scorer = CompatibilityScorer::new();

        let project_api = Arc::new(ProjectApi::new(
            gate.clone(),
            project_repo.clone(),
            client_repo.clone(),
            volunteer_repo.clone(),
            action_log_repo,
            config_manager.clone(),
        ));
        let group_api = Arc::new(GroupApi::new(
            gate.clone(),
            client_repo.clone(),
            group_repo.clone(),
            volunteer_repo.clone(),
            pair_repo.clone(),
            assignment_repo.clone(),
            config_manager.clone(),
            scorer.clone(),
        ));
        let pair_api = Arc::new(PairApi::new(
            gate.clone(),
            volunteer_repo.clone(),
            pair_repo.clone(),
            scorer.clone(),
        ));
        let assignment_api = Arc::new(AssignmentApi::new(
            gate.clone(),
            client_repo.clone(),
            volunteer_repo.clone(),
            group_repo,
            pair_repo.clone(),
            assignment_repo.clone(),
            scorer,
        ));
        let finalize_api = Arc::new(FinalizeApi::new(
            gate.clone(),
            project_repo,
            volunteer_repo,
            pair_repo,
            assignment_repo,
            config_manager.clone(),
        ));
        let geocode_api = Arc::new(GeocodeApi::new(gate, client_repo, config_manager, oracle));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            project_api,
            group_api,
            pair_api,
            assignment_api,
            finalize_api,
            geocode_api,
            project_locks,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./volunteer_match.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("volunteer-match");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("volunteer_match.db");
        }
    }

    path.to_string_lossy().to_string()
}
