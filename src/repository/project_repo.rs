// ==========================================
// 志愿者配对系统 - 项目数据仓储
// ==========================================
// 职责: project 表 CRUD + 最终确认落库
// 红线: Repository 不含业务逻辑，最终确认方案由引擎计算
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::project::Project;
use crate::engine::finalizer::FinalizationPlan;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::codec::{fmt_ts, parse_ts};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 最终确认落库统计
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FinalizationWriteSummary {
    pub pairs_rewritten: usize,
    pub pairs_deleted: usize,
    pub volunteers_deleted: usize,
    pub volunteers_promoted: usize,
    pub assignments_purged: usize,
}

pub struct ProjectRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProjectRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, project: &Project) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO project (project_id, name, created_at, finalized_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.project_id,
                project.name,
                fmt_ts(&project.created_at),
                project.finalized_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, project_id: &str) -> RepositoryResult<Option<Project>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT project_id, name, created_at, finalized_at FROM project WHERE project_id = ?1",
            params![project_id],
            map_row,
        );
        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self) -> RepositoryResult<Vec<Project>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, name, created_at, finalized_at FROM project ORDER BY created_at",
        )?;
        let projects = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(projects)
    }

    /// 应用最终确认方案（单一事务）
    ///
    /// 顺序:
    /// 1) 清除 NEEDS_REASSIGNMENT 分配
    /// 2) 重写最终配对成员（替补生效）
    /// 3) 删除无分配的配对
    /// 4) 替补者 WAITLISTED → SELECTED
    /// 5) 删除未保留的志愿者
    /// 6) 写入 finalized_at 与日志
    pub fn apply_finalization(
        &self,
        project_id: &str,
        plan: &FinalizationPlan,
        log: &ActionLog,
    ) -> RepositoryResult<FinalizationWriteSummary> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut summary = FinalizationWriteSummary::default();

        summary.assignments_purged = tx.execute(
            "DELETE FROM assignment WHERE project_id = ?1 AND status = 'NEEDS_REASSIGNMENT'",
            params![project_id],
        )?;

        for pair in &plan.final_pairs {
            summary.pairs_rewritten += tx.execute(
                r#"
                UPDATE volunteer_pair SET volunteer1_id = ?1, volunteer2_id = ?2
                WHERE pair_id = ?3 AND project_id = ?4
                "#,
                params![pair.volunteer1_id, pair.volunteer2_id, pair.pair_id, project_id],
            )?;
        }

        for pair_id in &plan.dropped_pair_ids {
            summary.pairs_deleted += tx.execute(
                "DELETE FROM volunteer_pair WHERE pair_id = ?1 AND project_id = ?2",
                params![pair_id, project_id],
            )?;
        }

        for volunteer_id in &plan.promoted_volunteer_ids {
            summary.volunteers_promoted += tx.execute(
                "UPDATE volunteer SET status = 'SELECTED' WHERE volunteer_id = ?1 AND project_id = ?2",
                params![volunteer_id, project_id],
            )?;
        }

        for volunteer_id in &plan.removed_volunteer_ids {
            summary.volunteers_deleted += tx.execute(
                "DELETE FROM volunteer WHERE volunteer_id = ?1 AND project_id = ?2",
                params![volunteer_id, project_id],
            )?;
        }

        let now = chrono::Local::now().naive_local();
        let updated = tx.execute(
            "UPDATE project SET finalized_at = ?1 WHERE project_id = ?2 AND finalized_at IS NULL",
            params![fmt_ts(&now), project_id],
        )?;
        if updated == 0 {
            return Err(RepositoryError::not_found("Project(未确认)", project_id));
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(summary)
    }
}

fn map_row(row: &Row) -> SqliteResult<Project> {
    Ok(Project {
        project_id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_ts(&row.get::<_, String>(2)?),
        finalized_at: row.get::<_, Option<String>>(3)?.map(|s| parse_ts(&s)),
    })
}
