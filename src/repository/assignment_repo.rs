// ==========================================
// 志愿者配对系统 - 分配数据仓储
// ==========================================
// 职责: assignment 表
// 约束: assignment.client_id UNIQUE（每个客户只有一条分配）
// 红线: 一个组的分配整体替换（N 行全部成功或全部回滚）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::pair::Assignment;
use crate::domain::types::AssignmentStatus;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::codec::{fmt_ts, parse_ts};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT assignment_id, project_id, client_id, group_id, volunteer_pair_id,
           language_match, region_match, language_match_pct, region_match_pct,
           confidence, status, assigned_at
    FROM assignment
"#;

pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
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

    /// 替换一个组的全部分配（单一事务）
    ///
    /// # 说明
    /// - 先删除该组现有分配（含 NEEDS_REASSIGNMENT），再按 client_id upsert
    /// - 任一行失败则整体回滚
    pub fn replace_group_assignments(
        &self,
        project_id: &str,
        group_id: &str,
        assignments: &[Assignment],
        log: &ActionLog,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM assignment WHERE group_id = ?1 AND project_id = ?2",
            params![group_id, project_id],
        )?;
        Self::upsert_tx(&tx, project_id, group_id, assignments)?;

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(assignments.len())
    }

    /// 在调用方事务中按 client_id upsert 一个组的分配
    pub(crate) fn upsert_tx(
        conn: &Connection,
        project_id: &str,
        group_id: &str,
        assignments: &[Assignment],
    ) -> RepositoryResult<()> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO assignment (
                assignment_id, project_id, client_id, group_id, volunteer_pair_id,
                language_match, region_match, language_match_pct, region_match_pct,
                confidence, status, assigned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(client_id) DO UPDATE SET
                assignment_id = excluded.assignment_id,
                group_id = excluded.group_id,
                volunteer_pair_id = excluded.volunteer_pair_id,
                language_match = excluded.language_match,
                region_match = excluded.region_match,
                language_match_pct = excluded.language_match_pct,
                region_match_pct = excluded.region_match_pct,
                confidence = excluded.confidence,
                status = excluded.status,
                assigned_at = excluded.assigned_at
            "#,
        )?;
        for a in assignments {
            if a.group_id != group_id || a.project_id != project_id {
                return Err(RepositoryError::ValidationError(format!(
                    "分配{}不属于组{}",
                    a.assignment_id, group_id
                )));
            }
            stmt.execute(params![
                a.assignment_id,
                a.project_id,
                a.client_id,
                a.group_id,
                a.volunteer_pair_id,
                a.language_match,
                a.region_match,
                a.language_match_pct,
                a.region_match_pct,
                a.confidence,
                a.status.to_db_str(),
                fmt_ts(&a.assigned_at),
            ])?;
        }
        Ok(())
    }

    /// 按 ID 删除分配（单一事务）
    pub fn delete_by_ids(
        &self,
        project_id: &str,
        assignment_ids: &[String],
        log: &ActionLog,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for id in assignment_ids {
            count += tx.execute(
                "DELETE FROM assignment WHERE assignment_id = ?1 AND project_id = ?2",
                params![id, project_id],
            )?;
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }

    pub fn find_by_project(&self, project_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 ORDER BY rowid", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_by_group(&self, project_id: &str, group_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE project_id = ?1 AND group_id = ?2 ORDER BY rowid",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id, group_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn map_row(row: &Row) -> SqliteResult<Assignment> {
    Ok(Assignment {
        assignment_id: row.get(0)?,
        project_id: row.get(1)?,
        client_id: row.get(2)?,
        group_id: row.get(3)?,
        volunteer_pair_id: row.get(4)?,
        language_match: row.get(5)?,
        region_match: row.get(6)?,
        language_match_pct: row.get(7)?,
        region_match_pct: row.get(8)?,
        confidence: row.get(9)?,
        status: AssignmentStatus::from_db_str(&row.get::<_, String>(10)?),
        assigned_at: parse_ts(&row.get::<_, String>(11)?),
    })
}
