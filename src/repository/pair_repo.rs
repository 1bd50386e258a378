// ==========================================
// 志愿者配对系统 - 志愿者配对数据仓储
// ==========================================
// 职责: volunteer_pair 表
// 说明: 删除配对时，引用该配对的分配标记为 NEEDS_REASSIGNMENT（软失效）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::pair::VolunteerPair;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::codec::{fmt_ts, parse_ts};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT pair_id, project_id, volunteer1_id, volunteer2_id,
           compatibility_score, is_manual, created_at
    FROM volunteer_pair
"#;

pub struct PairRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PairRepository {
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

    /// 批量插入配对（事务化）
    pub fn insert_pairs(&self, pairs: &[VolunteerPair], log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO volunteer_pair (
                    pair_id, project_id, volunteer1_id, volunteer2_id,
                    compatibility_score, is_manual, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for p in pairs {
                stmt.execute(params![
                    p.pair_id,
                    p.project_id,
                    p.volunteer1_id,
                    p.volunteer2_id,
                    p.compatibility_score,
                    p.is_manual,
                    fmt_ts(&p.created_at),
                ])?;
            }
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(pairs.len())
    }

    /// 删除配对，释放两名志愿者
    ///
    /// # 返回
    /// - Ok(n): 被标记为 NEEDS_REASSIGNMENT 的分配数
    pub fn delete_pair(&self, project_id: &str, pair_id: &str, log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let invalidated = tx.execute(
            r#"
            UPDATE assignment SET status = 'NEEDS_REASSIGNMENT'
            WHERE volunteer_pair_id = ?1 AND project_id = ?2
            "#,
            params![pair_id, project_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM volunteer_pair WHERE pair_id = ?1 AND project_id = ?2",
            params![pair_id, project_id],
        )?;
        if deleted == 0 {
            return Err(RepositoryError::not_found("VolunteerPair", pair_id));
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(invalidated)
    }

    pub fn find_by_id(&self, project_id: &str, pair_id: &str) -> RepositoryResult<Option<VolunteerPair>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 AND pair_id = ?2", SELECT_COLUMNS);
        match conn.query_row(&sql, params![project_id, pair_id], map_row) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_project(&self, project_id: &str) -> RepositoryResult<Vec<VolunteerPair>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 ORDER BY created_at, rowid", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let pairs = stmt
            .query_map(params![project_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(pairs)
    }
}

fn map_row(row: &Row) -> SqliteResult<VolunteerPair> {
    Ok(VolunteerPair {
        pair_id: row.get(0)?,
        project_id: row.get(1)?,
        volunteer1_id: row.get(2)?,
        volunteer2_id: row.get(3)?,
        compatibility_score: row.get(4)?,
        is_manual: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}
