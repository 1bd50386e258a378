use super::core::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::repository::codec::parse_ts;
use crate::repository::error::RepositoryResult;
use rusqlite::{params, Result as SqliteResult, Row};

const SELECT_COLUMNS: &str = r#"
    SELECT action_id, project_id, action_type, action_ts, actor, payload_json, detail
    FROM action_log
"#;

impl ActionLogRepository {
    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE action_id = ?1", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row(params![action_id], map_row) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询项目内最近的 N 条日志（时间倒序）
    pub fn find_by_project(&self, project_id: &str, limit: i32) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE project_id = ?1 ORDER BY action_ts DESC, rowid DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let logs = stmt
            .query_map(params![project_id, limit], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 查询项目内指定操作类型的日志
    pub fn find_by_action_type(
        &self,
        project_id: &str,
        action_type: &str,
    ) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE project_id = ?1 AND action_type = ?2 ORDER BY action_ts DESC, rowid DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let logs = stmt
            .query_map(params![project_id, action_type], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }
}

fn map_row(row: &Row) -> SqliteResult<ActionLog> {
    let payload: Option<String> = row.get(5)?;
    Ok(ActionLog {
        action_id: row.get(0)?,
        project_id: row.get(1)?,
        action_type: row.get(2)?,
        action_ts: parse_ts(&row.get::<_, String>(3)?),
        actor: row.get(4)?,
        payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
        detail: row.get(6)?,
    })
}
