// ==========================================
// 志愿者配对系统 - 客户数据仓储
// ==========================================
// 职责: client 表 CRUD（按 project_id 隔离）
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::client::{Client, GeoPoint};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::codec::{from_json_list, to_json_list};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT client_id, project_id, name, src_id, gender, race,
           languages_json, address, location, lat, lon
    FROM client
"#;

pub struct ClientRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ClientRepository {
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

    /// 批量写入客户（upsert，事务化）
    ///
    /// # 说明
    /// - ON CONFLICT 更新而非 REPLACE，避免级联删除组成员与分配
    pub fn upsert_batch(&self, clients: &[Client], log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO client (
                    client_id, project_id, name, src_id, gender, race,
                    languages_json, address, location, lat, lon
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(client_id) DO UPDATE SET
                    name = excluded.name,
                    src_id = excluded.src_id,
                    gender = excluded.gender,
                    race = excluded.race,
                    languages_json = excluded.languages_json,
                    address = excluded.address,
                    location = excluded.location,
                    lat = excluded.lat,
                    lon = excluded.lon
                WHERE client.project_id = excluded.project_id
                "#,
            )?;
            for c in clients {
                count += stmt.execute(params![
                    c.client_id,
                    c.project_id,
                    c.name,
                    c.src_id,
                    c.gender,
                    c.race,
                    to_json_list(&c.languages),
                    c.address,
                    c.location,
                    c.coordinates.map(|p| p.lat),
                    c.coordinates.map(|p| p.lon),
                ])?;
            }
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }

    /// 批量更新客户坐标（地理编码结果）
    pub fn update_coordinates(
        &self,
        project_id: &str,
        clients: &[Client],
        log: &ActionLog,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for c in clients {
            let Some(point) = c.geo_point() else {
                continue;
            };
            count += tx.execute(
                "UPDATE client SET lat = ?1, lon = ?2 WHERE client_id = ?3 AND project_id = ?4",
                params![point.lat, point.lon, c.client_id, project_id],
            )?;
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }

    pub fn find_by_id(&self, project_id: &str, client_id: &str) -> RepositoryResult<Option<Client>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 AND client_id = ?2", SELECT_COLUMNS);
        match conn.query_row(&sql, params![project_id, client_id], map_row) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 项目内全部客户（导入顺序）
    pub fn find_by_project(&self, project_id: &str) -> RepositoryResult<Vec<Client>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 ORDER BY rowid", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let clients = stmt
            .query_map(params![project_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(clients)
    }

    /// 未入组的客户（导入顺序）
    pub fn find_ungrouped(&self, project_id: &str) -> RepositoryResult<Vec<Client>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"{} WHERE project_id = ?1
                 AND client_id NOT IN (SELECT client_id FROM client_group_member)
               ORDER BY rowid"#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let clients = stmt
            .query_map(params![project_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(clients)
    }

    /// 删除项目内全部客户（单一事务）
    ///
    /// 客户组以必须客户为前提，故一并清除分配、组成员与客户组
    pub fn delete_all(&self, project_id: &str, log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM assignment WHERE project_id = ?1", params![project_id])?;
        tx.execute(
            r#"
            DELETE FROM client_group_member
            WHERE group_id IN (SELECT group_id FROM client_group WHERE project_id = ?1)
            "#,
            params![project_id],
        )?;
        tx.execute("DELETE FROM client_group WHERE project_id = ?1", params![project_id])?;
        let count = tx.execute("DELETE FROM client WHERE project_id = ?1", params![project_id])?;

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }
}

fn map_row(row: &Row) -> SqliteResult<Client> {
    let lat: Option<f64> = row.get(9)?;
    let lon: Option<f64> = row.get(10)?;
    Ok(Client {
        client_id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        src_id: row.get(3)?,
        gender: row.get(4)?,
        race: row.get(5)?,
        languages: from_json_list(&row.get::<_, String>(6)?),
        address: row.get(7)?,
        location: row.get(8)?,
        coordinates: lat.zip(lon).map(|(lat, lon)| GeoPoint::new(lat, lon)),
    })
}
