// ==========================================
// 志愿者配对系统 - 客户组数据仓储
// ==========================================
// 职责: client_group + client_group_member 表
// 约束: client_group_member.client_id UNIQUE（每个客户最多一个组）
// 红线: 组与成员的写入在同一事务内完成
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::group::ClientGroup;
use crate::domain::pair::Assignment;
use crate::domain::types::ClientTier;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::assignment_repo::AssignmentRepository;
use crate::repository::codec::{fmt_ts, parse_ts, placeholders};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct GroupRepository {
    conn: Arc<Mutex<Connection>>,
}

impl GroupRepository {
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

    // ==========================================
    // 写入操作
    // ==========================================

    /// 批量插入客户组（全部成功或全部回滚）
    pub fn insert_groups(&self, groups: &[ClientGroup], log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for group in groups {
            Self::insert_group_tx(&tx, group)?;
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(groups.len())
    }

    /// 更新客户组及其成员
    ///
    /// # 参数
    /// - `rebuilt`: 按新成员重算的分配；组当前未提交配对时为空
    ///
    /// # 返回
    /// - 被释放（未获得新分配）的原分配数
    ///
    /// # 说明
    /// - 成员整体替换，组内原分配整体替换为 `rebuilt`
    pub fn update_group(
        &self,
        group: &ClientGroup,
        rebuilt: &[Assignment],
        log: &ActionLog,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            r#"
            UPDATE client_group SET name = ?1, location = ?2, is_auto = ?3, updated_at = ?4
            WHERE group_id = ?5 AND project_id = ?6
            "#,
            params![
                group.name,
                group.location,
                group.is_auto,
                fmt_ts(&group.updated_at),
                group.group_id,
                group.project_id,
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::not_found("ClientGroup", &group.group_id));
        }

        let released = if rebuilt.is_empty() {
            tx.execute(
                "DELETE FROM assignment WHERE group_id = ?1 AND project_id = ?2",
                params![group.group_id, group.project_id],
            )?
        } else {
            let sql = format!(
                "DELETE FROM assignment WHERE group_id = ?1 AND project_id = ?2 AND client_id NOT IN ({})",
                placeholders(3, rebuilt.len())
            );
            let mut bind: Vec<&String> = vec![&group.group_id, &group.project_id];
            bind.extend(rebuilt.iter().map(|a| &a.client_id));
            tx.execute(&sql, params_from_iter(bind))?
        };
        AssignmentRepository::upsert_tx(&tx, &group.project_id, &group.group_id, rebuilt)?;

        tx.execute(
            "DELETE FROM client_group_member WHERE group_id = ?1",
            params![group.group_id],
        )?;
        Self::insert_members_tx(&tx, group)?;

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(released)
    }

    /// 删除单个客户组（成员释放回未分组池，组内分配删除）
    pub fn delete_group(
        &self,
        project_id: &str,
        group_id: &str,
        log: &ActionLog,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM assignment WHERE group_id = ?1 AND project_id = ?2",
            params![group_id, project_id],
        )?;
        tx.execute(
            "DELETE FROM client_group_member WHERE group_id = ?1",
            params![group_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM client_group WHERE group_id = ?1 AND project_id = ?2",
            params![group_id, project_id],
        )?;
        if deleted == 0 {
            return Err(RepositoryError::not_found("ClientGroup", group_id));
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    /// 删除项目内全部客户组（单一事务）
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
        let count = tx.execute(
            "DELETE FROM client_group WHERE project_id = ?1",
            params![project_id],
        )?;

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }

    fn insert_group_tx(tx: &Connection, group: &ClientGroup) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO client_group (
                group_id, project_id, name, location, is_auto, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                group.group_id,
                group.project_id,
                group.name,
                group.location,
                group.is_auto,
                fmt_ts(&group.created_at),
                fmt_ts(&group.updated_at),
            ],
        )?;
        Self::insert_members_tx(tx, group)
    }

    fn insert_members_tx(tx: &Connection, group: &ClientGroup) -> RepositoryResult<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO client_group_member (group_id, client_id, tier, position) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let tiers = [
            (ClientTier::Mandatory, &group.mandatory_clients),
            (ClientTier::Optional, &group.optional_clients),
        ];
        for (tier, ids) in tiers {
            for (position, client_id) in ids.iter().enumerate() {
                stmt.execute(params![
                    group.group_id,
                    client_id,
                    tier.to_db_str(),
                    position as i64
                ])?;
            }
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, project_id: &str, group_id: &str) -> RepositoryResult<Option<ClientGroup>> {
        Ok(self
            .load_groups(project_id, Some(group_id))?
            .into_iter()
            .next())
    }

    /// 项目内全部客户组（创建顺序）
    pub fn find_by_project(&self, project_id: &str) -> RepositoryResult<Vec<ClientGroup>> {
        self.load_groups(project_id, None)
    }

    /// 客户 → 组 映射
    pub fn membership(&self, project_id: &str) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.client_id, m.group_id
            FROM client_group_member m
            JOIN client_group g ON g.group_id = m.group_id
            WHERE g.project_id = ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<(String, String)>>>()?;
        Ok(rows.into_iter().collect())
    }

    pub fn names(&self, project_id: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM client_group WHERE project_id = ?1")?;
        let names = stmt
            .query_map(params![project_id], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(names)
    }

    fn load_groups(&self, project_id: &str, group_id: Option<&str>) -> RepositoryResult<Vec<ClientGroup>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT group_id, project_id, name, location, is_auto, created_at, updated_at
            FROM client_group
            WHERE project_id = ?1 AND (?2 IS NULL OR group_id = ?2)
            ORDER BY created_at, rowid
            "#,
        )?;
        let mut groups = stmt
            .query_map(params![project_id, group_id], |row| {
                Ok(ClientGroup {
                    group_id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    location: row.get(3)?,
                    mandatory_clients: Vec::new(),
                    optional_clients: Vec::new(),
                    is_auto: row.get(4)?,
                    created_at: parse_ts(&row.get::<_, String>(5)?),
                    updated_at: parse_ts(&row.get::<_, String>(6)?),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut member_stmt = conn.prepare(
            r#"
            SELECT m.group_id, m.client_id, m.tier
            FROM client_group_member m
            JOIN client_group g ON g.group_id = m.group_id
            WHERE g.project_id = ?1 AND (?2 IS NULL OR m.group_id = ?2)
            ORDER BY m.group_id, m.tier, m.position
            "#,
        )?;
        let members = member_stmt
            .query_map(params![project_id, group_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    ClientTier::from_db_str(&row.get::<_, String>(2)?),
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let index: HashMap<String, usize> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.group_id.clone(), i))
            .collect();
        for (gid, client_id, tier) in members {
            let Some(&i) = index.get(&gid) else {
                continue;
            };
            match tier {
                ClientTier::Mandatory => groups[i].mandatory_clients.push(client_id),
                ClientTier::Optional => groups[i].optional_clients.push(client_id),
            }
        }

        Ok(groups)
    }
}
