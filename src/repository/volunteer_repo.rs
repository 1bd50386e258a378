// ==========================================
// 志愿者配对系统 - 志愿者数据仓储
// ==========================================
// 职责: volunteer 表 CRUD（按 project_id 隔离）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::action_log::ActionLog;
use crate::domain::types::{AttendanceState, VolunteerStatus};
use crate::domain::volunteer::Volunteer;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::codec::{from_json_list, to_json_list};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT volunteer_id, project_id, name, email,
           languages_json, regions_json, available_days_json, available_time,
           is_joining_as_group, group_name, has_experience,
           status, selected_for_training, training_attended
    FROM volunteer
"#;

pub struct VolunteerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VolunteerRepository {
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

    /// 批量写入志愿者（upsert，事务化）
    pub fn upsert_batch(&self, volunteers: &[Volunteer], log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO volunteer (
                    volunteer_id, project_id, name, email,
                    languages_json, regions_json, available_days_json, available_time,
                    is_joining_as_group, group_name, has_experience,
                    status, selected_for_training, training_attended
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(volunteer_id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    languages_json = excluded.languages_json,
                    regions_json = excluded.regions_json,
                    available_days_json = excluded.available_days_json,
                    available_time = excluded.available_time,
                    is_joining_as_group = excluded.is_joining_as_group,
                    group_name = excluded.group_name,
                    has_experience = excluded.has_experience,
                    status = excluded.status,
                    selected_for_training = excluded.selected_for_training,
                    training_attended = excluded.training_attended
                WHERE volunteer.project_id = excluded.project_id
                "#,
            )?;
            for v in volunteers {
                count += stmt.execute(params![
                    v.volunteer_id,
                    v.project_id,
                    v.name,
                    v.email,
                    to_json_list(&v.languages),
                    to_json_list(&v.regions),
                    to_json_list(&v.available_days),
                    v.available_time,
                    v.is_joining_as_group,
                    v.group_name,
                    v.has_experience,
                    v.status.to_db_str(),
                    v.selected_for_training,
                    v.training_attended.to_db_str(),
                ])?;
            }
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }

    /// 登记培训出勤
    pub fn update_attendance(
        &self,
        project_id: &str,
        volunteer_id: &str,
        state: AttendanceState,
        log: &ActionLog,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE volunteer SET training_attended = ?1 WHERE volunteer_id = ?2 AND project_id = ?3",
            params![state.to_db_str(), volunteer_id, project_id],
        )?;
        if updated == 0 {
            return Err(RepositoryError::not_found("Volunteer", volunteer_id));
        }

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(
        &self,
        project_id: &str,
        volunteer_id: &str,
    ) -> RepositoryResult<Option<Volunteer>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 AND volunteer_id = ?2", SELECT_COLUMNS);
        match conn.query_row(&sql, params![project_id, volunteer_id], map_row) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 项目内全部志愿者（导入顺序）
    pub fn find_by_project(&self, project_id: &str) -> RepositoryResult<Vec<Volunteer>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE project_id = ?1 ORDER BY rowid", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let volunteers = stmt
            .query_map(params![project_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(volunteers)
    }

    /// 删除项目内全部志愿者（单一事务，连带配对与分配）
    pub fn delete_all(&self, project_id: &str, log: &ActionLog) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM assignment WHERE project_id = ?1", params![project_id])?;
        tx.execute("DELETE FROM volunteer_pair WHERE project_id = ?1", params![project_id])?;
        let count = tx.execute("DELETE FROM volunteer WHERE project_id = ?1", params![project_id])?;

        ActionLogRepository::insert_tx(&tx, log)?;
        tx.commit()?;
        Ok(count)
    }
}

fn map_row(row: &Row) -> SqliteResult<Volunteer> {
    Ok(Volunteer {
        volunteer_id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        languages: from_json_list(&row.get::<_, String>(4)?),
        regions: from_json_list(&row.get::<_, String>(5)?),
        available_days: from_json_list(&row.get::<_, String>(6)?),
        available_time: row.get(7)?,
        is_joining_as_group: row.get(8)?,
        group_name: row.get(9)?,
        has_experience: row.get(10)?,
        status: VolunteerStatus::from_db_str(&row.get::<_, String>(11)?),
        selected_for_training: row.get(12)?,
        training_attended: AttendanceState::from_db_str(&row.get::<_, String>(13)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action_log::ActionType;
    use crate::domain::project::Project;
    use crate::repository::project_repo::ProjectRepository;

    fn setup() -> (Arc<Mutex<Connection>>, String) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let project = Project::new("测试项目");
        ProjectRepository::from_connection(conn.clone())
            .insert(&project)
            .unwrap();
        (conn, project.project_id)
    }

    #[test]
    fn test_upsert_roundtrip_and_attendance_update() {
        let (conn, pid) = setup();
        let repo = VolunteerRepository::from_connection(conn);
        let log = ActionLog::new(&pid, ActionType::ImportVolunteers, "tester", None, None);

        let v = Volunteer::new(&pid, "王五", VolunteerStatus::Waitlisted)
            .with_languages(&["English"])
            .with_regions(&["Central"])
            .joining_group("Team A")
            .selected_for_training();
        repo.upsert_batch(&[v.clone()], &log).unwrap();
        assert_eq!(repo.find_by_project(&pid).unwrap(), vec![v.clone()]);

        let log = ActionLog::new(&pid, ActionType::RecordAttendance, "tester", None, None);
        repo.update_attendance(&pid, &v.volunteer_id, AttendanceState::Present, &log)
            .unwrap();
        let found = repo.find_by_id(&pid, &v.volunteer_id).unwrap().unwrap();
        assert_eq!(found.training_attended, AttendanceState::Present);

        let err = repo
            .update_attendance(&pid, "missing", AttendanceState::Absent, &log)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
