use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = ActionLog::new(
        "P1",
        ActionType::CreateGroup,
        "alice",
        Some(json!({"group_id": "G1"})),
        Some("创建客户组".to_string()),
    );
    let id = repo.insert(&log).unwrap();
    assert_eq!(id, log.action_id);

    let found = repo.find_by_id(&id).unwrap().expect("日志应存在");
    assert_eq!(found.project_id, "P1");
    assert_eq!(found.action_type, "CREATE_GROUP");
    assert_eq!(found.actor, "alice");
    assert_eq!(found.payload_json, Some(json!({"group_id": "G1"})));
    assert!(repo.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_find_by_project_is_scoped() {
    let repo = ActionLogRepository::new(setup_test_db());

    repo.insert(&ActionLog::new("P1", ActionType::AutoPair, "a", None, None)).unwrap();
    repo.insert(&ActionLog::new("P1", ActionType::DeletePair, "a", None, None)).unwrap();
    repo.insert(&ActionLog::new("P2", ActionType::AutoPair, "b", None, None)).unwrap();

    assert_eq!(repo.find_by_project("P1", 10).unwrap().len(), 2);
    assert_eq!(repo.find_by_project("P2", 10).unwrap().len(), 1);
    assert_eq!(repo.find_by_project("P1", 1).unwrap().len(), 1);

    let pairs = repo.find_by_action_type("P1", "AUTO_PAIR").unwrap();
    assert_eq!(pairs.len(), 1);
}
