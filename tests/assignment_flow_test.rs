// ==========================================
// 配对与分配集成测试
// ==========================================
// 职责: 验证人工/自动配对、暂存提交、重新分配、配对删除
// ==========================================


#[cfg(test)]
mod assignment_flow_test {
    use volunteer_match::api::{ApiError, GroupCommitOutcome};
    use volunteer_match::app::AppState;
    use volunteer_match::domain::group::{ClientGroup, GroupMembershipRequest};
    use volunteer_match::domain::pair::VolunteerPair;
    use volunteer_match::domain::types::AssignmentStatus;
    use volunteer_match::engine::PlanningSession;

    use crate::test_helpers::{
        client, create_project, import_clients, import_volunteers, pending, selected, setup_state, ACTOR,
    };

    struct Fixture {
        pid: String,
        group: ClientGroup,
        pair_12: VolunteerPair,
        pair_34: VolunteerPair,
    }

    /// Central-1 = 必须客户 X,Y,Z；P1/P2 完全匹配，P3/P4 仅语言匹配
    fn fixture(state: &AppState) -> Fixture {
        let pid = create_project(state, "分配场景").project_id;
        let ids = import_clients(
            state,
            &pid,
            vec![
                client(&pid, "X", "Central", "English"),
                client(&pid, "Y", "Central", "English, Tamil"),
                client(&pid, "Z", "Central", "English"),
            ],
        );
        let vids = import_volunteers(
            state,
            &pid,
            vec![
                selected(&pid, "P1", &["English"], &["Central"]),
                selected(&pid, "P2", &["Tamil"], &["Central"]),
                selected(&pid, "P3", &["English"], &["East"]),
                selected(&pid, "P4", &["Malay"], &["West"]),
            ],
        );

        let group = state
            .group_api
            .create_group(
                &pid,
                &GroupMembershipRequest {
                    name: "Central-1".to_string(),
                    location: None,
                    mandatory_clients: ids,
                    optional_clients: Vec::new(),
                },
                ACTOR,
            )
            .unwrap();
        let pair_12 = state.pair_api.create_pair(&pid, &vids[0], &vids[1], ACTOR).unwrap();
        let pair_34 = state.pair_api.create_pair(&pid, &vids[2], &vids[3], ACTOR).unwrap();

        Fixture {
            pid,
            group,
            pair_12,
            pair_34,
        }
    }

    #[test]
    fn test_reassigning_group_replaces_assignments() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);

        let summary = state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();
        assert_eq!(summary.assignment_count, 3);
        assert_eq!(summary.score.confidence, 1.0);

        let assignments = state.assignment_api.list_assignments(&f.pid).unwrap();
        assert_eq!(assignments.len(), 3);
        assert!(assignments
            .iter()
            .all(|a| a.volunteer_pair_id == f.pair_12.pair_id && a.confidence == 1.0));

        let summary = state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_34.pair_id, ACTOR)
            .unwrap();
        assert_eq!(summary.score.confidence, 0.5);
        assert!(summary.score.language_match);
        assert!(!summary.score.region_match);

        let assignments = state.assignment_api.list_assignments(&f.pid).unwrap();
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|a| a.volunteer_pair_id == f.pair_34.pair_id));

        let usage = state.assignment_api.pair_usage(&f.pid).unwrap();
        assert_eq!(usage.get(&f.pair_34.pair_id), Some(&1));
        assert!(!usage.contains_key(&f.pair_12.pair_id));
    }

    #[test]
    fn test_assigning_same_pair_twice_is_idempotent() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);

        let first = state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();
        let second = state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();
        assert_eq!(first.score, second.score);

        let assignments = state.assignment_api.list_assignments(&f.pid).unwrap();
        assert_eq!(assignments.len(), 3);
        let mut clients: Vec<&str> = assignments.iter().map(|a| a.client_id.as_str()).collect();
        clients.sort();
        clients.dedup();
        assert_eq!(clients.len(), 3);
    }

    #[test]
    fn test_session_stage_conflict_and_commit() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);
        let mut session = PlanningSession::new(&f.pid);

        state
            .assignment_api
            .stage(&mut session, &f.group.group_id, &f.pair_12.pair_id)
            .unwrap();
        // 同组同配对重复暂存: 幂等
        state
            .assignment_api
            .stage(&mut session, &f.group.group_id, &f.pair_12.pair_id)
            .unwrap();
        assert_eq!(session.len(), 1);

        // 同组不同配对: 冲突，禁止后写覆盖
        let err = state
            .assignment_api
            .stage(&mut session, &f.group.group_id, &f.pair_34.pair_id)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(session.get(&f.group.group_id).unwrap().pair_id, f.pair_12.pair_id);

        // 暂存不落库
        assert!(state.assignment_api.list_assignments(&f.pid).unwrap().is_empty());

        let report = state.assignment_api.commit_session(&mut session, ACTOR).unwrap();
        assert_eq!(report.committed_count(), 1);
        assert!(session.is_empty());
        assert_eq!(state.assignment_api.list_assignments(&f.pid).unwrap().len(), 3);
    }

    #[test]
    fn test_commit_detects_concurrent_reassignment() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);

        state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();

        // 会话基于 pair_12 暂存 pair_34
        let mut session = PlanningSession::new(&f.pid);
        let staged = state
            .assignment_api
            .stage(&mut session, &f.group.group_id, &f.pair_34.pair_id)
            .unwrap();
        assert_eq!(staged.base_pair_id.as_deref(), Some(f.pair_12.pair_id.as_str()));

        // 会话外删除再重新分配，组的已提交配对发生变化
        state
            .assignment_api
            .remove_assignment(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();

        let report = state.assignment_api.commit_session(&mut session, ACTOR).unwrap();
        assert_eq!(report.failed_count(), 1);
        assert!(matches!(report.outcomes[0], GroupCommitOutcome::Failed { .. }));
        // 失败的暂存保留在会话中
        assert_eq!(session.len(), 1);
        assert!(state.assignment_api.list_assignments(&f.pid).unwrap().is_empty());

        state.assignment_api.unstage(&mut session, &f.group.group_id);
        assert!(session.is_empty());
    }

    #[test]
    fn test_remove_assignment_only_touches_given_pair() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);
        state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();

        let err = state
            .assignment_api
            .remove_assignment(&f.pid, &f.group.group_id, &f.pair_34.pair_id, ACTOR)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(state.assignment_api.list_assignments(&f.pid).unwrap().len(), 3);

        let removed = state
            .assignment_api
            .remove_assignment(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();
        assert_eq!(removed, 3);
        assert!(state.assignment_api.list_assignments(&f.pid).unwrap().is_empty());
    }

    #[test]
    fn test_deleting_pair_marks_assignments_for_reassignment() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);
        state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();

        let summary = state.pair_api.delete_pair(&f.pid, &f.pair_12.pair_id, ACTOR).unwrap();
        assert_eq!(summary.invalidated_assignments, 3);

        let assignments = state.assignment_api.list_assignments(&f.pid).unwrap();
        assert_eq!(assignments.len(), 3);
        assert!(assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::NeedsReassignment));
        assert!(state.assignment_api.pair_usage(&f.pid).unwrap().is_empty());

        // 重新分配覆盖待处理记录
        state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_34.pair_id, ACTOR)
            .unwrap();
        let assignments = state.assignment_api.list_assignments(&f.pid).unwrap();
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|a| a.status == AssignmentStatus::Active));

        let err = state.pair_api.delete_pair(&f.pid, &f.pair_12.pair_id, ACTOR).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_pairing_rules() {
        let (_tmp, state) = setup_state();
        let pid = create_project(&state, "配对规则").project_id;
        let vids = import_volunteers(
            &state,
            &pid,
            vec![
                selected(&pid, "V1", &["English", "Tamil"], &["East"]),
                selected(&pid, "V2", &["Tamil", "Malay"], &["West"]),
                selected(&pid, "V3", &["English"], &["East"]),
                pending(&pid, "V4"),
            ],
        );

        let pair = state.pair_api.create_pair(&pid, &vids[0], &vids[1], ACTOR).unwrap();
        assert_eq!(pair.compatibility_score, 0.5);
        assert!(pair.is_manual);

        // 已在配对中
        let err = state.pair_api.create_pair(&pid, &vids[0], &vids[2], ACTOR).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        // 非 SELECTED
        let err = state.pair_api.create_pair(&pid, &vids[2], &vids[3], ACTOR).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        // 自己与自己
        let err = state.pair_api.create_pair(&pid, &vids[2], &vids[2], ACTOR).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        // 不存在
        let err = state.pair_api.create_pair(&pid, &vids[2], "ghost", ACTOR).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        assert_eq!(state.pair_api.list_pairs(&pid).unwrap().len(), 1);
    }

    #[test]
    fn test_auto_pair_by_joining_group() {
        let (_tmp, state) = setup_state();
        let pid = create_project(&state, "组队报名").project_id;
        let vids = import_volunteers(
            &state,
            &pid,
            vec![
                selected(&pid, "A1", &["English"], &["East"]).joining_group("Team A"),
                selected(&pid, "B1", &["English"], &["East"]).joining_group("Team B"),
                selected(&pid, "A2", &["English"], &["East"]).joining_group("Team A"),
                selected(&pid, "A3", &["English"], &["East"]).joining_group("Team A"),
                pending(&pid, "B2").joining_group("Team B"),
                selected(&pid, "Solo", &["English"], &["East"]),
            ],
        );

        let result = state.pair_api.auto_pair(&pid, ACTOR).unwrap();
        assert_eq!(result.pairs.len(), 1);
        let pair = &result.pairs[0];
        assert_eq!(pair.members(), [vids[0].as_str(), vids[2].as_str()]);
        assert!(!pair.is_manual);
        assert_eq!(pair.compatibility_score, 1.0);

        let unpaired: Vec<&str> = result.unpaired.iter().map(|u| u.volunteer_id.as_str()).collect();
        assert_eq!(unpaired, vec![vids[3].as_str(), vids[1].as_str()]);

        // 再次运行不会重复配对
        let again = state.pair_api.auto_pair(&pid, ACTOR).unwrap();
        assert!(again.pairs.is_empty());
        assert_eq!(state.pair_api.list_pairs(&pid).unwrap().len(), 1);
    }

    fn membership(name: &str, mandatory: Vec<String>) -> GroupMembershipRequest {
        GroupMembershipRequest {
            name: name.to_string(),
            location: None,
            mandatory_clients: mandatory,
            optional_clients: Vec::new(),
        }
    }

    #[test]
    fn test_editing_assigned_group_rescores_current_members() {
        let (_tmp, state) = setup_state();
        let pid = create_project(&state, "编辑已分配组").project_id;
        let ids = import_clients(
            &state,
            &pid,
            vec![
                client(&pid, "X", "South", "English"),
                client(&pid, "Y", "South", "Hokkien"),
                client(&pid, "W", "South", "Hokkien"),
            ],
        );
        let vids = import_volunteers(
            &state,
            &pid,
            vec![
                selected(&pid, "N1", &["English"], &["North"]),
                selected(&pid, "N2", &["English"], &["North"]),
            ],
        );
        let group = state
            .group_api
            .create_group(&pid, &membership("South-A", vec![ids[0].clone(), ids[1].clone()]), ACTOR)
            .unwrap();
        let pair = state.pair_api.create_pair(&pid, &vids[0], &vids[1], ACTOR).unwrap();
        let summary = state
            .assignment_api
            .assign_pair_to_group(&pid, &group.group_id, &pair.pair_id, ACTOR)
            .unwrap();
        assert!(summary.score.language_match);
        assert_eq!(summary.score.confidence, 0.5);

        let edit = state
            .group_api
            .edit_group(
                &pid,
                &group.group_id,
                &membership("South-A", vec![ids[1].clone(), ids[2].clone()]),
                ACTOR,
            )
            .unwrap();
        assert_eq!(edit.released_assignments, 1);
        assert_eq!(edit.rebuilt_assignments, 2);

        let assignments = state.assignment_api.list_assignments(&pid).unwrap();
        let mut clients: Vec<&str> = assignments.iter().map(|a| a.client_id.as_str()).collect();
        clients.sort();
        let mut expected = vec![ids[1].as_str(), ids[2].as_str()];
        expected.sort();
        assert_eq!(clients, expected);
        for a in &assignments {
            assert_eq!(a.volunteer_pair_id, pair.pair_id);
            assert_eq!(a.status, AssignmentStatus::Active);
            assert!(!a.language_match);
            assert!(!a.region_match);
            assert_eq!(a.language_match_pct, 0.0);
            assert_eq!(a.confidence, 0.0);
        }
    }

    #[test]
    fn test_editing_group_without_committed_pair_releases_all_rows() {
        let (_tmp, state) = setup_state();
        let f = fixture(&state);
        state
            .assignment_api
            .assign_pair_to_group(&f.pid, &f.group.group_id, &f.pair_12.pair_id, ACTOR)
            .unwrap();
        state.pair_api.delete_pair(&f.pid, &f.pair_12.pair_id, ACTOR).unwrap();

        let edit = state
            .group_api
            .edit_group(
                &f.pid,
                &f.group.group_id,
                &membership("Central-1", f.group.mandatory_clients[..2].to_vec()),
                ACTOR,
            )
            .unwrap();
        assert_eq!(edit.released_assignments, 3);
        assert_eq!(edit.rebuilt_assignments, 0);
        assert!(state.assignment_api.list_assignments(&f.pid).unwrap().is_empty());
    }
}
