// ==========================================
// 地理编码集成测试
// ==========================================
// 职责: 使用 mock HTTP 服务验证 Nominatim 解析与坐标回写
// ==========================================


#[cfg(test)]
mod geocoding_test {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;
    use volunteer_match::api::ApiError;
    use volunteer_match::config::config_keys;
    use volunteer_match::geocoding::{
        GeocodeFailureReason, GeocodingOracle, NominatimOracle,
    };

    use crate::test_helpers::{
        client, create_project, import_clients, setup_state, setup_state_with_oracle, ACTOR,
    };

    fn oracle(server: &MockServer) -> NominatimOracle {
        NominatimOracle::new(server.base_url(), "volunteer-match-test/0.1").unwrap()
    }

    #[tokio::test]
    async fn test_nominatim_parses_first_result() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/search")
                    .query_param("format", "json")
                    .query_param("q", "1 Bedok North Road");
                then.status(200).json_body(json!([
                    {"lat": "1.3275", "lon": "103.9302", "display_name": "Bedok"},
                    {"lat": "0.0", "lon": "0.0"}
                ]));
            })
            .await;

        let point = oracle(&server)
            .resolve("1 Bedok North Road")
            .await
            .unwrap()
            .unwrap();
        assert!((point.lat - 1.3275).abs() < 1e-9);
        assert!((point.lon - 103.9302).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_nominatim_empty_result_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(json!([]));
            })
            .await;

        assert_eq!(oracle(&server).resolve("nowhere").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_nominatim_server_error_is_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(503);
            })
            .await;

        assert!(oracle(&server).resolve("anywhere").await.is_err());
    }

    #[tokio::test]
    async fn test_geocode_clients_writes_back_resolved_coordinates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search").query_param("q", "10 Tampines Ave");
                then.status(200)
                    .json_body(json!([{"lat": "1.3540", "lon": "103.9450"}]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search").query_param("q", "Unknown Lane");
                then.status(200).json_body(json!([]));
            })
            .await;

        let oracle: Arc<dyn GeocodingOracle> = Arc::new(oracle(&server));
        let (_tmp, state) = setup_state_with_oracle(Some(oracle));
        let pid = create_project(&state, "地理编码").project_id;
        state
            .project_api
            .set_config(&pid, config_keys::GEOCODE_MIN_INTERVAL_MS, "0", ACTOR)
            .unwrap();

        let ids = import_clients(
            &state,
            &pid,
            vec![
                client(&pid, "Found", "Tampines", "").with_address("10 Tampines Ave"),
                client(&pid, "Missing", "Tampines", "").with_address("Unknown Lane"),
                client(&pid, "NoAddress", "Tampines", ""),
                client(&pid, "Known", "Bedok", "").with_coordinates(1.3, 103.9),
            ],
        );

        let cancel = AtomicBool::new(false);
        let report = state
            .geocode_api
            .geocode_clients(&pid, &cancel, ACTOR)
            .await
            .unwrap();
        assert_eq!(report.resolved_count, 1);
        assert_eq!(report.clients.len(), 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].client_id, ids[1]);
        assert_eq!(report.failures[0].reason, GeocodeFailureReason::NotFound);
        assert_eq!(report.failures[1].reason, GeocodeFailureReason::NoAddress);

        let stored = state.project_api.list_clients(&pid).unwrap();
        let found = stored.iter().find(|c| c.client_id == ids[0]).unwrap();
        let point = found.geo_point().unwrap();
        assert!((point.lat - 1.3540).abs() < 1e-9);
        assert!(stored.iter().find(|c| c.client_id == ids[1]).unwrap().geo_point().is_none());
        assert!(stored.iter().find(|c| c.client_id == ids[3]).unwrap().geo_point().is_some());

        let logs = state.project_api.list_action_logs(&pid, 5).unwrap();
        assert!(logs.iter().any(|l| l.action_type == "GEOCODE_CLIENTS"));
    }

    #[tokio::test]
    async fn test_geocode_without_oracle_is_external_dependency_error() {
        let (_tmp, state) = setup_state();
        let pid = create_project(&state, "无服务").project_id;
        import_clients(&state, &pid, vec![client(&pid, "A", "West", "").with_address("1 West Rd")]);

        let cancel = AtomicBool::new(false);
        let err = state
            .geocode_api
            .geocode_clients(&pid, &cancel, ACTOR)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ExternalDependency(_)));
    }

    #[tokio::test]
    async fn test_cancelled_geocode_writes_nothing() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(json!([{"lat": "1.0", "lon": "103.0"}]));
            })
            .await;

        let oracle: Arc<dyn GeocodingOracle> = Arc::new(oracle(&server));
        let (_tmp, state) = setup_state_with_oracle(Some(oracle));
        let pid = create_project(&state, "取消").project_id;
        import_clients(&state, &pid, vec![client(&pid, "A", "West", "").with_address("1 West Rd")]);

        let cancel = AtomicBool::new(true);
        let report = state
            .geocode_api
            .geocode_clients(&pid, &cancel, ACTOR)
            .await
            .unwrap();
        assert_eq!(report.resolved_count, 0);
        assert_eq!(report.failures[0].reason, GeocodeFailureReason::Cancelled);
        assert_eq!(mock.hits_async().await, 0);
        assert!(state.project_api.list_clients(&pid).unwrap()[0].geo_point().is_none());
    }
}
