use onboard_core::model::{ProgressUpdate, TaskId, UserId};
use serde_json::json;
use storage::beacon::{BeaconPayload, UnloadBeacon};
use storage::remote::{RemoteConfig, RemoteStore};
use storage::repository::{StorageError, VideoProgressRepository};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "6f1c1a52-3b55-4a0e-9d7e-1f7e7c0b9a11";

fn user() -> UserId {
    USER.parse().unwrap()
}

fn welcome() -> TaskId {
    TaskId::new("welcome_video")
}

fn store(server: &MockServer) -> RemoteStore {
    RemoteStore::new(RemoteConfig::new(server.uri(), "anon-key"))
}

#[tokio::test]
async fn update_calls_rpc_with_prefixed_params() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_video_progress"))
        .and(header("apikey", "anon-key"))
        .and(body_partial_json(json!({
            "p_user_id": USER,
            "p_task_id": "welcome_video",
            "p_current_position": 30.0,
            "p_duration": 120.0,
            "p_video_url": "https://cdn.example.test/a.mp4"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER,
            "task_id": "welcome_video",
            "current_position": 30.0,
            "duration": 120.0,
            "watch_percentage": 25.0,
            "completed": false,
            "video_url": "https://cdn.example.test/a.mp4",
            "last_watched_at": "2023-11-14T22:13:20Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = store(&server)
        .update_video_progress(
            &ProgressUpdate::new(user(), welcome(), 30.0, 120.0)
                .with_source_url(Some("https://cdn.example.test/a.mp4".into())),
        )
        .await
        .unwrap();

    assert_eq!(record.watch_percentage(), 25.0);
    assert_eq!(record.task_id(), &welcome());
}

#[tokio::test]
async fn read_maps_no_rows_code_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_progress"))
        .and(query_param("task_id", "eq.welcome_video"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned"
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .get_video_progress(user(), &welcome())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn read_surfaces_other_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_progress"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "code": "XX000",
            "message": "boom"
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .get_video_progress(user(), &welcome())
        .await
        .unwrap_err();
    match err {
        StorageError::Remote { code, message } => {
            assert_eq!(code, "XX000");
            assert_eq!(message, "boom");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn read_returns_single_object() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_progress"))
        .and(header("accept", "application/vnd.pgrst.object+json"))
        .and(query_param("user_id", format!("eq.{USER}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER,
            "task_id": 8,
            "current_position": 42.0,
            "duration": 140.0,
            "watch_percentage": 30.0,
            "completed": false
        })))
        .mount(&server)
        .await;

    let record = store(&server)
        .get_video_progress(user(), &welcome())
        .await
        .unwrap();
    assert!(record.should_offer_resume());
}

#[tokio::test]
async fn read_decodes_text_task_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_progress"))
        .and(query_param("task_id", "eq.welcome_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER,
            "task_id": "welcome_video",
            "current_position": 12.0,
            "duration": 48.0,
            "watch_percentage": 25.0,
            "completed": false,
            "video_url": "https://cdn.example.test/welcome.mp4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = store(&server)
        .get_video_progress(user(), &welcome())
        .await
        .unwrap();
    assert_eq!(record.task_id().as_str(), "welcome_video");
    assert_eq!(record.source_url(), Some("https://cdn.example.test/welcome.mp4"));
}

#[tokio::test]
async fn list_decodes_mixed_task_id_shapes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_progress"))
        .and(query_param("order", "task_id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "user_id": USER,
                "task_id": 3,
                "current_position": 1.0,
                "duration": 10.0
            },
            {
                "user_id": USER,
                "task_id": "welcome_video",
                "current_position": 5.0,
                "duration": 10.0,
                "completed": true
            }
        ])))
        .mount(&server)
        .await;

    let records = store(&server).list_video_progress(user()).await.unwrap();
    let tasks: Vec<&str> = records.iter().map(|r| r.task_id().as_str()).collect();
    assert_eq!(tasks, ["3", "welcome_video"]);
    assert!(records[1].completed());
}

#[tokio::test]
async fn beacon_posts_json_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/video-progress"))
        .and(body_partial_json(json!({ "task_id": "welcome_video", "duration": 140.0 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let beacon = store(&server).beacon();
    let queued = beacon.send(&BeaconPayload {
        user_id: user(),
        task_id: welcome(),
        current_position: 61.0,
        duration: 140.0,
    });
    assert!(queued);

    for _ in 0..50 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    server.verify().await;
}
