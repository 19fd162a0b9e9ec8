use axum::http::StatusCode;
use float_cmp::approx_eq;
use peerboard_server::model::learner::{LeaderboardResponse, LessonDataResponse, LessonSummary};
use peerboard_server::response::ApiResponse;
use serde_json::{Value, json};

mod helpers;
use helpers::{
    assign_test_presenter, count_group_invites, create_test_invite, create_test_lesson,
    create_test_module, create_test_peer_group, create_test_presenter, create_test_progress,
    create_test_resource, create_test_tag, create_test_user, fetch_progress, fetch_user_group,
    setup_legacy_test_environment, setup_test_environment, tag_test_lesson,
};

// get_leaderboard

#[tokio::test]
async fn test_get_leaderboard_user_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/leaderboard?user_id=9999").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.status_code, 404);
    assert!(body.status_message.contains("User with ID 9999 not found"));
    assert!(body.data.is_none());
}

#[tokio::test]
async fn test_get_leaderboard_missing_user_id_param() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/leaderboard").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_leaderboard_no_group_returns_empty_state() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "solo@test.com", Some("Solo"), "normal", None).await;

    let response = server.get("/api/leaderboard?user_id=1").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();
    assert!(data.peer_group.is_none());
    assert!(data.entries.is_empty());
    assert!(data.last_updated.is_none());
}

#[tokio::test]
async fn test_get_leaderboard_dangling_group_returns_empty_state() {
    let (server, pool) = setup_test_environment().await;

    // peer_group_id points at a group that was never created
    create_test_user(&pool, 2, "lost@test.com", Some("Lost"), "normal", Some(777)).await;

    let response = server.get("/api/leaderboard?user_id=2").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();
    assert!(data.peer_group.is_none());
    assert!(data.entries.is_empty());
    assert!(data.last_updated.is_none());
}

#[tokio::test]
async fn test_get_leaderboard_two_normal_members() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 10, "Cohort A").await;
    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", Some(group_id)).await;
    create_test_user(&pool, 2, "b@test.com", Some("B"), "normal", Some(group_id)).await;

    let lesson1 = create_test_lesson(&pool, None, "Standard 1", false, 1).await;
    let lesson2 = create_test_lesson(&pool, None, "Standard 2", false, 2).await;
    let _enhanced = create_test_lesson(&pool, None, "Enhanced", true, 3).await;

    create_test_progress(&pool, 1, lesson1, Some(100.0)).await;
    create_test_progress(&pool, 1, lesson2, Some(100.0)).await;
    create_test_progress(&pool, 2, lesson1, Some(100.0)).await;

    let response = server.get("/api/leaderboard?user_id=1").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();

    let group = data.peer_group.unwrap();
    assert_eq!(group.id, group_id);
    assert_eq!(group.name, "Cohort A");

    assert_eq!(data.entries.len(), 2);
    assert_eq!(data.entries[0].id, 1);
    assert!(approx_eq!(f64, data.entries[0].percent, 100.0, ulps = 2));
    assert_eq!(data.entries[0].rank, 1);
    assert_eq!(data.entries[1].id, 2);
    assert!(approx_eq!(f64, data.entries[1].percent, 50.0, ulps = 2));
    assert_eq!(data.entries[1].rank, 2);

    assert!(data.last_updated.is_some());
}

#[tokio::test]
async fn test_get_leaderboard_enhanced_member_divides_by_all_lessons() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 11, "Cohort B").await;
    create_test_user(&pool, 3, "c@test.com", Some("C"), "enhanced", Some(group_id)).await;

    let _lesson1 = create_test_lesson(&pool, None, "Standard 1", false, 1).await;
    let _lesson2 = create_test_lesson(&pool, None, "Standard 2", false, 2).await;
    let enhanced = create_test_lesson(&pool, None, "Enhanced", true, 3).await;

    create_test_progress(&pool, 3, enhanced, Some(100.0)).await;

    let response = server.get("/api/leaderboard?user_id=3").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data.entries.len(), 1);
    assert!(approx_eq!(
        f64,
        data.entries[0].percent,
        100.0 / 3.0,
        ulps = 2
    ));
}

#[tokio::test]
async fn test_get_leaderboard_no_progress_rows() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 12, "Cohort C").await;
    create_test_user(&pool, 4, "d@test.com", Some("D"), "normal", Some(group_id)).await;
    create_test_user(&pool, 5, "e@test.com", Some("E"), "normal", Some(group_id)).await;
    create_test_lesson(&pool, None, "Standard 1", false, 1).await;

    let response = server.get("/api/leaderboard?user_id=4").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();
    assert!(data.last_updated.is_none());
    assert_eq!(data.entries.len(), 2);
    assert_eq!(data.entries[0].id, 4);
    assert_eq!(data.entries[0].rank, 1);
    assert_eq!(data.entries[1].id, 5);
    assert_eq!(data.entries[1].rank, 2);
    assert!(data.entries.iter().all(|entry| entry.percent == 0.0));
}

#[tokio::test]
async fn test_get_leaderboard_is_idempotent() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 13, "Cohort D").await;
    create_test_user(&pool, 6, "f@test.com", Some("F"), "normal", Some(group_id)).await;
    create_test_user(&pool, 7, "g@test.com", Some("G"), "enhanced", Some(group_id)).await;
    let lesson = create_test_lesson(&pool, None, "Standard", false, 1).await;
    create_test_progress(&pool, 6, lesson, Some(40.0)).await;

    let first = server.get("/api/leaderboard?user_id=6").await;
    let second = server.get("/api/leaderboard?user_id=6").await;

    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(first.json::<Value>(), second.json::<Value>());
}

#[tokio::test]
async fn test_get_leaderboard_accepts_camel_case_alias() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 8, "h@test.com", Some("H"), "normal", None).await;

    let response = server.get("/api/leaderboard?userId=8").await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_leaderboard_falls_back_to_email_local_part() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 14, "Cohort E").await;
    create_test_user(&pool, 9, "nameless@test.com", None, "normal", Some(group_id)).await;

    let response = server.get("/api/leaderboard?user_id=9").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LeaderboardResponse> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data.entries[0].name, "nameless");
}

// get_lessons

#[tokio::test]
async fn test_get_lessons_hides_enhanced_from_normal_users() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;

    let module_id = create_test_module(&pool, "Module 1", 1).await;
    let standard = create_test_lesson(&pool, Some(module_id), "Standard", false, 1).await;
    let _enhanced = create_test_lesson(&pool, Some(module_id), "Enhanced", true, 2).await;

    let response = server.get("/api/lessons?user_id=1").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Vec<LessonSummary>> = response.json();
    let lessons = body.data.unwrap();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].id, standard);
    assert!(!lessons[0].is_enhanced_only);
}

#[tokio::test]
async fn test_get_lessons_includes_enhanced_for_enhanced_users() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 2, "b@test.com", Some("B"), "enhanced", None).await;

    let module_id = create_test_module(&pool, "Module 1", 1).await;
    create_test_lesson(&pool, Some(module_id), "Standard", false, 1).await;
    create_test_lesson(&pool, Some(module_id), "Enhanced", true, 2).await;

    let response = server.get("/api/lessons?user_id=2").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Vec<LessonSummary>> = response.json();
    assert_eq!(body.data.unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_lessons_attaches_own_progress() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 3, "c@test.com", Some("C"), "normal", None).await;

    let lesson1 = create_test_lesson(&pool, None, "Started", false, 1).await;
    let _lesson2 = create_test_lesson(&pool, None, "Untouched", false, 2).await;
    create_test_progress(&pool, 3, lesson1, Some(65.0)).await;

    let response = server.get("/api/lessons?user_id=3").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Vec<LessonSummary>> = response.json();
    let lessons = body.data.unwrap();
    assert_eq!(lessons.len(), 2);

    let started = lessons.iter().find(|lesson| lesson.id == lesson1).unwrap();
    assert!(approx_eq!(f64, started.progress_percent, 65.0, ulps = 2));
    let untouched = lessons.iter().find(|lesson| lesson.id != lesson1).unwrap();
    assert_eq!(untouched.progress_percent, 0.0);
}

#[tokio::test]
async fn test_get_lessons_user_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/lessons?user_id=404").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// get_lesson_data

#[tokio::test]
async fn test_get_lesson_data_normalizes_associations() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;

    let module_id = create_test_module(&pool, "Module 1", 1).await;
    let lesson_id = create_test_lesson(&pool, Some(module_id), "Lesson", false, 1).await;

    let presenter_id = create_test_presenter(&pool, "Dr. Lovelace").await;
    assign_test_presenter(&pool, lesson_id, presenter_id).await;

    let tag_id = create_test_tag(&pool, "algebra").await;
    tag_test_lesson(&pool, lesson_id, tag_id).await;

    create_test_resource(
        &pool,
        lesson_id,
        "Slides",
        "https://cdn.test/slides.pdf",
        Some("slides"),
        Some(1),
    )
    .await;

    let response = server
        .get(&format!(
            "/api/lesson_data?user_id=1&lesson_id={}",
            lesson_id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LessonDataResponse> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data.id, lesson_id);
    assert_eq!(data.module_id, Some(module_id));
    assert!(!data.legacy_resource_schema);

    assert_eq!(data.presenters.len(), 1);
    assert_eq!(data.presenters[0].name, "Dr. Lovelace");
    assert_eq!(data.tags.len(), 1);
    assert_eq!(data.tags[0].name, "algebra");
    assert_eq!(data.resources.len(), 1);
    assert_eq!(data.resources[0].category.as_deref(), Some("slides"));
    assert_eq!(data.resources[0].position, Some(1));
}

#[tokio::test]
async fn test_get_lesson_data_enhanced_only_hidden_from_normal_user() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Enhanced", true, 1).await;

    let response = server
        .get(&format!(
            "/api/lesson_data?user_id=1&lesson_id={}",
            lesson_id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_lesson_data_visible_to_admin() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "admin@test.com", Some("Admin"), "admin", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Enhanced", true, 1).await;

    let response = server
        .get(&format!(
            "/api/lesson_data?user_id=1&lesson_id={}",
            lesson_id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_lesson_data_lesson_not_found() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;

    let response = server.get("/api/lesson_data?user_id=1&lesson_id=4242").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_lesson_data_legacy_schema_omits_resource_metadata() {
    let (server, pool) = setup_legacy_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Lesson", false, 1).await;
    create_test_resource(
        &pool,
        lesson_id,
        "Slides",
        "https://cdn.test/slides.pdf",
        Some("slides"),
        Some(1),
    )
    .await;

    let response = server
        .get(&format!(
            "/api/lesson_data?user_id=1&lesson_id={}",
            lesson_id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<LessonDataResponse> = response.json();
    let data = body.data.unwrap();
    assert!(data.legacy_resource_schema);
    assert_eq!(data.resources.len(), 1);
    assert!(data.resources[0].category.is_none());
    assert!(data.resources[0].position.is_none());
}

// save_progress

#[tokio::test]
async fn test_save_progress_inserts_then_updates_single_row() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Lesson", false, 1).await;

    let first = server
        .post("/api/save_progress")
        .json(&json!({"user_id": 1, "lesson_id": lesson_id, "progress_percent": 30.0}))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(fetch_progress(&pool, 1, lesson_id).await, Some(Some(30.0)));

    let second = server
        .post("/api/save_progress")
        .json(&json!({"user_id": 1, "lesson_id": lesson_id, "progress_percent": 80.0}))
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(fetch_progress(&pool, 1, lesson_id).await, Some(Some(80.0)));

    assert_eq!(helpers::count_progress_rows(&pool, 1).await, 1);
}

#[tokio::test]
async fn test_save_progress_clamps_out_of_range_values() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Lesson", false, 1).await;

    let response = server
        .post("/api/save_progress")
        .json(&json!({"user_id": 1, "lesson_id": lesson_id, "progress_percent": 250.0}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(fetch_progress(&pool, 1, lesson_id).await, Some(Some(100.0)));
}

#[tokio::test]
async fn test_save_progress_unknown_lesson() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;

    let response = server
        .post("/api/save_progress")
        .json(&json!({"user_id": 1, "lesson_id": 4242, "progress_percent": 10.0}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_save_progress_enhanced_only_rejected_for_normal_user() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let lesson_id = create_test_lesson(&pool, None, "Enhanced", true, 1).await;

    let response = server
        .post("/api/save_progress")
        .json(&json!({"user_id": 1, "lesson_id": lesson_id, "progress_percent": 10.0}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(fetch_progress(&pool, 1, lesson_id).await, None);
}

// session

#[tokio::test]
async fn test_session_sso_wins_over_local() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "sso@test.com", Some("Sso"), "normal", None).await;
    create_test_user(&pool, 2, "local@test.com", Some("Local"), "normal", None).await;

    let response = server
        .get("/api/session?sso_user_id=1&local_user_id=2")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Value> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data["kind"], "sso");
    assert_eq!(data["user"]["id"], 1);
}

#[tokio::test]
async fn test_session_local_when_no_sso() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 2, "local@test.com", Some("Local"), "normal", None).await;

    let response = server.get("/api/session?local_user_id=2").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Value> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data["kind"], "local");
    assert_eq!(data["user"]["id"], 2);
}

#[tokio::test]
async fn test_session_anonymous_without_credentials() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/session").await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.data.unwrap()["kind"], "anonymous");
}

#[tokio::test]
async fn test_session_dangling_sso_falls_through_to_local() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 2, "local@test.com", Some("Local"), "normal", None).await;

    let response = server
        .get("/api/session?sso_user_id=9999&local_user_id=2")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<Value> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data["kind"], "local");
    assert_eq!(data["user"]["id"], 2);
}

// claim_group_invite

#[tokio::test]
async fn test_claim_group_invite_joins_group_and_consumes_invite() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 20, "Invited Cohort").await;
    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;
    let invite = create_test_invite(&pool, group_id).await;

    let response = server
        .post("/api/claim_group_invite")
        .json(&json!({"user_id": 1, "uuid": invite}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let body: ApiResponse<i64> = response.json();
    assert_eq!(body.data.unwrap(), group_id);
    assert_eq!(fetch_user_group(&pool, 1).await, Some(group_id));
    assert_eq!(count_group_invites(&pool, group_id).await, 0);

    // single-use: a second claim must fail
    let second = server
        .post("/api/claim_group_invite")
        .json(&json!({"user_id": 1, "uuid": invite}))
        .await;
    assert_eq!(second.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_claim_group_invite_unknown_invite() {
    let (server, pool) = setup_test_environment().await;

    create_test_user(&pool, 1, "a@test.com", Some("A"), "normal", None).await;

    let response = server
        .post("/api/claim_group_invite")
        .json(&json!({"user_id": 1, "uuid": "00000000-0000-0000-0000-000000000000"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_claim_group_invite_unknown_user_leaves_invite_in_place() {
    let (server, pool) = setup_test_environment().await;

    let group_id = create_test_peer_group(&pool, 21, "Cohort").await;
    let invite = create_test_invite(&pool, group_id).await;

    let response = server
        .post("/api/claim_group_invite")
        .json(&json!({"user_id": 9999, "uuid": invite}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(count_group_invites(&pool, group_id).await, 1);
}
