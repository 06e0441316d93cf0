//! HTTP tests through the full router, backed by in-memory stores.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::*;
use serde_json::json;
use uuid::Uuid;

use gym_asset_register::auth::issue_token;
use gym_asset_register::services::vision::VisionError;

async fn submit(app: &TestApp, tag: Option<&str>) -> Uuid {
    let fields: Vec<(&str, &str)> = tag.map(|t| vec![("asset_tag", t)]).unwrap_or_default();
    let body = multipart_body("file", &png_photo(320, 240), &fields);
    let response = app.send(upload_request(body)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    json["job_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = build_test_app();
    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["queue"]["status"], "ok");
}

#[tokio::test]
async fn api_requires_credentials() {
    let app = build_test_app();

    let response = app
        .send(Request::get("/api/assets").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["kind"], "unauthorized");

    let response = app
        .send(
            Request::get("/api/assets")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_is_accepted() {
    let app = build_test_app();
    let token = issue_token(JWT_SECRET, "coach@gym", 300).unwrap();

    let response = app
        .send(
            Request::get("/api/reports/statistics")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_then_poll_until_completed() {
    let app = build_test_app();
    let job_id = submit(&app, Some("db-25-01")).await;

    let response = app.send(authed("GET", &format!("/api/analyze/{job_id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "pending");

    app.drain().await;

    let response = app.send(authed("GET", &format!("/api/analyze/{job_id}"))).await;
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["asset_tag"], "DB-25-01");
    assert_eq!(json["result"]["detected_tags"], json!(["DB-25-01"]));
    assert_eq!(json["result"]["equipment"][0]["type"], "dumbbell");
    assert!(json["error"].is_null());
    assert!(json["completed_at"].is_string());
}

#[tokio::test]
async fn image_field_name_is_accepted() {
    let app = build_test_app();
    let body = multipart_body("image", &png_photo(64, 64), &[]);
    let response = app.send(upload_request(body)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn invalid_uploads_are_rejected() {
    let app = build_test_app();

    let body = multipart_body("file", b"this is not an image", &[]);
    let response = app.send(upload_request(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid_input");

    let body = multipart_body("file", b"", &[]);
    let response = app.send(upload_request(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = multipart_body("attachment", &png_photo(8, 8), &[]);
    let response = app.send(upload_request(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.store.job_count().await, 0);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = build_test_app();
    let id = Uuid::new_v4();

    let response = app.send(authed("GET", &format!("/api/analyze/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["kind"], "not_found");

    let response = app
        .send(authed("POST", &format!("/api/analysis/reprocess/{id}")))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_job_id_is_not_found() {
    let app = build_test_app();

    let response = app.send(authed("GET", "/api/analyze/not-a-real-id")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "not_found");
    assert!(json["message"].as_str().unwrap().contains("not-a-real-id"));

    let response = app
        .send(authed("POST", "/api/analysis/reprocess/12345"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["kind"], "not_found");
}

#[tokio::test]
async fn reprocess_failed_job() {
    let app = build_test_app();
    app.vision.push(Err(VisionError::Unauthorized)).await;
    let job_id = submit(&app, None).await;
    app.drain().await;

    let response = app.send(authed("GET", &format!("/api/analyze/{job_id}"))).await;
    let json = body_json(response).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"]["kind"], "permanent");
    assert_eq!(json["error"]["retryable"], false);
    assert!(json["result"].is_null());

    let response = app
        .send(authed("POST", &format!("/api/analysis/reprocess/{job_id}")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "pending");

    app.drain().await;
    let response = app.send(authed("GET", &format!("/api/analyze/{job_id}"))).await;
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["retry_count"], 1);
}

#[tokio::test]
async fn reprocess_completed_job_conflicts() {
    let app = build_test_app();
    let job_id = submit(&app, None).await;
    app.drain().await;

    let response = app
        .send(authed("POST", &format!("/api/analysis/reprocess/{job_id}")))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "invalid_state");
}

#[tokio::test]
async fn history_lists_newest_first() {
    let app = build_test_app();
    let first = submit(&app, Some("KB-16")).await;
    let second = submit(&app, None).await;

    let response = app.send(authed("GET", "/api/analysis/history")).await;
    let json = body_json(response).await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.to_string(), first.to_string()]);

    let response = app
        .send(authed("GET", "/api/analysis/history?asset_tag=kb-16&limit=500"))
        .await;
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app
        .send(authed("GET", "/api/analysis/history?status=completed"))
        .await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn asset_crud_with_audit_trail() {
    let app = build_test_app();

    let response = app
        .send(authed_json(
            "POST",
            "/api/assets",
            json!({
                "asset_tag": "db-25-01",
                "item_type": "dumbbell",
                "location": "Rack A",
                "condition": "Good"
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["asset_tag"], "DB-25-01");

    let response = app
        .send(authed_json(
            "POST",
            "/api/assets",
            json!({"asset_tag": "DB-25-01", "item_type": "dumbbell", "location": "Rack B"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "conflict");

    let response = app
        .send(authed_json(
            "PUT",
            "/api/assets/DB-25-01",
            json!({"notes": "Rubber coating peeling", "status": "Out of Service"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Out of Service");
    assert_eq!(json["location"], "Rack A");

    let response = app
        .send(authed(
            "PATCH",
            "/api/assets/db-25-01/location?location=Stretching%20Area",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["asset"]["location"], "Stretching Area");

    let response = app
        .send(authed("GET", "/api/assets?search=stretching"))
        .await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app.send(authed("DELETE", "/api/assets/DB-25-01")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.send(authed("GET", "/api/assets/DB-25-01")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(authed("GET", "/api/reports/audit-logs?resource_type=asset"))
        .await;
    let actions: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["DELETE", "LOCATION_UPDATE", "UPDATE", "CREATE"]);
}

#[tokio::test]
async fn asset_validation_errors() {
    let app = build_test_app();

    let response = app
        .send(authed_json(
            "POST",
            "/api/assets",
            json!({"asset_tag": "", "item_type": "bench", "location": "Floor"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "validation");

    let response = app
        .send(authed_json(
            "POST",
            "/api/assets",
            json!({"asset_tag": "   ", "item_type": "bench", "location": "Floor"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "validation");

    let response = app
        .send(authed("PATCH", "/api/assets/DB-1/location?location=%20"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completed_analysis_refreshes_asset() {
    let app = build_test_app();
    app.send(authed_json(
        "POST",
        "/api/assets",
        json!({"asset_tag": "DB-25-01", "item_type": "dumbbell", "location": "Rack A"}),
    ))
    .await;

    submit(&app, Some("DB-25-01")).await;
    app.drain().await;

    let response = app.send(authed("GET", "/api/assets/DB-25-01")).await;
    let json = body_json(response).await;
    assert_eq!(json["condition"], "Fair");
    assert_eq!(json["weight"], "25 lbs");
    assert_eq!(json["description"], "Rubber hex dumbbell");
}

#[tokio::test]
async fn statistics_and_attention_reports() {
    let app = build_test_app();
    for (tag, status, condition) in [
        ("B-1", "Active", "Good"),
        ("B-2", "Missing", "Good"),
        ("B-3", "Active", "Needs Repair"),
    ] {
        let response = app
            .send(authed_json(
                "POST",
                "/api/assets",
                json!({
                    "asset_tag": tag,
                    "item_type": "bench",
                    "location": "Floor",
                    "status": status,
                    "condition": condition
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app.send(authed("GET", "/api/reports/statistics")).await;
    let json = body_json(response).await;
    assert_eq!(json["total_assets"], 3);
    assert_eq!(json["by_status"]["Active"], 2);
    assert_eq!(json["by_condition"]["Needs Repair"], 1);
    assert_eq!(json["by_type"]["bench"], 3);

    let response = app.send(authed("GET", "/api/reports/missing")).await;
    let json = body_json(response).await;
    assert_eq!(json[0]["asset_tag"], "B-2");

    let response = app.send(authed("GET", "/api/reports/repair")).await;
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["asset_tag"], "B-3");
}

#[tokio::test]
async fn transient_failures_recover_without_caller_involvement() {
    let app = build_test_app();
    app.vision.push(Err(VisionError::RateLimited)).await;
    app.vision.push(Err(VisionError::Timeout)).await;

    let job_id = submit(&app, None).await;
    app.drain().await;

    let response = app.send(authed("GET", &format!("/api/analyze/{job_id}"))).await;
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["attempts"], 3);
    assert_eq!(app.vision.calls(), 3);
}
