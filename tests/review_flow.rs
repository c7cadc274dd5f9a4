//! End-to-end flows against a real Postgres. Run with
//! `DATABASE_URL=... cargo test -- --ignored`.

mod common;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use assetdrop::routes::router;
use common::{body_json, harness, json_request, owner_id};

async fn seed_project(pool: &PgPool, link_id: &str) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO projects (user_id, name, client_name, shareable_link_id)
        VALUES ($1, 'Brand refresh', 'Acme', $2)
        RETURNING id
        "#,
    )
    .bind(owner_id())
    .bind(link_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_drive_token(pool: &PgPool) {
    seed_drive_token_expiring(pool, Utc::now() + Duration::hours(1)).await;
}

async fn seed_drive_token_expiring(pool: &PgPool, expiry: chrono::DateTime<Utc>) {
    sqlx::query(
        r#"
        INSERT INTO user_tokens (user_id, access_token, refresh_token, token_expiry)
        VALUES ($1, 'access', 'refresh', $2)
        "#,
    )
    .bind(owner_id())
    .bind(expiry)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_pending_asset(pool: &PgPool, project_id: Uuid) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO assets (project_id, file_name, file_type, file_size,
                            google_drive_file_id, client_email)
        VALUES ($1, 'logo.png', 'image/png', 2048, 'drive-file-1', 'client@example.com')
        RETURNING id
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn multipart_upload(project_id: Uuid) -> Request<Body> {
    multipart_upload_named(project_id, "logo.png")
}

fn multipart_upload_named(project_id: Uuid, file_name: &str) -> Request<Body> {
    let boundary = "assetdrop-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"projectId\"\r\n\r\n{project_id}\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"clientEmail\"\r\n\r\nclient@example.com\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upload_without_connected_drive_stores_nothing(pool: PgPool) {
    let project_id = seed_project(&pool, "a1b2c3d4e5f6").await;
    let h = harness(pool.clone(), false);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("Google Drive not connected"));

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE project_id = $1")
        .bind(project_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upload_with_connected_drive_records_pending_asset(pool: PgPool) {
    let project_id = seed_project(&pool, "b1b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["asset"]["status"], "pending");
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 1);

    let folder: Option<String> =
        sqlx::query_scalar("SELECT google_drive_folder_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(folder.is_some());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reject_records_reason_and_removes_drive_file(pool: PgPool) {
    let project_id = seed_project(&pool, "c1b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let asset_id = seed_pending_asset(&pool, project_id).await;
    let h = harness(pool.clone(), false);

    let resp = router(h.state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/api/assets/{asset_id}/reject"),
            json!({ "reason": "blurry image" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["asset"]["status"], "rejected");
    assert_eq!(body["asset"]["rejection_reason"], "blurry image");
    assert_eq!(body["deleted_from_drive"], true);
    assert_eq!(h.drive.deletes.load(Ordering::SeqCst), 1);

    let logged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM activity_log WHERE project_id = $1 AND action_type = 'asset_rejected'",
    )
    .bind(project_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(logged, 1);

    // a second review of the same asset is refused and deletes nothing more
    let again = router(h.state)
        .oneshot(json_request(
            "POST",
            &format!("/api/assets/{asset_id}/approve"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.drive.deletes.load(Ordering::SeqCst), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn approve_keeps_remark_and_queues_client(pool: PgPool) {
    let project_id = seed_project(&pool, "d1b2c3d4e5f6").await;
    let asset_id = seed_pending_asset(&pool, project_id).await;
    let h = harness(pool.clone(), true);

    let resp = router(h.state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/api/assets/{asset_id}/approve"),
            json!({ "remark": "  looks great  " }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["asset"]["status"], "approved");
    assert_eq!(body["asset"]["approval_remark"], "looks great");
    assert_eq!(h.drive.deletes.load(Ordering::SeqCst), 0);

    let batch = router(h.state)
        .oneshot(
            common::authed(Request::builder().uri(format!("/api/projects/{project_id}/review-batch")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(batch.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn text_responses_are_stored_without_drive(pool: PgPool) {
    let project_id = seed_project(&pool, "e1b2c3d4e5f6").await;
    let field_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO form_fields (project_id, field_type, label, field_order)
        VALUES ($1, 'url_field', 'Website', 0)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    let h = harness(pool.clone(), false);

    let resp = router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/submit-text",
            json!({
                "projectId": project_id,
                "textResponses": [{
                    "form_field_id": field_id,
                    "file_name": null,
                    "metadata": { "field_type": "url_field", "content": "https://acme.example" },
                    "client_email": "client@example.com"
                }]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["assets"][0]["google_drive_file_id"], "text-response");
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 0);
}

async fn asset_count(pool: &PgPool, project_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE project_id = $1")
        .bind(project_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn text_submission(project_id: Uuid, field_id: Uuid, file_name: Option<&str>) -> Request<Body> {
    json_request(
        "POST",
        "/api/submit-text",
        json!({
            "projectId": project_id,
            "textResponses": [{
                "form_field_id": field_id,
                "file_name": file_name,
                "metadata": { "field_type": "text_input", "content": "Our tagline" },
                "client_email": "client@example.com"
            }]
        }),
    )
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn long_text_labels_are_cut_to_fit_and_long_names_refused(pool: PgPool) {
    let project_id = seed_project(&pool, "f1b2c3d4e5f6").await;
    let label = "L".repeat(255);
    let field_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO form_fields (project_id, field_type, label, field_order)
        VALUES ($1, 'text_input', $2, 0)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(&label)
    .fetch_one(&pool)
    .await
    .unwrap();
    let h = harness(pool.clone(), false);

    let resp = router(h.state.clone())
        .oneshot(text_submission(project_id, field_id, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let name = body["assets"][0]["file_name"].as_str().unwrap();
    assert_eq!(name.chars().count(), 255);
    assert!(name.ends_with(".txt"));

    let too_long = "n".repeat(256);
    let resp = router(h.state)
        .oneshot(text_submission(project_id, field_id, Some(&too_long)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(asset_count(&pool, project_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn oversized_upload_name_is_refused_before_drive(pool: PgPool) {
    let project_id = seed_project(&pool, "a2b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);

    let name = format!("{}.png", "x".repeat(260));
    let resp = router(h.state)
        .oneshot(multipart_upload_named(project_id, &name))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(h.drive.folders_created.load(Ordering::SeqCst), 0);
    assert_eq!(asset_count(&pool, project_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_asset_insert_removes_uploaded_drive_file(pool: PgPool) {
    let project_id = seed_project(&pool, "b2b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    sqlx::query(
        r#"
        CREATE FUNCTION refuse_asset_insert() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'asset inserts disabled';
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER refuse_asset_insert BEFORE INSERT ON assets
        FOR EACH ROW EXECUTE FUNCTION refuse_asset_insert()
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    let h = harness(pool.clone(), false);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(h.drive.deletes.load(Ordering::SeqCst), 1);
    assert!(h.drive.files.lock().unwrap().is_empty());
    assert_eq!(asset_count(&pool, project_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_uploads_share_one_project_folder(pool: PgPool) {
    let project_id = seed_project(&pool, "c2b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);

    let (first, second) = tokio::join!(
        router(h.state.clone()).oneshot(multipart_upload(project_id)),
        router(h.state.clone()).oneshot(multipart_upload(project_id)),
    );
    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);

    // root + project folder, once
    assert_eq!(h.drive.folders_created.load(Ordering::SeqCst), 2);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 2);
    assert_eq!(asset_count(&pool, project_id).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upload_with_token_refresh_fits_a_single_connection_pool(
    pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let pool = pool_opts
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_with(connect_opts)
        .await
        .unwrap();
    let project_id = seed_project(&pool, "d2b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);
    h.drive.reject_next.store(1, Ordering::SeqCst);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.oauth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(asset_count(&pool, project_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn revoked_grant_asks_for_reconnect_and_forgets_token(pool: PgPool) {
    let project_id = seed_project(&pool, "e2b2c3d4e5f6").await;
    seed_drive_token_expiring(&pool, Utc::now() - Duration::minutes(5)).await;
    let h = harness(pool.clone(), false);
    h.oauth.revoked.store(true, Ordering::SeqCst);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "token_revoked");
    assert_eq!(body["requiresReconnect"], true);

    let tokens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_tokens WHERE user_id = $1")
        .bind(owner_id())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tokens, 0);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(asset_count(&pool, project_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn rejected_access_token_is_refreshed_and_retried(pool: PgPool) {
    let project_id = seed_project(&pool, "f2b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);
    h.drive.reject_next.store(1, Ordering::SeqCst);

    let resp = router(h.state).oneshot(multipart_upload(project_id)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.oauth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.drive.uploads.load(Ordering::SeqCst), 1);

    let (access, refresh): (String, String) = sqlx::query_as(
        "SELECT access_token, refresh_token FROM user_tokens WHERE user_id = $1",
    )
    .bind(owner_id())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(access, "refreshed");
    assert_eq!(refresh, "refresh");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn uploaded_file_downloads_under_its_original_name(pool: PgPool) {
    let project_id = seed_project(&pool, "a3b2c3d4e5f6").await;
    seed_drive_token(&pool).await;
    let h = harness(pool.clone(), false);

    let resp = router(h.state.clone())
        .oneshot(multipart_upload(project_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let file_id = body["asset"]["google_drive_file_id"].as_str().unwrap().to_string();

    let resp = router(h.state)
        .oneshot(
            common::authed(
                Request::builder()
                    .uri(format!("/api/projects/{project_id}/download?fileId={file_id}")),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["file_name"], "logo.png");
    assert_eq!(body["downloadUrl"], format!("https://drive.example/{file_id}"));
    let stored = h.drive.files.lock().unwrap().get(&file_id).cloned().unwrap();
    assert_eq!(stored, ("logo.png".to_string(), b"PNGDATA".to_vec()));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn manual_notification_takes_client_out_of_the_batch(pool: PgPool) {
    let project_id = seed_project(&pool, "b3b2c3d4e5f6").await;
    let asset_id = seed_pending_asset(&pool, project_id).await;
    let h = harness(pool.clone(), true);

    let resp = router(h.state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/api/assets/{asset_id}/approve"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router(h.state.clone())
        .oneshot(json_request(
            "POST",
            "/api/send-review-notification",
            json!({ "clientEmail": "client@example.com", "projectId": project_id }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let batch = router(h.state)
        .oneshot(
            common::authed(Request::builder().uri(format!("/api/projects/{project_id}/review-batch")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(batch.status(), StatusCode::OK);
    let body = body_json(batch).await;
    assert_eq!(body["active"], false);
    assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
}
