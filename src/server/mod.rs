//! HTTP service: routes under `/api/v1`.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::middleware;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;

pub mod auth;
pub mod routes;
pub mod state;

use auth::require_auth;
use routes::{
    compare_handler, delete_submission_handler, download_handler, generate_handler, profile_handler,
    profile_update_handler, submissions_handler, submit_handler,
};
use state::{AppState, SharedState};

/// Upload cap for submission files.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let authenticated = Router::new()
        .route("/generate", get(generate_handler).post(generate_handler))
        .route("/submit", post(submit_handler))
        .route("/submissions", get(submissions_handler))
        .route("/profile", get(profile_handler))
        .route("/profile-update", post(profile_update_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new()
        .route("/download/{filename}", get(download_handler))
        .route("/submission/{id}", delete(delete_submission_handler))
        .route("/compare/{id}", get(compare_handler));

    Router::new()
        .nest("/api/v1", authenticated.merge(public))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: Config) -> Result<(), AppError> {
    info!("Initializing state...");
    let state = AppState::new(config).await?;

    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::storage(format!("Failed to bind {address}: {e}")))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::storage(format!("Server error: {e}")))?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::data::DataSource;
    use crate::server::auth::TokenValidator;
    use crate::store::ObjectStore;

    const BOUNDARY: &str = "icar-test-boundary";

    fn write_inputs(dir: &Path) {
        let mut dataset = String::from("TestId,DaysInMilk,DailyMilkingYield,Parity,Herd\n");
        let mut actual = String::from("TestId,TotalActualProduction\n");
        for id in 0..12u32 {
            let parity = id % 3 + 1;
            for (day, y) in [(8, 22.0), (70, 31.5), (160, 26.0), (290, 14.0)] {
                dataset.push_str(&format!("{id},{day},{},{parity},H{}\n", y + f64::from(id), id % 2));
            }
            actual.push_str(&format!("{id},{}\n", 6900.0 + f64::from(id) * 95.0));
        }
        std::fs::write(dir.join("TestDataSet.csv"), dataset).unwrap();
        std::fs::write(dir.join("ActualMilkYields.csv"), actual).unwrap();
    }

    fn test_state(auth: TokenValidator) -> (SharedState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path());
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            sample_size: 10,
            ..Config::default()
        };
        let state = Arc::new(AppState {
            source: DataSource::Local(config.data_dir.clone()),
            config,
            store: ObjectStore::in_memory(),
            auth,
        });
        (state, dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<&str>) -> Body {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some(csv) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"yields.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn submit_request(email: &str, fields: &[(&str, &str)], file: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/submit?email={email}"))
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(multipart_body(fields, file))
            .unwrap()
    }

    #[tokio::test]
    async fn generate_submit_compare_delete_flow() {
        let (state, _dir) = test_state(TokenValidator::Disabled);
        let app = router(state.clone());

        let resp = send(&app, get("/api/v1/generate?email=ann@farm.org&name=Ann")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        let test_set_id = body["test_set_id"].as_str().unwrap().to_string();
        let link = body["download_link"].as_str().unwrap().to_string();
        assert!(link.starts_with("/api/v1/download/"));

        let resp = send(&app, get(&link)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let csv = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(csv.starts_with(b"TestId,DaysInMilk,DailyMilkingYield,Parity,Herd\n"));

        // Submit the reference values offset by 50 kg.
        let generate = state.store.read().await.generate(&test_set_id).cloned().unwrap();
        assert_eq!(generate.test_obj_ids.len(), 10);
        assert_eq!(generate.parity.len(), 10);
        let mut upload = String::from("TestObjectID,CalculatedMilkYield (kg)\n");
        for (id, y) in generate.test_obj_ids.iter().zip(&generate.calculated_milk_yields) {
            upload.push_str(&format!("{id},{}\n", y + 50.0));
        }
        let resp = send(
            &app,
            submit_request(
                "ann@farm.org",
                &[
                    ("test_set_id", &test_set_id),
                    ("calculation_method", "Test interval"),
                    ("country", "KE"),
                ],
                Some(&upload),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let submission_id = json_body(resp).await["submission_id"].as_str().unwrap().to_string();

        let resp = send(&app, get("/api/v1/submissions?email=ann@farm.org")).await;
        let list = json_body(resp).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["name"], "Ann");
        assert_eq!(list[0]["test_set_id"], test_set_id.as_str());

        let resp = send(&app, get(&format!("/api/v1/compare/{submission_id}"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let metrics = &body["metrics"];
        assert!((metrics["mean_absolute_error"].as_f64().unwrap() - 50.0).abs() < 1e-6);
        assert!((metrics["pearson_correlation"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert!(metrics["actual"].is_object());
        assert_eq!(body["details"]["country"], "KE");

        let resp = send(&app, get(&format!("/api/v1/compare/{submission_id}?download=true"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers()[axum::http::header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment"));
        let text = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
        assert!(text.contains("Reference vs submitted"));

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/submission/{submission_id}"))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&app, delete()).await.status(), StatusCode::OK);
        let resp = send(&app, delete()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn request_errors_use_the_error_envelope() {
        let (state, _dir) = test_state(TokenValidator::Disabled);
        let app = router(state);

        let resp = send(&app, get("/api/v1/generate")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("email"));

        let resp = send(&app, get("/api/v1/compare/nope")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, get("/api/v1/download/..%2Ffile.json")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&app, get("/api/v1/download/missing.csv")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Unknown user cannot submit.
        let resp = send(
            &app,
            submit_request(
                "ghost@farm.org",
                &[("test_set_id", "x"), ("calculation_method", "m")],
                Some("TestObjectID,CalculatedMilkYield (kg)\n1,100\n"),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, submit_request("ghost@farm.org", &[("test_set_id", "x")], None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "No file uploaded");
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let (state, _dir) = test_state(TokenValidator::Disabled);
        let app = router(state);

        let resp = send(&app, get("/api/v1/profile?email=bo@coop.org")).await;
        assert_eq!(json_body(resp).await["organization"], "");

        let update = Request::builder()
            .method("POST")
            .uri("/api/v1/profile-update")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email": "bo@coop.org", "organization": "Dairy Coop"}"#))
            .unwrap();
        let resp = send(&app, update).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["organization"], "Dairy Coop");

        let resp = send(&app, get("/api/v1/profile?email=bo@coop.org")).await;
        assert_eq!(json_body(resp).await["organization"], "Dairy Coop");

        let bad = Request::builder()
            .method("POST")
            .uri("/api/v1/profile-update")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        assert_eq!(send(&app, bad).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer_token() {
        let validator = TokenValidator::Remote {
            client: reqwest::Client::new(),
            userinfo_url: "http://127.0.0.1:9/userinfo".to_string(),
        };
        let (state, _dir) = test_state(validator);
        let app = router(state);

        let resp = send(&app, get("/api/v1/profile?email=a@b.c")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["success"], false);

        // Public routes stay open.
        let resp = send(&app, get("/api/v1/download/missing.csv")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
