use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::app::pipeline::{build_test_set, compare_submission};
use crate::compare::ParityReport;
use crate::data::resolve_download;
use crate::domain::{Generate, MetricsResult, Submission, User};
use crate::error::AppError;
use crate::io::{read_actual_yields, read_daily_dataset, read_submission};
use crate::report::{ReportDetails, format_comparison};
use crate::server::state::SharedState;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    email: Option<String>,
    admin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    download: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    email: Option<String>,
    organization: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    id: String,
    generate_id: String,
    calculation_method: String,
    notes: String,
    download_url: String,
    organization: String,
    name: String,
    country: String,
    test_set_id: String,
    date: String,
}

#[derive(Debug, Serialize)]
struct ComparisonMetrics<'a> {
    #[serde(flatten)]
    overall: MetricsResult,
    ids: &'a [String],
    reference_yields: &'a [f64],
    submitted_yields: &'a [f64],
    actual: Option<MetricsResult>,
    parity_groups: &'a [ParityReport],
    unmatched: usize,
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::invalid_input(format!("Missing {name}")))
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::storage(format!("Background task failed: {e}"))
}

/// Sample a test set, publish it, and store the reference estimates.
pub async fn generate_handler(
    State(state): State<SharedState>,
    Query(query): Query<GenerateQuery>,
) -> Result<Json<Value>, AppError> {
    let email = required(query.email, "user email")?;
    let name = query.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let bytes = state.source.fetch_required(&state.config.dataset_name).await?;
    let (size, seed) = (state.config.sample_size, state.config.sample_seed);
    let test_set = tokio::task::spawn_blocking(move || {
        let dataset = read_daily_dataset(&bytes)?;
        build_test_set(&dataset, size, seed)
    })
    .await
    .map_err(join_error)??;

    let mut generate = Generate::new(String::new());
    let filename = format!("{}_{}.csv", generate.id, Utc::now().format("%Y%m%d%H%M%S"));
    let published = state
        .source
        .publish(&state.config.generated_dir(), &filename, test_set.csv.clone())
        .await?;

    test_set.fill(&mut generate);
    generate.download_url = published.stored_url;
    let test_set_id = generate.id.clone();

    state
        .store
        .update(move |objects| {
            let mut user = objects
                .find_user_by_email(&email)
                .cloned()
                .unwrap_or_else(|| User::new(email.as_str()));
            if let Some(name) = name {
                user.name = name;
            }
            user.updated_at = Utc::now();
            generate.user_id = user.id.clone();
            objects.insert(user);
            objects.insert(generate);
        })
        .await?;

    info!(%test_set_id, lactations = test_set.selected.len(), "Generated test set");
    Ok(Json(json!({
        "success": true,
        "test_set_id": test_set_id,
        "download_link": published.local_link,
    })))
}

/// Serve a generated test-set file.
pub async fn download_handler(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let path = resolve_download(&state.config.generated_dir(), &filename)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found(format!("File '{filename}' not found.")));
        }
        Err(e) => return Err(AppError::storage(format!("Failed to read '{filename}': {e}"))),
    };

    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response())
}

/// Accept a participant's calculated yields for a test set.
pub async fn submit_handler(
    State(state): State<SharedState>,
    Query(query): Query<EmailQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut file: Option<Vec<u8>> = None;
    let mut test_set_id = None;
    let mut calculation_method = None;
    let mut notes = String::new();
    let mut organization = String::new();
    let mut country = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            if field.file_name().is_some_and(str::is_empty) {
                return Err(AppError::invalid_input("Empty file name"));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::invalid_input(format!("Failed to read uploaded file: {e}")))?;
            file = Some(bytes.to_vec());
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| AppError::invalid_input(format!("Failed to read field '{name}': {e}")))?;
        match name.as_str() {
            "test_set_id" => test_set_id = Some(text),
            "calculation_method" => calculation_method = Some(text),
            "notes" => notes = text,
            "organization" => organization = text,
            "country" => country = text,
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::invalid_input("No file uploaded"))?;
    let rows = read_submission(&file)?;
    let email = required(query.email, "user email")?;

    let (Some(test_set_id), Some(calculation_method)) = (
        test_set_id.filter(|v| !v.trim().is_empty()),
        calculation_method.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(AppError::invalid_input(
            "Missing required metadata (test_set_id or calculation_method)",
        ));
    };

    let download_url = {
        let objects = state.store.read().await;
        if objects.find_user_by_email(&email).is_none() {
            return Err(AppError::not_found("User not found"));
        }
        objects
            .generate(test_set_id.trim())
            .map(|g| g.download_url.clone())
            .ok_or_else(|| AppError::not_found(format!("Test set ID not found: {test_set_id}")))?
    };

    let mut submission = Submission::new(test_set_id.trim());
    submission.calculation_method = calculation_method;
    submission.notes = notes;
    submission.organization = organization;
    submission.country = country;
    submission.download_url = download_url;
    let (ids, yields): (Vec<String>, Vec<f64>) = rows.into_iter().unzip();
    submission.test_obj_ids = ids;
    submission.calculated_milk_yields = yields;

    let submission_id = submission.id.clone();
    info!(%submission_id, test_set_id = %submission.generate_id, rows = submission.test_obj_ids.len(), "Stored submission");
    state.store.put(submission).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Submission uploaded successfully",
        "submission_id": submission_id,
    })))
}

/// A user's submissions, or every submission for admins.
pub async fn submissions_handler(
    State(state): State<SharedState>,
    Query(query): Query<SubmissionsQuery>,
) -> Result<Json<Vec<SubmissionView>>, AppError> {
    let email = required(query.email, "user email")?;
    let admin = query.admin.as_deref() == Some("yes");

    let objects = state.store.read().await;
    let owner_name = |s: &Submission| {
        objects
            .generate(&s.generate_id)
            .and_then(|g| objects.user(&g.user_id))
            .map(|u| u.name.clone())
            .unwrap_or_default()
    };

    let submissions: Vec<&Submission> = if admin {
        let mut all: Vec<&Submission> = objects.submissions().collect();
        all.sort_by_key(|s| s.created_at);
        all
    } else {
        let user = objects
            .find_user_by_email(&email)
            .ok_or_else(|| AppError::not_found("User not found"))?;
        objects
            .find_generates_by_user(&user.id)
            .into_iter()
            .flat_map(|g| objects.find_submissions_by_generate(&g.id))
            .collect()
    };

    let views = submissions
        .into_iter()
        .map(|s| SubmissionView {
            id: s.id.clone(),
            generate_id: s.generate_id.clone(),
            calculation_method: s.calculation_method.clone(),
            notes: s.notes.clone(),
            download_url: s.download_url.clone(),
            organization: s.organization.clone(),
            name: owner_name(s),
            country: s.country.clone(),
            test_set_id: s.generate_id.clone(),
            date: s.created_at.format(DATE_FORMAT).to_string(),
        })
        .collect();

    Ok(Json(views))
}

pub async fn delete_submission_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete("Submission", &id).await? {
        return Err(AppError::not_found("Submission not found"));
    }
    info!(submission_id = %id, "Deleted submission");
    Ok(Json(json!({
        "success": true,
        "message": "Submission deleted successfully",
    })))
}

/// Compare a submission with its test set (and the actual yields, when present).
pub async fn compare_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<CompareQuery>,
) -> Result<Response, AppError> {
    let (generate, submission, user) = {
        let objects = state.store.read().await;
        let submission = objects
            .submission(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Submission not found"))?;
        let generate = objects
            .generate(&submission.generate_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Generate object not found"))?;
        let user = objects
            .user(&generate.user_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("User not found"))?;
        (generate, submission, user)
    };

    if generate.calculated_milk_yields.is_empty() || submission.calculated_milk_yields.is_empty() {
        return Err(AppError::invalid_input("No milk yields found for comparison"));
    }

    let actual = match state.source.fetch(&state.config.actual_yields_name).await {
        Ok(Some(bytes)) => match read_actual_yields(&bytes) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(error = %e, "Actual yields unreadable; comparing against the reference only");
                None
            }
        },
        Ok(None) => {
            info!(name = %state.config.actual_yields_name, "No actual yields available");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to load actual yields; comparing against the reference only");
            None
        }
    };

    let details = ReportDetails {
        submission_id: submission.id.clone(),
        test_set_id: submission.generate_id.clone(),
        participant: user.name.clone(),
        organization: user.organization.clone(),
        country: submission.country.clone(),
        calculation_method: submission.calculation_method.clone(),
        notes: submission.notes.clone(),
        date_reported: submission.created_at.format(DATE_FORMAT).to_string(),
        dataset_link: submission.download_url.clone(),
    };

    let report = tokio::task::spawn_blocking(move || compare_submission(&generate, &submission, actual))
        .await
        .map_err(join_error)??;

    if query.download.as_deref() == Some("true") {
        let text = format_comparison(&details, &report);
        return Ok((
            [
                (CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"icar_comparison_{id}.txt\""),
                ),
            ],
            text,
        )
            .into_response());
    }

    let metrics = ComparisonMetrics {
        overall: report.overall,
        ids: &report.ids,
        reference_yields: &report.reference_yields,
        submitted_yields: &report.submitted_yields,
        actual: report.actual,
        parity_groups: &report.parity_groups,
        unmatched: report.unmatched,
    };

    Ok(Json(json!({
        "success": true,
        "message": "Comparison successful",
        "metrics": metrics,
        "details": {
            "organization": details.organization,
            "date_reported": details.date_reported,
            "calculation_method": details.calculation_method,
            "notes": details.notes,
            "country": details.country,
            "test_set_id": details.test_set_id,
            "dataset_link": details.dataset_link,
        },
    }))
    .into_response())
}

pub async fn profile_handler(
    State(state): State<SharedState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Value>, AppError> {
    let email = required(query.email, "email")?;
    let objects = state.store.read().await;
    let organization = objects
        .find_user_by_email(&email)
        .map(|u| u.organization.clone())
        .unwrap_or_default();
    Ok(Json(json!({ "organization": organization })))
}

pub async fn profile_update_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(update) = payload.map_err(|e| AppError::invalid_input(format!("Malformed request body: {e}")))?;
    let email = required(update.email, "email")?;
    let organization = update.organization.unwrap_or_default();

    let stored = state
        .store
        .update(move |objects| {
            let mut user = objects
                .find_user_by_email(&email)
                .cloned()
                .unwrap_or_else(|| User::new(email.as_str()));
            user.organization = organization;
            user.updated_at = Utc::now();
            let organization = user.organization.clone();
            objects.insert(user);
            organization
        })
        .await?;

    Ok(Json(json!({ "organization": stored })))
}
