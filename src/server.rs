use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::jobs;
use crate::models::{Language, Translation, TranslationJob};
use crate::provider;
use crate::queue::Queue;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub queue: Queue,
    pub client: reqwest::Client,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidLanguage(_)
            | Error::NoWorkAvailable
            | Error::InvalidState(_)
            | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ==================== Request/Query Types ====================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkTranslateRequest {
    source_language: String,
    target_language: String,
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct CreateTranslationRequest {
    key: Option<String>,
    #[serde(default)]
    values: HashMap<String, String>,
}

#[derive(Deserialize)]
struct UpdateTranslationRequest {
    key: Option<String>,
    #[serde(default)]
    values: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRecordRequest {
    source_text: String,
    source_language: String,
    target_languages: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoTranslateRequest {
    text: String,
    source_language: String,
    target_language: String,
}

#[derive(Deserialize)]
struct ImportRequest {
    locale: String,
    translations: Vec<ImportEntry>,
}

#[derive(Deserialize)]
struct ImportEntry {
    key: Option<String>,
    #[serde(default)]
    values: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ExportParams {
    locale: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLanguageRequest {
    name: Option<String>,
    is_default: Option<bool>,
    is_active: Option<bool>,
}

/// Build the full application router. The public read route carries its own
/// permissive CORS layer; everything else is same-origin API surface.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/public/translations/:locale", get(public_translations))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/translations",
            get(list_translations).post(create_translation),
        )
        .route("/api/translations/export", get(export_translations))
        .route("/api/translations/import", post(import_translations))
        .route("/api/translations/auto-translate", post(auto_translate))
        .route(
            "/api/translations/bulk-translate",
            post(submit_bulk_translate),
        )
        .route(
            "/api/translations/bulk-translate/prepare",
            post(prepare_bulk_translate),
        )
        .route(
            "/api/translations/bulk-translate/history",
            get(bulk_translate_history),
        )
        .route(
            "/api/translations/bulk-translate/:job_id",
            get(get_bulk_translate_job).delete(cancel_bulk_translate_job),
        )
        .route(
            "/api/translations/:id",
            get(get_translation)
                .put(update_translation)
                .delete(delete_translation),
        )
        .route("/api/translations/:id/translate", post(translate_record))
        .route("/api/languages", get(list_languages).post(create_language))
        .route(
            "/api/languages/:code",
            put(update_language).delete(delete_language),
        )
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ==================== Bulk Translation Jobs ====================

async fn submit_bulk_translate(
    State(state): State<AppState>,
    Json(body): Json<BulkTranslateRequest>,
) -> Result<Json<Value>> {
    let job = jobs::submit_bulk_job(
        &state.db,
        &state.queue,
        &body.source_language,
        &body.target_language,
    )?;

    Ok(Json(json!({
        "success": true,
        "jobId": job.job_id,
        "message": format!("Translation job started for {} texts", job.progress.total),
    })))
}

async fn prepare_bulk_translate(
    State(state): State<AppState>,
    Json(body): Json<BulkTranslateRequest>,
) -> Result<Json<jobs::JobPreview>> {
    let preview =
        jobs::prepare_bulk_job(&state.db, &body.source_language, &body.target_language)?;
    Ok(Json(preview))
}

async fn bulk_translate_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>> {
    let history = jobs::recent_jobs(&state.db, params.limit)?;
    Ok(Json(json!({ "jobs": history })))
}

async fn get_bulk_translate_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<TranslationJob>> {
    Ok(Json(jobs::get_job(&state.db, &job_id)?))
}

async fn cancel_bulk_translate_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>> {
    jobs::cancel_job(&state.db, &job_id)?;
    Ok(Json(json!({
        "success": true,
        "message": "Translation job cancelled",
    })))
}

// ==================== Translations CRUD ====================

async fn list_translations(State(state): State<AppState>) -> Result<Json<Vec<Translation>>> {
    Ok(Json(state.db.list_translations()?))
}

async fn create_translation(
    State(state): State<AppState>,
    Json(body): Json<CreateTranslationRequest>,
) -> Result<impl IntoResponse> {
    let key = required_key(body.key.as_deref())?;

    if state.db.get_translation_by_key(key)?.is_some() {
        return Err(Error::Validation(
            "translation key already exists".to_string(),
        ));
    }

    let record = state.db.insert_translation(key, &body.values)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_translation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Translation>> {
    let record = state
        .db
        .get_translation(id)?
        .ok_or(Error::NotFound("translation"))?;
    Ok(Json(record))
}

async fn update_translation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTranslationRequest>,
) -> Result<Json<Translation>> {
    let key = required_key(body.key.as_deref())?;

    let existing = state
        .db
        .get_translation(id)?
        .ok_or(Error::NotFound("translation"))?;

    if key != existing.key && state.db.get_translation_by_key(key)?.is_some() {
        return Err(Error::Validation(
            "translation key already exists".to_string(),
        ));
    }

    state.db.update_translation(id, key, &body.values)?;
    Ok(Json(Translation {
        id,
        key: key.to_string(),
        values: body.values,
    }))
}

async fn delete_translation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    if !state.db.delete_translation(id)? {
        return Err(Error::NotFound("translation"));
    }
    Ok(Json(json!({ "success": true })))
}

fn required_key(key: Option<&str>) -> Result<&str> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Validation("translation key is required".to_string()))
}

// ==================== Single-Record Translation ====================

/// Translate one text into several targets and persist each value on the
/// record. A target that fails (provider error, unknown code) is skipped and
/// logged; the rest still go through.
async fn translate_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TranslateRecordRequest>,
) -> Result<Json<Value>> {
    let record = state
        .db
        .get_translation(id)?
        .ok_or(Error::NotFound("translation"))?;

    if body.source_text.trim().is_empty() {
        return Err(Error::Validation("sourceText is required".to_string()));
    }

    let names: HashMap<String, String> = state
        .db
        .list_languages()?
        .into_iter()
        .map(|l| (l.code, l.name))
        .collect();
    let source_name = names
        .get(&body.source_language)
        .ok_or_else(|| Error::InvalidLanguage("source language does not exist".to_string()))?;

    let mut translated = HashMap::new();
    for target in &body.target_languages {
        // A target equal to the source would overwrite the source text
        if target == &body.source_language {
            continue;
        }
        let Some(target_name) = names.get(target) else {
            warn!("Skipping unknown target language '{}'", target);
            continue;
        };

        match provider::translate_text(
            &state.client,
            &state.config,
            &body.source_text,
            source_name,
            target_name,
        )
        .await
        {
            Ok(text) => {
                state.db.set_translation_value(record.id, target, &text)?;
                translated.insert(target.clone(), text);
            }
            Err(e) => {
                warn!(
                    "Failed to translate record {} into '{}': {}",
                    record.id, target, e
                );
            }
        }
    }

    Ok(Json(json!({ "success": true, "translations": translated })))
}

async fn auto_translate(
    State(state): State<AppState>,
    Json(body): Json<AutoTranslateRequest>,
) -> Result<Json<Value>> {
    if body.text.trim().is_empty() {
        return Err(Error::Validation("text is required".to_string()));
    }

    let names: HashMap<String, String> = state
        .db
        .active_language_pair(&body.source_language, &body.target_language)?
        .into_iter()
        .map(|l| (l.code, l.name))
        .collect();
    let (Some(source_name), Some(target_name)) = (
        names.get(&body.source_language),
        names.get(&body.target_language),
    ) else {
        return Err(Error::InvalidLanguage(
            "one or both languages do not exist or are not active".to_string(),
        ));
    };

    let translation = provider::translate_text(
        &state.client,
        &state.config,
        &body.text,
        source_name,
        target_name,
    )
    .await?;

    Ok(Json(json!({ "translation": translation })))
}

// ==================== Import / Export ====================

async fn import_translations(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> Result<Json<Value>> {
    let locale = body.locale.trim();
    if locale.is_empty() {
        return Err(Error::Validation("import locale is required".to_string()));
    }

    let mut results = Vec::new();
    for entry in &body.translations {
        let Some(key) = entry.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) else {
            return Err(Error::Validation(
                "all translations must have a key".to_string(),
            ));
        };

        let value = entry
            .values
            .get(locale)
            .map(|v| provider::clean_translation(v));

        let action = match state.db.get_translation_by_key(key)? {
            Some(existing) => {
                if let Some(text) = &value {
                    state.db.set_translation_value(existing.id, locale, text)?;
                }
                "updated"
            }
            None => {
                let mut values = HashMap::new();
                if let Some(text) = value {
                    values.insert(locale.to_string(), text);
                }
                state.db.insert_translation(key, &values)?;
                "inserted"
            }
        };

        results.push(json!({ "key": key, "action": action }));
    }

    Ok(Json(json!({ "success": true, "results": results })))
}

async fn export_translations(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Json<BTreeMap<String, String>>> {
    let locale = params
        .locale
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::Validation("locale query parameter is required".to_string()))?;

    Ok(Json(state.db.translations_for_locale(locale)?))
}

async fn public_translations(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> Result<Json<BTreeMap<String, String>>> {
    Ok(Json(state.db.translations_for_locale(&locale)?))
}

// ==================== Languages ====================

async fn list_languages(State(state): State<AppState>) -> Result<Json<Vec<Language>>> {
    let languages = state.db.list_languages()?;
    if languages.is_empty() {
        // First run: seed the catalog so the UI has something to offer
        return Ok(Json(state.db.seed_default_languages()?));
    }
    Ok(Json(languages))
}

async fn create_language(
    State(state): State<AppState>,
    Json(language): Json<Language>,
) -> Result<impl IntoResponse> {
    if language.code.trim().is_empty() || language.name.trim().is_empty() {
        return Err(Error::Validation(
            "language code and name are required".to_string(),
        ));
    }

    if state.db.get_language(&language.code)?.is_some() {
        return Err(Error::Validation(
            "language code already exists".to_string(),
        ));
    }

    state.db.insert_language(&language)?;
    Ok((StatusCode::CREATED, Json(language)))
}

async fn update_language(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<UpdateLanguageRequest>,
) -> Result<Json<Language>> {
    let updated = state.db.update_language(
        &code,
        body.name.as_deref(),
        body.is_default,
        body.is_active,
    )?;
    if !updated {
        return Err(Error::NotFound("language"));
    }

    let language = state
        .db
        .get_language(&code)?
        .ok_or(Error::NotFound("language"))?;
    Ok(Json(language))
}

async fn delete_language(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>> {
    let language = state
        .db
        .get_language(&code)?
        .ok_or(Error::NotFound("language"))?;

    if language.is_default {
        return Err(Error::Validation(
            "cannot delete the default language".to_string(),
        ));
    }

    state.db.delete_language(&code)?;
    let removed = state.db.remove_locale_values(&code)?;
    info!(
        "Deleted language {} and removed its value from {} translation records",
        code, removed
    );

    Ok(Json(json!({ "success": true })))
}
