//! REST interface over [`TemplateService`].

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};

use contrato_core::constants::DOCX_MEDIA_TYPE;
use contrato_core::{
    BlockIssue, Document, ReviewReport, SavePolicy, SavedTemplate, Template, TemplateError,
    TemplateService,
};

type ApiError = (StatusCode, String);

/// Token written by a mark request.
const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-contrato-token");
/// Number of occurrences a mark request replaced.
const OCCURRENCES_HEADER: HeaderName = HeaderName::from_static("x-contrato-occurrences");

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    template_service: TemplateService,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ListTemplatesRes {
    pub templates: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TemplateRes {
    pub name: String,
    pub variables: Vec<String>,
    pub version: u64,
    /// RFC 3339 timestamp of the last save
    pub last_modified: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MalformedBlockRes {
    pub block: usize,
    pub issue: String,
    pub preview: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReviewRes {
    pub declared: Vec<String>,
    pub discovered: Vec<String>,
    pub missing_in_document: Vec<String>,
    pub missing_in_variables: Vec<String>,
    pub malformed_blocks: Vec<MalformedBlockRes>,
}

impl From<ReviewReport> for ReviewRes {
    fn from(report: ReviewReport) -> Self {
        Self {
            declared: report.declared.into_iter().collect(),
            discovered: report.discovered.into_iter().collect(),
            missing_in_document: report.missing_in_document.into_iter().collect(),
            missing_in_variables: report.missing_in_variables.into_iter().collect(),
            malformed_blocks: report
                .malformed_blocks
                .into_iter()
                .map(|b| MalformedBlockRes {
                    block: b.block,
                    issue: match b.issue {
                        BlockIssue::UnterminatedToken { .. } => "unterminated_token".into(),
                        BlockIssue::Fragmented { .. } => "fragmented".into(),
                    },
                    preview: b.preview,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FillReq {
    pub values: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveRes {
    pub name: String,
    pub version: u64,
    /// RFC 3339 timestamp of the save
    pub last_modified: String,
    /// Backup of the replaced snapshot, relative to the data directory
    pub backup: Option<String>,
    /// Review warnings the template was saved with
    pub warnings: Vec<String>,
}

impl SaveRes {
    fn new(name: &str, saved: SavedTemplate) -> Self {
        Self {
            name: name.to_owned(),
            version: saved.outcome.version,
            last_modified: saved.outcome.last_modified.to_rfc3339(),
            backup: saved.outcome.backup.map(|p| p.display().to_string()),
            warnings: saved.review.warnings(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MarkParams {
    /// Exact text to replace
    pub selection: String,
    /// Variable name, `[A-Za-z0-9_]+`
    pub name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReviewParams {
    /// Comma-separated declared variables
    pub variables: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SaveParams {
    /// Comma-separated declared variables
    pub variables: Option<String>,
    /// Save even if the review has warnings
    #[serde(default)]
    pub force: bool,
}

fn declared(variables: Option<&str>) -> Vec<String> {
    variables
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_templates,
        get_template,
        create_template,
        save_template,
        review_template,
        fill_template,
        mark_document,
        review_document
    ),
    components(schemas(
        HealthRes,
        ListTemplatesRes,
        TemplateRes,
        MalformedBlockRes,
        ReviewRes,
        FillReq,
        SaveRes
    ))
)]
struct ApiDoc;

/// Builds the REST router.
pub fn router(template_service: TemplateService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route(
            "/templates/:name",
            get(get_template).post(create_template).put(save_template),
        )
        .route("/templates/:name/review", get(review_template))
        .route("/templates/:name/fill", post(fill_template))
        .route("/documents/mark", post(mark_document))
        .route("/documents/review", post(review_document))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(AppState { template_service })
}

/// Maps a core error to an HTTP status, logging anything unexpected.
fn api_error(operation: &str, name: &str, e: TemplateError) -> ApiError {
    match e {
        TemplateError::TemplateNotFound(_) => {
            (StatusCode::NOT_FOUND, format!("template {} not found", name))
        }
        TemplateError::InvalidTemplateName(reason)
        | TemplateError::InvalidTemplate(reason)
        | TemplateError::InvalidInput(reason) => (StatusCode::BAD_REQUEST, reason),
        e @ TemplateError::MalformedDocument(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        TemplateError::Inconsistent(report) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "template {} is inconsistent with its document: {}",
                name,
                report.warnings().join("; ")
            ),
        ),
        e @ (TemplateError::MissingValue(_)
        | TemplateError::SelectionNotFound(_)
        | TemplateError::UnterminatedToken { .. }) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        e => {
            tracing::error!("{} {} error: {:?}", operation, name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "contrato is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/templates",
    responses(
        (status = 200, description = "Names of saved templates", body = ListTemplatesRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List all saved templates
async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<ListTemplatesRes>, ApiError> {
    match state.template_service.list_templates() {
        Ok(templates) => Ok(Json(ListTemplatesRes { templates })),
        Err(e) => Err(api_error("list", "templates", e)),
    }
}

#[utoipa::path(
    get,
    path = "/templates/{name}",
    params(("name" = String, Path, description = "Template name")),
    responses(
        (status = 200, description = "Template metadata", body = TemplateRes),
        (status = 404, description = "Template not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Get the declared variables and version of a template
async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateRes>, ApiError> {
    match state.template_service.template_summary(&name) {
        Ok(summary) => Ok(Json(TemplateRes {
            name: summary.name,
            variables: summary.variables,
            version: summary.version,
            last_modified: summary.last_modified.to_rfc3339(),
        })),
        Err(e) => Err(api_error("get", &name, e)),
    }
}

#[utoipa::path(
    get,
    path = "/templates/{name}/review",
    params(("name" = String, Path, description = "Template name")),
    responses(
        (status = 200, description = "Consistency review of the stored template", body = ReviewRes),
        (status = 404, description = "Template not found"),
        (status = 500, description = "Internal server error")
    )
)]
/// Review a template's declared variables against the tokens in its document
async fn review_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ReviewRes>, ApiError> {
    match state.template_service.review_template(&name) {
        Ok(report) => Ok(Json(report.into())),
        Err(e) => Err(api_error("review", &name, e)),
    }
}

#[utoipa::path(
    post,
    path = "/templates/{name}/fill",
    params(("name" = String, Path, description = "Template name")),
    request_body = FillReq,
    responses(
        (status = 200, description = "Filled .docx document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 404, description = "Template not found"),
        (status = 422, description = "A declared variable has no value"),
        (status = 500, description = "Internal server error")
    )
)]
/// Fill a template and download the resulting document
///
/// The response carries a `Content-Disposition` attachment named `{name}_preenchido.docx`.
async fn fill_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<FillReq>,
) -> Result<Response, ApiError> {
    let contract = state
        .template_service
        .fill(&name, &req.values)
        .map_err(|e| api_error("fill", &name, e))?;

    let disposition = format!("attachment; filename=\"{}\"", contract.suggested_filename());
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contract.bytes,
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/templates/{name}",
    params(("name" = String, Path, description = "Template name"), SaveParams),
    request_body(content = Vec<u8>, description = "Template .docx document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    responses(
        (status = 201, description = "Template created", body = SaveRes),
        (status = 400, description = "Invalid name, variables or document"),
        (status = 409, description = "A template with this name exists"),
        (status = 422, description = "Review has warnings and force is not set"),
        (status = 500, description = "Internal server error")
    )
)]
/// Create a template from an uploaded document
async fn create_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SaveParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<SaveRes>), ApiError> {
    let service = &state.template_service;
    let template = upload(&name, &params, &body).map_err(|e| api_error("create", &name, e))?;

    if service
        .repository()
        .exists(&name)
        .map_err(|e| api_error("create", &name, e))?
    {
        return Err((
            StatusCode::CONFLICT,
            format!("template {} already exists", name),
        ));
    }

    let saved = service
        .create_template(&template, policy(&params))
        .map_err(|e| api_error("create", &name, e))?;
    Ok((StatusCode::CREATED, Json(SaveRes::new(&name, saved))))
}

#[utoipa::path(
    put,
    path = "/templates/{name}",
    params(("name" = String, Path, description = "Template name"), SaveParams),
    request_body(content = Vec<u8>, description = "Template .docx document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    responses(
        (status = 200, description = "Template saved; any previous snapshot was backed up", body = SaveRes),
        (status = 400, description = "Invalid name, variables or document"),
        (status = 422, description = "Review has warnings and force is not set"),
        (status = 500, description = "Internal server error")
    )
)]
/// Save a template from an uploaded document, replacing any existing one
async fn save_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SaveParams>,
    body: Bytes,
) -> Result<Json<SaveRes>, ApiError> {
    let template = upload(&name, &params, &body).map_err(|e| api_error("save", &name, e))?;
    let saved = state
        .template_service
        .save_template(&template, policy(&params))
        .map_err(|e| api_error("save", &name, e))?;
    Ok(Json(SaveRes::new(&name, saved)))
}

fn upload(name: &str, params: &SaveParams, body: &[u8]) -> Result<Template, TemplateError> {
    let document = Document::parse(body)?;
    Template::new(name, declared(params.variables.as_deref()), document)
}

fn policy(params: &SaveParams) -> SavePolicy {
    if params.force {
        SavePolicy::Override
    } else {
        SavePolicy::Strict
    }
}

#[utoipa::path(
    post,
    path = "/documents/mark",
    params(MarkParams),
    request_body(content = Vec<u8>, description = "Source .docx document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    responses(
        (status = 200, description = "Marked .docx document; the token and occurrence count are in the x-contrato-token and x-contrato-occurrences headers", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 400, description = "Invalid name, blank selection or malformed document"),
        (status = 422, description = "Selection does not occur in the document"),
        (status = 500, description = "Internal server error")
    )
)]
/// Replace every occurrence of a selection with a variable token
async fn mark_document(
    State(state): State<AppState>,
    Query(params): Query<MarkParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut document = Document::parse(&body).map_err(|e| api_error("mark", "document", e))?;
    let outcome = state
        .template_service
        .mark(&mut document, &params.selection, &params.name)
        .map_err(|e| api_error("mark", "document", e))?;
    let bytes = document
        .to_bytes()
        .map_err(|e| api_error("mark", "document", e))?;

    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MEDIA_TYPE.to_string()),
            (TOKEN_HEADER, outcome.token),
            (OCCURRENCES_HEADER, outcome.summary.occurrences.to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/documents/review",
    params(ReviewParams),
    request_body(content = Vec<u8>, description = "Document to review", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    responses(
        (status = 200, description = "Consistency review of the uploaded document", body = ReviewRes),
        (status = 400, description = "Malformed document"),
        (status = 500, description = "Internal server error")
    )
)]
/// Review an uploaded document against a list of declared variables
async fn review_document(
    State(state): State<AppState>,
    Query(params): Query<ReviewParams>,
    body: Bytes,
) -> Result<Json<ReviewRes>, ApiError> {
    let document = Document::parse(&body).map_err(|e| api_error("review", "document", e))?;
    let report = state
        .template_service
        .review(&document, &declared(params.variables.as_deref()))
        .map_err(|e| api_error("review", "document", e))?;
    Ok(Json(report.into()))
}
