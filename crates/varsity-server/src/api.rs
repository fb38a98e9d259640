use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use varsity_core::service::{
    CreateDocumentRequest, CreateEventRequest, CreateNoticeRequest, FileDownload,
    UpdateDocumentRequest, UpdateEventRequest, UpdateNoticeRequest, UpdateUserRequest,
};
use varsity_core::{DocumentFilters, FileUpload, Portal};
use varsity_shared::{
    Actor, Audience, DocumentCategory, EventType, NoticeCategory, PageRequest, Role,
};

use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub portal: Portal,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.config.max_file_size
        * varsity_shared::constants::MAX_NOTICE_ATTACHMENTS;

    Router::new()
        .route("/health", get(health_check))
        .route("/documents", get(list_documents).post(create_document))
        .route(
            "/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/documents/:id/download", get(download_document))
        .route("/notices", get(list_notices).post(create_notice))
        .route(
            "/notices/:id",
            get(get_notice).put(update_notice).delete(delete_notice),
        )
        .route(
            "/notices/:id/attachments/:index",
            get(download_attachment),
        )
        .route("/calendar", get(list_events).post(create_event))
        .route(
            "/calendar/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/users", get(list_users))
        .route("/users/students/list", get(list_students))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Actor extraction
// ---------------------------------------------------------------------------

/// Resolve the acting identity from gateway-injected headers.
///
/// Authentication happens upstream; this layer only reads the already
/// resolved `(id, role, department)` triple and refuses requests without
/// one.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(ApiError::Unauthorized)?;

    let role = headers
        .get("x-actor-role")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Role>().ok())
        .ok_or(ApiError::Unauthorized)?;

    let department = headers
        .get("x-actor-department")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    Ok(Actor::new(id, role, department))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "instance": state.config.instance_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DocumentListQuery {
    category: Option<DocumentCategory>,
    department: Option<String>,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_documents(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<DocumentListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;

    let filters = DocumentFilters {
        category: query.category,
        department: query.department,
        search: query.search,
    };
    let page = page_request(query.page, query.limit);

    let feed = state.portal.list_documents(&actor, &filters, &page).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": feed.count,
        "total": feed.total,
        "documents": feed.items,
    })))
}

async fn get_document(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let item = state.portal.get_document(&actor, &id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "document": item,
    })))
}

async fn download_document(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let download = state.portal.download_document(&actor, &id).await?;
    Ok(download_response(download))
}

async fn create_document(
    headers: HeaderMap,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let (request, upload) = read_document_multipart(multipart).await?;
    let upload = upload.ok_or_else(|| ApiError::BadRequest("Please upload a file".to_string()))?;

    let document = state.portal.create_document(&actor, request, upload).await?;

    info!(document = %document.id, "document uploaded via API");
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Document uploaded successfully",
            "document": document,
        })),
    )
        .into_response())
}

async fn update_document(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let document = state.portal.update_document(&actor, id, request).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Document updated successfully",
        "document": document,
    })))
}

async fn delete_document(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.portal.delete_document(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Document deleted successfully",
    })))
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NoticeListQuery {
    category: Option<NoticeCategory>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_notices(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<NoticeListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let page = page_request(query.page, query.limit);

    let notices = state
        .portal
        .list_notices(&actor, query.category, &page)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": notices.count,
        "total": notices.total,
        "notices": notices.notices,
    })))
}

async fn get_notice(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let notice = state.portal.get_notice(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "notice": notice,
    })))
}

async fn create_notice(
    headers: HeaderMap,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let (fields, uploads) = read_notice_multipart(multipart).await?;

    let request = CreateNoticeRequest {
        title: fields.title.unwrap_or_default(),
        content: fields.content.unwrap_or_default(),
        category: fields.category,
        target_audience: fields.target_audience.unwrap_or_default(),
        department: fields.department,
        expiry_date: fields.expiry_date,
    };

    let notice = state.portal.create_notice(&actor, request, uploads).await?;

    info!(notice = %notice.id, "notice created via API");
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Notice created successfully",
            "notice": notice,
        })),
    )
        .into_response())
}

async fn update_notice(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let (fields, uploads) = read_notice_multipart(multipart).await?;

    let request = UpdateNoticeRequest {
        title: fields.title,
        content: fields.content,
        category: fields.category,
        target_audience: fields.target_audience,
        department: fields.department,
        expiry_date: fields.expiry_date,
        remove_attachments: fields.remove_attachments,
    };

    let notice = state
        .portal
        .update_notice(&actor, id, request, uploads)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Notice updated successfully",
        "notice": notice,
    })))
}

async fn delete_notice(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.portal.delete_notice(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Notice deleted successfully",
    })))
}

async fn download_attachment(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let download = state.portal.download_attachment(&actor, id, index).await?;
    Ok(download_response(download))
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct EventListQuery {
    event_type: Option<EventType>,
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
}

async fn list_events(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let events = state
        .portal
        .list_events(&actor, query.event_type, query.start_date, query.end_date)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": events.len(),
        "events": events,
    })))
}

async fn get_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let event = state.portal.get_event(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "event": event,
    })))
}

async fn create_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let event = state.portal.create_event(&actor, request).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Event created successfully",
            "event": event,
        })),
    )
        .into_response())
}

async fn update_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let event = state.portal.update_event(&actor, id, request).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Event updated successfully",
        "event": event,
    })))
}

async fn delete_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.portal.delete_event(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Event deleted successfully",
    })))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UserListQuery {
    role: Option<Role>,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_users(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let page = page_request(query.page, query.limit);

    let users = state
        .portal
        .list_users(&actor, query.role, query.search.as_deref(), &page)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": users.count,
        "total": users.total,
        "users": users.users,
    })))
}

#[derive(Deserialize)]
struct StudentListQuery {
    department: Option<String>,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_students(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<StudentListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let page = page_request(query.page, query.limit);

    let students = state
        .portal
        .list_students(
            &actor,
            query.department.as_deref(),
            query.search.as_deref(),
            &page,
        )
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "count": students.count,
        "total": students.total,
        "students": students.users,
    })))
}

async fn get_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let user = state.portal.get_user(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "user": user,
    })))
}

async fn update_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let user = state.portal.update_user(&actor, id, request).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User updated successfully",
        "user": user,
    })))
}

async fn delete_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.portal.delete_user(&actor, id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User deactivated successfully",
    })))
}

// ---------------------------------------------------------------------------
// Multipart decoding
// ---------------------------------------------------------------------------

async fn read_document_multipart(
    mut multipart: Multipart,
) -> Result<(CreateDocumentRequest, Option<FileUpload>), ApiError> {
    let mut request = CreateDocumentRequest::default();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => upload = Some(read_file_field(field).await?),
            "title" => request.title = read_text_field(field).await?,
            "description" => request.description = read_text_field(field).await?,
            "category" => {
                request.category = Some(parse_field(&read_text_field(field).await?, "category")?)
            }
            "access_level" => {
                request.access_level = parse_csv(&read_text_field(field).await?, "access_level")?
            }
            "department" => request.department = Some(read_text_field(field).await?),
            "tags" => {
                request.tags = read_text_field(field)
                    .await?
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }
            _ => {} // unknown fields are ignored
        }
    }

    Ok((request, upload))
}

#[derive(Default)]
struct NoticeFields {
    title: Option<String>,
    content: Option<String>,
    category: Option<NoticeCategory>,
    target_audience: Option<Vec<Audience>>,
    department: Option<String>,
    expiry_date: Option<chrono::DateTime<chrono::Utc>>,
    remove_attachments: Vec<usize>,
}

async fn read_notice_multipart(
    mut multipart: Multipart,
) -> Result<(NoticeFields, Vec<FileUpload>), ApiError> {
    let mut fields = NoticeFields::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "attachments" => uploads.push(read_file_field(field).await?),
            "title" => fields.title = Some(read_text_field(field).await?),
            "content" => fields.content = Some(read_text_field(field).await?),
            "category" => {
                fields.category = Some(parse_field(&read_text_field(field).await?, "category")?)
            }
            "target_audience" => {
                fields.target_audience =
                    Some(parse_csv(&read_text_field(field).await?, "target_audience")?)
            }
            "department" => fields.department = Some(read_text_field(field).await?),
            "expiry_date" => {
                let raw = read_text_field(field).await?;
                if !raw.trim().is_empty() {
                    let parsed = chrono::DateTime::parse_from_rfc3339(raw.trim())
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Invalid expiry_date: {}", e))
                        })?;
                    fields.expiry_date = Some(parsed.with_timezone(&chrono::Utc));
                }
            }
            "remove_attachments" => {
                let raw = read_text_field(field).await?;
                if !raw.trim().is_empty() {
                    fields.remove_attachments =
                        serde_json::from_str(raw.trim()).map_err(|e| {
                            ApiError::BadRequest(format!("Invalid remove_attachments: {}", e))
                        })?;
                }
            }
            _ => {}
        }
    }

    Ok((fields, uploads))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))
}

async fn read_file_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<FileUpload, ApiError> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("File field without a filename".to_string()))?;
    let mime_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
        .to_vec();

    Ok(FileUpload {
        original_name,
        mime_type,
        data,
    })
}

fn parse_field<T>(raw: &str, name: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = varsity_shared::ParseEnumError>,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", name, e)))
}

fn parse_csv<T>(raw: &str, name: &str) -> Result<Vec<T>, ApiError>
where
    T: std::str::FromStr<Err = varsity_shared::ParseEnumError>,
{
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_field(part, name))
        .collect()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn page_request(page: Option<u32>, limit: Option<u32>) -> PageRequest {
    PageRequest::new(
        page.unwrap_or(1),
        limit.unwrap_or(varsity_shared::constants::DEFAULT_PAGE_LIMIT),
    )
}

/// Stream a download back with its original filename and content type.
fn download_response(download: FileDownload) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&download.file.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file.original_name.replace(['"', '\\'], "_")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    (headers, download.data).into_response()
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
