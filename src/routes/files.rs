use std::path::Path as FsPath;
use std::sync::Arc;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::{
    AppState,
    config::Config,
    error::AppError,
    models::{FileRecord, NewFile, ProcessingStatus, SheetData},
    services::{
        analytics::{compute_analytics, AnalyticsSummary, Cell, ColumnKind},
        auth::AuthUser,
        excel::{utils::{is_spreadsheet_upload, stored_filename}, WorkbookDecoder},
    },
};

// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(config.max_file_size + MULTIPART_OVERHEAD)),
        )
        .route("/", get(list_files))
        .route("/stats", get(dashboard_stats))
        .route("/:id/data", get(file_data))
        .route("/:id/analytics", get(file_analytics))
        .route("/:id", delete(delete_file))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    page: Option<usize>,
    limit: Option<usize>,
}

impl Pagination {
    // Missing or zero values fall back to page 1 of 10; larger pages are capped at 100.
    fn page(&self) -> usize {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    fn limit(&self) -> usize {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    #[serde(rename = "_id")]
    id: Uuid,
    filename: String,
    mimetype: String,
    size: u64,
    upload_date: DateTime<Utc>,
    row_count: usize,
    column_count: usize,
    processing_status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_error: Option<String>,
}

impl From<FileRecord> for FileSummary {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            filename: file.original_name,
            mimetype: file.mimetype,
            size: file.size,
            upload_date: file.upload_date,
            row_count: file.row_count,
            column_count: file.column_count,
            processing_status: file.processing_status,
            processing_error: file.processing_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    message: &'static str,
    file: FileSummary,
}

#[derive(Debug, Serialize)]
pub struct PaginationInfo {
    current: usize,
    pages: usize,
    total: usize,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    files: Vec<FileSummary>,
    pagination: PaginationInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpload {
    #[serde(rename = "_id")]
    id: Uuid,
    filename: String,
    upload_date: DateTime<Utc>,
    row_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    total_files: usize,
    total_rows: usize,
    recent_uploads: Vec<RecentUpload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMetadata {
    total_rows: usize,
    total_columns: usize,
    worksheet_count: usize,
    filename: String,
    upload_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDataResponse {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    sheet_names: Vec<String>,
    metadata: DataMetadata,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

async fn remove_stored_file(path: &FsPath) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!("Deleted physical file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Physical file not found at: {}", path.display())
        }
        Err(e) => tracing::error!("Failed to delete {}: {}", path.display(), e),
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, String, Bytes), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("No file uploaded".to_string()))?;
        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await?;
        return Ok((original_name, mimetype, data));
    }
    Err(AppError::InvalidInput("No file uploaded".to_string()))
}

fn completed_file(state: &AppState, owner: Uuid, id: Uuid) -> Result<FileRecord, AppError> {
    let file = state
        .store
        .find_file(owner, id)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if file.processing_status != ProcessingStatus::Completed {
        return Err(AppError::InvalidInput("File is still being processed".to_string()));
    }
    Ok(file)
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let start = std::time::Instant::now();
    let (original_name, mimetype, data) = read_upload(&mut multipart).await?;
    tracing::info!(
        "Upload of {} ({}, {}KB) by user {}",
        original_name,
        mimetype,
        data.len() / 1024,
        auth_user.id()
    );

    if !is_spreadsheet_upload(&original_name, &mimetype) {
        return Err(AppError::InvalidInput("Only Excel files (.xlsx, .xls) are allowed".to_string()));
    }
    if data.len() > state.config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the {} byte upload limit",
            state.config.max_file_size
        )));
    }

    let file_path = state.config.upload_dir.join(stored_filename(&original_name));
    tokio::fs::write(&file_path, &data).await?;

    let size = data.len() as u64;
    let decoded = tokio::task::spawn_blocking(move || {
        WorkbookDecoder.decode(data).map(|workbook| {
            let analytics = compute_analytics(&workbook.table);
            (workbook, analytics)
        })
    })
    .await
    .map_err(|e| AppError::Internal(format!("Workbook decoding task failed: {}", e)));

    let (workbook, analytics) = match decoded.and_then(|result| result) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::error!("Failed to process {}: {}", original_name, e);
            remove_stored_file(&file_path).await;
            return Err(e);
        }
    };

    let numeric_columns = analytics
        .column_stats
        .iter()
        .filter(|stat| stat.kind() == ColumnKind::Number)
        .count();
    tracing::info!(
        "Analyzed {}: {} rows, {} columns ({} numeric) across {} sheets",
        original_name,
        analytics.total_rows,
        analytics.total_columns,
        numeric_columns,
        workbook.worksheet_count()
    );

    let new_file = NewFile {
        uploaded_by: auth_user.id(),
        original_name,
        mimetype,
        size,
        file_path: file_path.to_string_lossy().into_owned(),
        processing_status: ProcessingStatus::Completed,
        data: SheetData {
            table: workbook.table,
            sheet_names: workbook.sheet_names,
        },
    };

    let record = match state.store.insert_file(new_file, Some(&analytics)) {
        Ok(record) => record,
        Err(e) => {
            remove_stored_file(&file_path).await;
            return Err(e);
        }
    };

    tracing::info!("Upload {} completed in {:?}", record.id, start.elapsed());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded and processed successfully",
            file: record.into(),
        }),
    ))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<FileListResponse>, AppError> {
    let page = pagination.page();
    let limit = pagination.limit();

    let files = state
        .store
        .list_files(auth_user.id(), limit, (page - 1).saturating_mul(limit))?;
    let total = state.store.count_files(auth_user.id())?;

    Ok(Json(FileListResponse {
        files: files.into_iter().map(FileSummary::from).collect(),
        pagination: PaginationInfo {
            current: page,
            pages: total.div_ceil(limit),
            total,
        },
    }))
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<DashboardResponse>, AppError> {
    let stats = state.store.dashboard_stats(auth_user.id())?;

    Ok(Json(DashboardResponse {
        total_files: stats.total_files,
        total_rows: stats.total_rows,
        recent_uploads: stats
            .recent_uploads
            .into_iter()
            .map(|file| RecentUpload {
                id: file.id,
                filename: file.original_name,
                upload_date: file.upload_date,
                row_count: file.row_count,
            })
            .collect(),
    }))
}

async fn file_data(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FileDataResponse>, AppError> {
    let file = completed_file(&state, auth_user.id(), id)?;
    let data = state
        .store
        .file_data(id)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    Ok(Json(FileDataResponse {
        metadata: DataMetadata {
            total_rows: data.table.row_count(),
            total_columns: data.table.column_count(),
            worksheet_count: file.worksheet_count,
            filename: file.original_name,
            upload_date: file.upload_date,
        },
        headers: data.table.headers,
        rows: data.table.rows,
        sheet_names: data.sheet_names,
    }))
}

async fn file_analytics(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    completed_file(&state, auth_user.id(), id)?;

    if let Some(analytics) = state.store.file_analytics(id)? {
        return Ok(Json(analytics));
    }

    tracing::info!("Analytics missing for file {}, recomputing", id);
    let data = state
        .store
        .file_data(id)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let analytics = compute_analytics(&data.table);
    state.store.save_analytics(id, &analytics)?;

    Ok(Json(analytics))
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let file = state.store.find_file(auth_user.id(), id)?.ok_or_else(|| {
        AppError::NotFound("File not found or you do not have permission to delete it.".to_string())
    })?;

    remove_stored_file(FsPath::new(&file.file_path)).await;
    state.store.delete_file(file.uploaded_by, id)?;
    tracing::info!("Deleted file {} ({}) for user {}", id, file.original_name, file.uploaded_by);

    Ok(Json(MessageResponse {
        message: "File deleted successfully",
    }))
}
