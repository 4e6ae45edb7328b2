//! Document storage for listings and leads.
//!
//! Binary content lives in the object store; Postgres keeps the metadata row
//! and the association to a property or lead. Object keys are prefixed with
//! the document id so renames never collide.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, Client as S3Client};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::config::DriveConfig;
use crate::shared::schema::documents;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub object_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub property_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: String,
    pub property_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub property_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Endpoint URL for the object store. A bare host gets its scheme from the
/// `use_ssl` flag; an explicit scheme in the config wins.
pub fn drive_endpoint(server: &str, use_ssl: bool) -> String {
    let with_scheme = if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else if use_ssl {
        format!("https://{server}")
    } else {
        format!("http://{server}")
    };
    if with_scheme.ends_with('/') {
        with_scheme
    } else {
        format!("{with_scheme}/")
    }
}

pub async fn init_drive(config: &DriveConfig) -> Result<S3Client, Box<dyn std::error::Error>> {
    let endpoint = drive_endpoint(&config.server, config.use_ssl);

    let base_config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region("auto")
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}

/// Strip path separators so a crafted file name cannot escape its prefix.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "unnamed_file".to_string()
    } else {
        cleaned
    }
}

pub fn object_key_for(id: Uuid, file_name: &str) -> String {
    format!("documents/{id}/{file_name}")
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Document>, (StatusCode, String)> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty upload body".to_string()));
    }

    let client = state
        .drive
        .as_ref()
        .ok_or_else(|| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Document storage is not configured".to_string(),
            )
        })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let id = Uuid::new_v4();
    let file_name = sanitize_file_name(&query.file_name);
    let object_key = object_key_for(id, &file_name);
    let size_bytes = body.len() as i64;

    client
        .put_object()
        .bucket(&state.config.drive.bucket)
        .key(&object_key)
        .content_type(&content_type)
        .body(ByteStream::from(body.to_vec()))
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Storage error: {e}")))?;

    let doc = Document {
        id,
        file_name,
        object_key,
        content_type,
        size_bytes,
        property_id: query.property_id,
        lead_id: query.lead_id,
        uploaded_by: Some(user.user_id),
        created_at: Utc::now(),
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    diesel::insert_into(documents::table)
        .values(&doc)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(doc))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Document>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);

    let mut q = documents::table.into_boxed();
    if let Some(property_id) = query.property_id {
        q = q.filter(documents::property_id.eq(property_id));
    }
    if let Some(lead_id) = query.lead_id {
        q = q.filter(documents::lead_id.eq(lead_id));
    }

    let rows: Vec<Document> = q
        .order(documents::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let doc: Document = documents::table
        .filter(documents::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Document not found".to_string()))?;

    Ok(Json(doc))
}

pub async fn download_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let doc: Document = documents::table
        .filter(documents::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Document not found".to_string()))?;

    let client = state.drive.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Document storage is not configured".to_string(),
        )
    })?;

    let object = client
        .get_object()
        .bucket(&state.config.drive.bucket)
        .key(&doc.object_key)
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Storage error: {e}")))?;

    let data = object
        .body
        .collect()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Storage read error: {e}")))?
        .into_bytes();

    let disposition = format!("attachment; filename=\"{}\"", doc.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, doc.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let doc: Document = documents::table
        .filter(documents::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Document not found".to_string()))?;

    // Metadata is the source of truth; an orphaned object is tolerable, a
    // dangling row is not. Delete the object first but do not fail on it.
    if let Some(client) = state.drive.as_ref() {
        if let Err(e) = client
            .delete_object()
            .bucket(&state.config.drive.bucket)
            .key(&doc.object_key)
            .send()
            .await
        {
            warn!("object delete failed for document {id}: {e}");
        }
    }

    diesel::delete(documents::table.filter(documents::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/documents", get(list_documents))
        .route("/api/documents/upload", post(upload_document))
        .route(
            "/api/documents/:id",
            get(get_document).delete(delete_document),
        )
        .route("/api/documents/:id/download", get(download_document))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_lose_path_separators() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("a\\b.pdf"), "a_b.pdf");
        assert_eq!(sanitize_file_name("  plan.pdf  "), "plan.pdf");
        assert_eq!(sanitize_file_name("   "), "unnamed_file");
    }

    #[test]
    fn bare_host_gets_scheme_from_ssl_flag() {
        assert_eq!(drive_endpoint("minio:9000", false), "http://minio:9000/");
        assert_eq!(drive_endpoint("minio:9000", true), "https://minio:9000/");
    }

    #[test]
    fn explicit_scheme_wins_over_ssl_flag() {
        assert_eq!(
            drive_endpoint("http://localhost:9000", true),
            "http://localhost:9000/"
        );
        assert_eq!(
            drive_endpoint("https://storage.example.com/", false),
            "https://storage.example.com/"
        );
    }

    #[test]
    fn object_keys_are_scoped_by_document_id() {
        let id = Uuid::nil();
        assert_eq!(
            object_key_for(id, "contract.pdf"),
            format!("documents/{id}/contract.pdf")
        );
    }
}
