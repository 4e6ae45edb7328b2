use crate::config::AppConfig;
use crate::shared::utils::DbPool;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub drive: Option<S3Client>,
    pub http: reqwest::Client,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, drive: Option<S3Client>) -> Self {
        Self {
            conn,
            config,
            drive,
            http: reqwest::Client::new(),
            started_at: Utc::now(),
        }
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            drive: self.drive.clone(),
            http: self.http.clone(),
            started_at: self.started_at,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("drive", &self.drive.is_some())
            .field("started_at", &self.started_at)
            .finish()
    }
}
