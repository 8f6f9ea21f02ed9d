use crate::config::AppConfig;
use crate::shared::utils::DbPool;
use aws_sdk_s3::Client as S3Client;

pub struct AppState {
    pub conn: DbPool,
    pub drive: Option<S3Client>,
    pub bucket_name: String,
    pub config: AppConfig,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            drive: self.drive.clone(),
            bucket_name: self.bucket_name.clone(),
            config: self.config.clone(),
        }
    }
}
