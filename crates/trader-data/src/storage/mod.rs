//! PostgreSQL 저장소.

pub mod etrade_token;

pub use etrade_token::EtradeTokenRepository;

use sqlx::PgPool;
use tracing::info;

/// 워크스페이스 `migrations/` 디렉터리의 마이그레이션 실행.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("DB 마이그레이션 완료");
    Ok(())
}
