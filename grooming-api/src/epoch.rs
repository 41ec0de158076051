use sqlx::PgPool;

/// The admin token epoch is a single versioned configuration row rather than
/// an in-process variable, so a bump is durable, auditable and visible to
/// every instance at once. All admin tokens minted before the current epoch
/// are dead.
pub async fn current_epoch(pool: &PgPool) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT epoch FROM admin_token_epoch WHERE id = 1")
        .fetch_one(pool)
        .await
}

pub async fn bump_epoch(pool: &PgPool) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE admin_token_epoch SET epoch = epoch + 1, updated_at = now() WHERE id = 1 RETURNING epoch",
    )
    .fetch_one(pool)
    .await
}

/// Seed the singleton row on startup; a no-op when it already exists.
pub async fn ensure_epoch_row(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO admin_token_epoch (id, epoch) VALUES (1, 1) ON CONFLICT (id) DO NOTHING")
        .execute(pool)
        .await
        .map(|_| ())
}
