use sqlx::PgPool;

/// Run the log table migrations, creating both tables and their indexes if
/// they do not already exist.
pub async fn run_migrations(pool: &PgPool, prefix: &str) -> Result<(), sqlx::Error> {
    let audit = format!("{prefix}audit_log");
    let queries = format!("{prefix}query_log");

    let create_tables = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {audit} (
                id                BIGSERIAL PRIMARY KEY,
                user_id           BIGINT NOT NULL,
                user_type         INTEGER NOT NULL,
                order_id          BIGINT,
                action            TEXT NOT NULL,
                order_status_from INTEGER,
                order_status_to   INTEGER,
                "timestamp"       TIMESTAMPTZ NOT NULL,
                created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {queries} (
                id          BIGSERIAL PRIMARY KEY,
                user_id     BIGINT,
                query       TEXT NOT NULL,
                page        TEXT NOT NULL,
                backtrace   TEXT NOT NULL DEFAULT '',
                "timestamp" TIMESTAMPTZ NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
    ];
    for stmt in &create_tables {
        sqlx::query(stmt).execute(pool).await?;
    }

    let indexes = [
        format!(
            r#"CREATE INDEX IF NOT EXISTS idx_{audit}_time ON {audit} ("timestamp" DESC, id DESC)"#
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{audit}_user ON {audit} (user_id)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{audit}_order ON {audit} (order_id) WHERE order_id IS NOT NULL"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{audit}_action ON {audit} (action)"),
        format!(
            r#"CREATE INDEX IF NOT EXISTS idx_{queries}_time ON {queries} ("timestamp" DESC, id DESC)"#
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{queries}_page ON {queries} (page)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{queries}_user ON {queries} (user_id) WHERE user_id IS NOT NULL"
        ),
    ];
    for idx in &indexes {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}
