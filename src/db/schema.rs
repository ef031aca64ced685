use sqlx::PgPool;

/// One-shot DDL: creates the nine denormalized tables of SPEC_FULL.md §3.
/// Every statement is `CREATE TABLE IF NOT EXISTS`, so re-running this
/// against an already-initialized database is a no-op (SPEC_FULL.md §6).
/// No foreign keys are declared between tables: the source system has no
/// cross-table transactionality, and the Writer (§4.3) relies on
/// idempotence rather than referential integrity for consistency.
pub async fn initialize_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS block (
            indep_hash TEXT PRIMARY KEY,
            height BIGINT NOT NULL,
            previous_block TEXT,
            block_timestamp BIGINT NOT NULL,
            txs TEXT[] NOT NULL DEFAULT '{}',
            tags JSONB NOT NULL DEFAULT '[]'
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS block_height_idx ON block (height DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS block_gql_asc (
            partition_id TEXT NOT NULL DEFAULT 'gql1',
            height BIGINT NOT NULL,
            indep_hash TEXT NOT NULL,
            block_timestamp BIGINT NOT NULL,
            PRIMARY KEY (partition_id, height, indep_hash)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS block_gql_desc (
            partition_id TEXT NOT NULL DEFAULT 'gql2',
            height BIGINT NOT NULL,
            indep_hash TEXT NOT NULL,
            block_timestamp BIGINT NOT NULL,
            PRIMARY KEY (partition_id, height, indep_hash)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS block_gql_desc_height_idx ON block_gql_desc (height DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS block_height_by_block_hash (
            block_hash TEXT PRIMARY KEY,
            height BIGINT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS block_by_tx_id (
            tx_id TEXT PRIMARY KEY,
            block_height BIGINT NOT NULL,
            block_indep_hash TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS poa (
            block_hash TEXT PRIMARY KEY,
            block_height BIGINT NOT NULL,
            poa JSONB NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS poa_height_idx ON poa (block_height DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transaction (
            id TEXT PRIMARY KEY,
            block_height BIGINT NOT NULL,
            block_indep_hash TEXT NOT NULL,
            block_timestamp BIGINT NOT NULL,
            owner TEXT,
            target TEXT,
            quantity BIGINT,
            reward BIGINT,
            data_root TEXT,
            data_size BIGINT,
            signature TEXT,
            last_tx TEXT,
            tx_format BIGINT,
            tag_count INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS transaction_target_idx ON transaction (target)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tx_tag (
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            tx_id TEXT NOT NULL,
            tag_index INTEGER NOT NULL,
            next_tag_index INTEGER,
            PRIMARY KEY (name, value, tx_id, tag_index)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tx_offset (
            tx_id TEXT PRIMARY KEY,
            \"offset\" BIGINT NOT NULL,
            size BIGINT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
