//! PostgreSQL document store, one JSONB document per row.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::{
    Document, DocumentStore, ETag, Filter, NewDocument, Patch, Result,
    StoreError,
};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "rvms";
pub const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, FromRow)]
struct DocumentRecord {
    id: String,
    partition_key: String,
    version: i64,
    body: Json<serde_json::Value>,
}

impl From<DocumentRecord> for Document {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            partition_key: record.partition_key,
            etag: ETag::new(record.version.to_string()),
            body: record.body.0,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            return StoreError::Conflict;
        }

        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            },
            _ => StoreError::Unavailable(Box::new(err)),
        }
    }
}

/// Document store backed by a PostgreSQL `documents` table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new [`PgStore`] on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Init database connections and run migrations.
    pub async fn connect(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        sqlx::migrate!().run(&postgres).await?;

        Ok(Self::new(postgres))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create(&self, document: NewDocument) -> Result<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            r#"
            INSERT INTO documents (id, partition_key, body)
            VALUES ($1, $2, $3)
            RETURNING id, partition_key, version, body
            "#,
        )
        .bind(&document.id)
        .bind(&document.partition_key)
        .bind(Json(&document.body))
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Document>> {
        let records = sqlx::query_as::<_, DocumentRecord>(
            r#"
            SELECT id, partition_key, version, body
            FROM documents
            WHERE body @> $1
            ORDER BY created_at, id
            "#,
        )
        .bind(Json(filter.as_json()))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Document::from).collect())
    }

    async fn patch(
        &self,
        id: &str,
        partition_key: &str,
        patches: &[Patch],
        if_match: Option<&ETag>,
    ) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, DocumentRecord>(
            r#"
            SELECT id, partition_key, version, body
            FROM documents
            WHERE id = $1 AND partition_key = $2
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(partition_key)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        if if_match.is_some_and(|etag| etag.as_str() != current.version.to_string()) {
            tx.rollback().await?;
            return Err(StoreError::PreconditionFailed);
        }

        let body = Patch::apply_all(patches, &current.body.0)?;

        let record = sqlx::query_as::<_, DocumentRecord>(
            r#"
            UPDATE documents
            SET body = $3, version = version + 1
            WHERE id = $1 AND partition_key = $2
            RETURNING id, partition_key, version, body
            "#,
        )
        .bind(id)
        .bind(partition_key)
        .bind(Json(&body))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_into_document() {
        let record = DocumentRecord {
            id: "1".into(),
            partition_key: "a@x.com".into(),
            version: 3,
            body: Json(serde_json::json!({ "email": "a@x.com" })),
        };

        let document = Document::from(record);
        assert_eq!(document.etag, ETag::new("3"));
        assert_eq!(document.body["email"], "a@x.com");
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
    }
}
