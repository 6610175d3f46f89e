use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewPost, PostAuthor, PostDetail};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a post and return it hydrated with its author
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<PostDetail>;

    /// Hydrate the given ids. Missing ids are skipped; order is not guaranteed.
    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostDetail>>;
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    content: String,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
    user_id: Uuid,
    handle: String,
}

impl From<PostRow> for PostDetail {
    fn from(row: PostRow) -> Self {
        PostDetail {
            id: row.id,
            content: row.content,
            photo_url: row.photo_url,
            user: PostAuthor {
                id: row.user_id,
                handle: row.handle,
            },
            created_at: row.created_at,
        }
    }
}

pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<PostDetail> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            WITH inserted AS (
                INSERT INTO posts (id, user_id, content, photo_url, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id, user_id, content, photo_url, created_at
            )
            SELECT i.id, i.content, i.photo_url, i.created_at, u.id AS user_id, u.handle
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(&post.content)
        .bind(&post.photo_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.id, p.content, p.photo_url, p.created_at, u.id AS user_id, u.handle
            FROM posts p
            JOIN users u ON u.id = p.user_id
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDetail::from).collect())
    }
}
