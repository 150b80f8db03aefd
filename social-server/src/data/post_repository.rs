use crate::data::cascade::delete_with_policies;
use crate::domain::deletion::Table;
use crate::domain::error::DomainError;
use crate::domain::post::{FeedEntry, FeedFilter, NewPost, Post, PostChanges};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, DomainError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, DomainError>;
    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, DomainError>;
    async fn update(&self, id: i64, changes: PostChanges) -> Result<Option<Post>, DomainError>;
    /// Deletes the post; its comments stay with an empty post reference.
    async fn delete(&self, id: i64) -> Result<bool, DomainError>;
    async fn count(&self, filter: FeedFilter) -> Result<u64, DomainError>;
    /// Newest first; equal `pub_date`s are ordered by id, newest first.
    async fn page(
        &self,
        filter: FeedFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<FeedEntry>, DomainError>;
}

const FEED_SELECT: &str = r#"
    SELECT p.id, p.text, p.pub_date, p.author_id, p.group_id, p.image,
           u.username AS author_username,
           g.slug AS group_slug,
           g.title AS group_title
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN groups g ON g.id = p.group_id
"#;

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: FeedFilter) {
    match filter {
        FeedFilter::All => {}
        FeedFilter::Group(group_id) => {
            builder.push(" WHERE p.group_id = ").push_bind(group_id);
        }
        FeedFilter::Author(author_id) => {
            builder.push(" WHERE p.author_id = ").push_bind(author_id);
        }
        FeedFilter::FollowedBy(user_id) => {
            // IN rather than a join so duplicate follow edges cannot duplicate posts.
            builder
                .push(" WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }
}

#[derive(Clone)]
pub struct PostgresPostRepository {
    pool: PgPool,
}

impl PostgresPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PostgresPostRepository {
    async fn create(&self, post: NewPost) -> Result<Post, DomainError> {
        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (text, pub_date, author_id, group_id, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, text, pub_date, author_id, group_id, image
            "#,
        )
        .bind(&post.text)
        .bind(Utc::now())
        .bind(post.author_id)
        .bind(post.group_id)
        .bind(&post.image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to create post: {}", e);
            DomainError::Internal(format!("database error: {}", e))
        })?;

        info!(post_id = created.id, author_id = created.author_id, "post created");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, DomainError> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, text, pub_date, author_id, group_id, image
            FROM posts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("db error find_by_id {}: {}", id, e);
            DomainError::Internal(e.to_string())
        })
    }

    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, DomainError> {
        let mut builder = QueryBuilder::<Postgres>::new(FEED_SELECT);
        builder.push(" WHERE p.id = ").push_bind(id);
        builder
            .build_query_as::<FeedEntry>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("db error find_entry {}: {}", id, e);
                DomainError::Internal(e.to_string())
            })
    }

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Option<Post>, DomainError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET text = $1, group_id = $2, image = $3
            WHERE id = $4
            RETURNING id, text, pub_date, author_id, group_id, image
            "#,
        )
        .bind(&changes.text)
        .bind(changes.group_id)
        .bind(&changes.image)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to update post {}: {}", id, e);
            DomainError::Internal(e.to_string())
        })?;

        if post.is_some() {
            info!(post_id = id, "post updated");
        }

        Ok(post)
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        let deleted = delete_with_policies(&self.pool, Table::Posts, id).await?;
        if deleted {
            info!(post_id = id, "post deleted");
        }
        Ok(deleted)
    }

    async fn count(&self, filter: FeedFilter) -> Result<u64, DomainError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        push_filter(&mut builder, filter);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("db error while counting posts: {}", e);
                DomainError::Internal(e.to_string())
            })?;
        Ok(total.max(0) as u64)
    }

    async fn page(
        &self,
        filter: FeedFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<FeedEntry>, DomainError> {
        let mut builder = QueryBuilder::<Postgres>::new(FEED_SELECT);
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        builder
            .build_query_as::<FeedEntry>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("db error while fetching posts: {}", e);
                DomainError::Internal(e.to_string())
            })
    }
}
