use std::sync::Arc;

use image::ImageFormat;
use tracing::{info, instrument, warn};

use crate::data::Repositories;
use crate::data::comment_repository::CommentRepository;
use crate::data::group_repository::GroupRepository;
use crate::data::post_repository::PostRepository;
use crate::domain::comment::{Comment, NewComment};
use crate::domain::error::{DomainError, FormErrors};
use crate::domain::post::{NewPost, Post, PostChanges};
use crate::infrastructure::media::{INVALID_IMAGE, MediaStorage, Upload, inspect_upload};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

/// A post form as submitted, before validation.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    /// Raw group id from the form; empty means no group.
    pub group: Option<String>,
    pub image: Option<Upload>,
}

struct ValidPost {
    text: String,
    group_id: Option<i64>,
    image: Option<(Vec<u8>, ImageFormat)>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    groups: Arc<dyn GroupRepository>,
    comments: Arc<dyn CommentRepository>,
    media: MediaStorage,
}

impl PostService {
    pub fn new(repos: &Repositories, media: MediaStorage) -> Self {
        Self {
            posts: Arc::clone(&repos.posts),
            groups: Arc::clone(&repos.groups),
            comments: Arc::clone(&repos.comments),
            media,
        }
    }

    /// Checks every field and reports all problems at once.
    async fn validate(&self, draft: PostDraft) -> Result<ValidPost, DomainError> {
        let mut errors = FormErrors::new();

        let text = draft.text.trim().to_string();
        if text.is_empty() {
            errors.add("text", REQUIRED);
        }

        let group_id = match draft.group.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if self.groups.find_by_id(id).await?.is_some() => Some(id),
                _ => {
                    errors.add("group", INVALID_CHOICE);
                    None
                }
            },
        };

        let image = match draft.image {
            Some(upload) if !upload.bytes.is_empty() => {
                let (bytes, inspected) = inspect_upload(upload.bytes).await?;
                match inspected {
                    Ok(format) => Some((bytes, format)),
                    Err(err) => {
                        warn!(filename = ?upload.filename, error = %err, "rejected upload");
                        errors.add("image", INVALID_IMAGE);
                        None
                    }
                }
            }
            _ => None,
        };

        errors.into_result()?;
        Ok(ValidPost {
            text,
            group_id,
            image,
        })
    }

    async fn store_image(
        &self,
        image: Option<(Vec<u8>, ImageFormat)>,
    ) -> Result<Option<String>, DomainError> {
        match image {
            Some((bytes, format)) => Ok(Some(self.media.save(&bytes, format).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, draft))]
    pub async fn create_post(&self, author_id: i64, draft: PostDraft) -> Result<Post, DomainError> {
        let valid = self.validate(draft).await?;
        let image = self.store_image(valid.image).await?;
        self.posts
            .create(NewPost {
                text: valid.text,
                author_id,
                group_id: valid.group_id,
                image,
            })
            .await
    }

    /// Only the author edits, and only under their own URL. Without a new
    /// upload the current image is kept.
    #[instrument(skip(self, draft))]
    pub async fn edit_post(
        &self,
        editor_id: i64,
        editor_username: &str,
        username: &str,
        post_id: i64,
        draft: PostDraft,
    ) -> Result<Post, DomainError> {
        if editor_username != username {
            return Err(DomainError::NotOwner {
                username: username.to_string(),
                post_id,
            });
        }
        let current = self.owned_post(editor_id, post_id).await?;

        let valid = self.validate(draft).await?;
        let image = match self.store_image(valid.image).await? {
            Some(path) => Some(path),
            None => current.image,
        };

        self.posts
            .update(
                post_id,
                PostChanges {
                    text: valid.text,
                    group_id: valid.group_id,
                    image,
                },
            )
            .await?
            .ok_or(DomainError::PostNotFound(post_id))
    }

    /// The post as stored, provided `author_id` wrote it.
    pub async fn owned_post(&self, author_id: i64, post_id: i64) -> Result<Post, DomainError> {
        self.posts
            .find_by_id(post_id)
            .await?
            .filter(|post| post.author_id == author_id)
            .ok_or(DomainError::PostNotFound(post_id))
    }

    #[instrument(skip(self, text))]
    pub async fn create_comment(
        &self,
        author_id: i64,
        post_id: i64,
        text: &str,
    ) -> Result<Comment, DomainError> {
        let text = text.trim();
        if text.is_empty() {
            let mut errors = FormErrors::new();
            errors.add("text", REQUIRED);
            return Err(DomainError::Validation(errors));
        }
        if self.posts.find_by_id(post_id).await?.is_none() {
            return Err(DomainError::PostNotFound(post_id));
        }
        self.comments
            .create(NewComment {
                post_id,
                author_id,
                text: text.to_string(),
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: i64) -> Result<(), DomainError> {
        if self.posts.delete(post_id).await? {
            info!(post_id, "post removed with its comments detached");
            Ok(())
        } else {
            Err(DomainError::PostNotFound(post_id))
        }
    }
}
