use actix_multipart::Multipart;
use futures_util::TryStreamExt;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::application::post_service::PostDraft;
use crate::domain::error::DomainError;
use crate::domain::page::PageNumber;
use crate::infrastructure::media::Upload;

// ======================= AUTH =======================

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(
        length(min = 1, max = 150, message = "Enter a username of at most 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub password1: String,
    #[serde(default)]
    #[validate(must_match(other = "password1", message = "The two password fields didn't match."))]
    pub password2: String,
}

/// First path segments owned by fixed routes; a profile under one of them
/// could never be reached.
pub const RESERVED_USERNAMES: &[&str] = &["auth", "follow", "group", "health", "media", "new"];

pub const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Letters, digits and `@ . + - _`, like most account systems allow.
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        let mut err = ValidationError::new("username");
        err.message = Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        );
        return Err(err);
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(username))
    {
        let mut err = ValidationError::new("reserved_username");
        err.message = Some(USERNAME_TAKEN.into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

// ======================= POSTS =======================

#[derive(Debug, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

/// `?page=` as sent; anything unparsable means the first page.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> PageNumber {
        PageNumber::parse(self.page.as_deref())
    }
}

/// Reads the `text`, `group` and `image` fields of a multipart post form.
/// Unknown fields are drained and ignored.
pub async fn read_post_form(
    mut payload: Multipart,
    max_upload_bytes: usize,
) -> Result<PostDraft, DomainError> {
    let mut draft = PostDraft::default();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| DomainError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| DomainError::BadRequest(e.to_string()))?
        {
            if bytes.len() + chunk.len() > max_upload_bytes {
                return Err(DomainError::BadRequest(format!(
                    "field {} exceeds {} bytes",
                    name, max_upload_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "text" => draft.text = String::from_utf8_lossy(&bytes).into_owned(),
            "group" => draft.group = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "image" if filename.is_some() || !bytes.is_empty() => {
                draft.image = Some(Upload { filename, bytes });
            }
            _ => {}
        }
    }

    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::FormErrors;
    use rstest::rstest;

    fn signup(username: &str, email: &str, p1: &str, p2: &str) -> SignupForm {
        SignupForm {
            username: username.into(),
            email: email.into(),
            password1: p1.into(),
            password2: p2.into(),
        }
    }

    #[test]
    fn valid_signup_passes() {
        assert!(
            signup("sarah", "sarah@example.com", "correct horse", "correct horse")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn signup_reports_each_field() {
        let errors = FormErrors::from(
            signup("bad name!", "not-an-email", "short", "other")
                .validate()
                .unwrap_err(),
        );
        assert!(errors.has("username"));
        assert!(errors.has("email"));
        assert!(errors.has("password1"));
        assert!(errors.has("password2"));
    }

    #[rstest]
    #[case("follow")]
    #[case("media")]
    #[case("auth")]
    #[case("New")]
    fn route_names_cannot_be_usernames(#[case] username: &str) {
        let errors = FormErrors::from(
            signup(username, "x@example.com", "correct horse", "correct horse")
                .validate()
                .unwrap_err(),
        );
        assert_eq!(errors.get("username"), [USERNAME_TAKEN.to_string()]);
    }

    #[test]
    fn page_query_parses_leniently() {
        let query = PageQuery {
            page: Some("x".into()),
        };
        assert_eq!(query.number(), PageNumber::first());
        let query = PageQuery {
            page: Some("4".into()),
        };
        assert_eq!(query.number(), PageNumber::new(4));
    }
}
