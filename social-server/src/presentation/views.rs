//! Server-rendered HTML pages.
//!
//! Every value that comes from users goes through [`escape`] before it is
//! written into markup.

use std::fmt::Write;

use actix_web::HttpResponse;
use actix_web::http::StatusCode;

use crate::application::feed_service::{AuthorFeed, GroupFeed, PostDetail};
use crate::domain::error::{FormErrors, LOGIN_URL, post_url};
use crate::domain::group::Group;
use crate::domain::page::Page;
use crate::domain::post::FeedEntry;
use crate::domain::user::{AuthorStats, User};
use crate::presentation::utils::AuthenticatedUser;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn html_response(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn layout(title: &str, viewer: Option<&AuthenticatedUser>, content: &str) -> String {
    let nav = match viewer {
        Some(user) => format!(
            r#"<a href="/">Home</a> <a href="/follow/">Following</a> <a href="/new">New post</a> <a href="/{name}/">{name}</a> <a href="/auth/logout/">Log out</a>"#,
            name = escape(&user.username)
        ),
        None => format!(
            r#"<a href="/">Home</a> <a href="{LOGIN_URL}">Log in</a> <a href="/auth/signup/">Sign up</a>"#
        ),
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<nav>{}</nav>\n<main>\n{}\n</main>\n</body>\n</html>\n",
        escape(title),
        nav,
        content
    )
}

fn error_list(errors: &FormErrors, field: &str) -> String {
    let messages = errors.get(field);
    if messages.is_empty() {
        return String::new();
    }
    let mut out = String::from("<ul class=\"errorlist\">");
    for message in messages {
        let _ = write!(out, "<li>{}</li>", escape(message));
    }
    out.push_str("</ul>");
    out
}

fn post_card(entry: &FeedEntry) -> String {
    let post = &entry.post;
    let author = escape(&entry.author_username);
    let mut out = String::from("<article class=\"post\">\n");
    let _ = writeln!(
        out,
        r#"<p class="meta"><a href="/{author}/">{author}</a> · {}</p>"#,
        post.pub_date.format("%d %b %Y %H:%M")
    );
    if let Some(image) = &post.image {
        let _ = writeln!(
            out,
            r#"<img src="/media/{}" alt="image for post {}">"#,
            escape(image),
            post.id
        );
    }
    let _ = writeln!(out, "<p>{}</p>", escape(&post.text));
    if let (Some(slug), Some(title)) = (&entry.group_slug, &entry.group_title) {
        let _ = writeln!(
            out,
            r#"<p class="group"><a href="/group/{}/">{}</a></p>"#,
            escape(slug),
            escape(title)
        );
    }
    let _ = writeln!(
        out,
        r#"<a href="{}">Open</a>"#,
        post_url(&entry.author_username, post.id)
    );
    out.push_str("</article>");
    out
}

fn post_list(page: &Page<FeedEntry>, base: &str) -> String {
    let mut out = String::new();
    if page.is_empty() {
        out.push_str("<p>No posts yet.</p>\n");
    }
    for entry in &page.items {
        out.push_str(&post_card(entry));
        out.push('\n');
    }
    out.push_str(&paginator(page, base));
    out
}

fn paginator<T>(page: &Page<T>, base: &str) -> String {
    if page.num_pages <= 1 {
        return String::new();
    }
    let mut out = String::from("<nav class=\"pagination\">");
    if page.has_previous() {
        let _ = write!(
            out,
            r#"<a href="{base}?page=1">First</a> <a href="{base}?page={}">Previous</a> "#,
            page.number - 1
        );
    }
    let _ = write!(out, "<span>Page {} of {}</span>", page.number, page.num_pages);
    if page.has_next() {
        let _ = write!(
            out,
            r#" <a href="{base}?page={}">Next</a> <a href="{base}?page={}">Last</a>"#,
            page.number + 1,
            page.num_pages
        );
    }
    out.push_str("</nav>");
    out
}

fn author_card(author: &User, stats: &AuthorStats) -> String {
    format!(
        r#"<aside class="author"><h2><a href="/{name}/">{name}</a></h2><p>Posts: {}</p><p>Followers: {}</p><p>Following: {}</p></aside>"#,
        stats.post_count,
        stats.follower_count,
        stats.following_count,
        name = escape(&author.username)
    )
}

pub fn index_page(
    page: &Page<FeedEntry>,
    viewer: Option<&AuthenticatedUser>,
    follows_anyone: bool,
) -> String {
    let mut content = String::from("<h1>Latest posts</h1>\n");
    if follows_anyone {
        content.push_str(r#"<p><a href="/follow/">Posts from authors you follow</a></p>"#);
        content.push('\n');
    }
    content.push_str(&post_list(page, "/"));
    layout("Latest posts", viewer, &content)
}

pub fn follow_page(page: &Page<FeedEntry>, viewer: Option<&AuthenticatedUser>) -> String {
    let mut content = String::from("<h1>Authors you follow</h1>\n");
    content.push_str(&post_list(page, "/follow/"));
    layout("Following", viewer, &content)
}

pub fn group_page(feed: &GroupFeed, viewer: Option<&AuthenticatedUser>) -> String {
    let group = &feed.group;
    let mut content = format!(
        "<h1>{}</h1>\n<p>{}</p>\n",
        escape(&group.title),
        escape(&group.description)
    );
    content.push_str(&post_list(&feed.page, &format!("/group/{}/", escape(&group.slug))));
    layout(&group.title, viewer, &content)
}

pub fn profile_page(feed: &AuthorFeed, viewer: Option<&AuthenticatedUser>) -> String {
    let name = escape(&feed.author.username);
    let mut content = author_card(&feed.author, &feed.stats);
    content.push('\n');
    match viewer {
        Some(user) if user.id == feed.author.id => {}
        Some(_) if feed.following => {
            let _ = writeln!(content, r#"<a class="button" href="/{name}/unfollow">Unfollow</a>"#);
        }
        _ => {
            let _ = writeln!(content, r#"<a class="button" href="/{name}/follow">Follow</a>"#);
        }
    }
    content.push_str(&post_list(&feed.page, &format!("/{name}/")));
    layout(&feed.author.username, viewer, &content)
}

/// Comment form state for re-rendering after a failed submission.
#[derive(Debug, Default)]
pub struct CommentFormView<'a> {
    pub text: &'a str,
    pub errors: Option<&'a FormErrors>,
}

pub fn post_page(
    detail: &PostDetail,
    viewer: Option<&AuthenticatedUser>,
    form: CommentFormView<'_>,
) -> String {
    let entry = &detail.entry;
    let url = post_url(&detail.author.username, entry.post.id);
    let mut content = author_card(&detail.author, &detail.stats);
    content.push('\n');
    content.push_str(&post_card(entry));
    content.push('\n');

    if viewer.is_some_and(|user| user.id == entry.post.author_id) {
        let _ = writeln!(content, r#"<a class="button" href="{url}edit">Edit</a>"#);
    }

    content.push_str("<section class=\"comments\">\n<h2>Comments</h2>\n");
    for view in &detail.comments {
        let _ = writeln!(
            content,
            r#"<div class="comment"><a href="/{name}/">{name}</a> <span>{}</span><p>{}</p></div>"#,
            view.comment.created.format("%d %b %Y %H:%M"),
            escape(&view.comment.text),
            name = escape(&view.author_username)
        );
    }
    if viewer.is_some() {
        let empty = FormErrors::new();
        let errors = form.errors.unwrap_or(&empty);
        let _ = writeln!(
            content,
            r#"<form method="post" action="{url}comment/">{}<textarea name="text">{}</textarea><button type="submit">Send</button></form>"#,
            error_list(errors, "text"),
            escape(form.text)
        );
    }
    content.push_str("</section>");

    let title: String = entry.post.text.chars().take(30).collect();
    layout(&title, viewer, &content)
}

/// Values shown in the new/edit post form.
#[derive(Debug, Default)]
pub struct PostFormView<'a> {
    pub text: &'a str,
    pub group: Option<&'a str>,
    /// Image currently attached to the post being edited.
    pub image: Option<&'a str>,
    /// `(username, post_id)` when editing.
    pub editing: Option<(&'a str, i64)>,
}

pub fn post_form_page(
    viewer: Option<&AuthenticatedUser>,
    form: PostFormView<'_>,
    groups: &[Group],
    errors: &FormErrors,
) -> String {
    let (title, action) = match form.editing {
        Some((username, post_id)) => ("Edit post", format!("{}edit", post_url(username, post_id))),
        None => ("New post", "/new".to_string()),
    };

    let mut options = String::from(r#"<option value="">---------</option>"#);
    for group in groups {
        let id = group.id.to_string();
        let selected = if form.group == Some(id.as_str()) {
            " selected"
        } else {
            ""
        };
        let _ = write!(
            options,
            r#"<option value="{id}"{selected}>{}</option>"#,
            escape(&group.title)
        );
    }

    let current_image = form
        .image
        .map(|image| format!(r#"<p>Current image: <img src="/media/{0}" alt="{0}"></p>"#, escape(image)))
        .unwrap_or_default();

    let content = format!(
        r#"<h1>{title}</h1>
<form method="post" action="{action}" enctype="multipart/form-data">
<label>Text</label>{text_errors}<textarea name="text">{text}</textarea>
<label>Group</label>{group_errors}<select name="group">{options}</select>
<label>Image</label>{image_errors}{current_image}<input type="file" name="image">
<button type="submit">Save</button>
</form>"#,
        text_errors = error_list(errors, "text"),
        text = escape(form.text),
        group_errors = error_list(errors, "group"),
        image_errors = error_list(errors, "image"),
    );
    layout(title, viewer, &content)
}

pub fn login_page(next: &str, username: &str, error: Option<&str>) -> String {
    let error = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape(message)))
        .unwrap_or_default();
    let content = format!(
        r#"<h1>Log in</h1>
{error}<form method="post" action="{LOGIN_URL}">
<input type="hidden" name="next" value="{next}">
<label>Username</label><input type="text" name="username" value="{username}">
<label>Password</label><input type="password" name="password">
<button type="submit">Log in</button>
</form>"#,
        next = escape(next),
        username = escape(username),
    );
    layout("Log in", None, &content)
}

pub fn signup_page(username: &str, email: &str, errors: &FormErrors) -> String {
    let content = format!(
        r#"<h1>Sign up</h1>
<form method="post" action="/auth/signup/">
<label>Username</label>{}<input type="text" name="username" value="{}">
<label>Email</label>{}<input type="email" name="email" value="{}">
<label>Password</label>{}<input type="password" name="password1">
<label>Password confirmation</label>{}<input type="password" name="password2">
<button type="submit">Sign up</button>
</form>"#,
        error_list(errors, "username"),
        escape(username),
        error_list(errors, "email"),
        escape(email),
        error_list(errors, "password1"),
        error_list(errors, "password2"),
    );
    layout("Sign up", None, &content)
}

pub fn not_found_page() -> String {
    layout(
        "Page not found",
        None,
        "<h1>Page not found</h1>\n<p>The page you requested does not exist.</p>",
    )
}

pub fn server_error_page() -> String {
    layout(
        "Server error",
        None,
        "<h1>Server error</h1>\n<p>Something went wrong. Please try again later.</p>",
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    layout(
        reason,
        None,
        &format!("<h1>{}</h1>\n<p>{}</p>", reason, escape(message)),
    )
}
