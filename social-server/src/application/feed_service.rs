use std::sync::Arc;

use tracing::instrument;

use crate::application::follow_service::FollowService;
use crate::data::Repositories;
use crate::data::comment_repository::CommentRepository;
use crate::data::group_repository::GroupRepository;
use crate::data::post_repository::PostRepository;
use crate::data::user_repository::UserRepository;
use crate::domain::comment::CommentView;
use crate::domain::error::DomainError;
use crate::domain::group::Group;
use crate::domain::page::{PAGE_SIZE, Page, PageNumber, Paginator};
use crate::domain::post::{FeedEntry, FeedFilter};
use crate::domain::user::{AuthorStats, User};

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: Group,
    pub page: Page<FeedEntry>,
}

#[derive(Debug, Clone)]
pub struct AuthorFeed {
    pub author: User,
    pub stats: AuthorStats,
    /// Whether the viewing user follows this author.
    pub following: bool,
    pub page: Page<FeedEntry>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub entry: FeedEntry,
    pub author: User,
    pub stats: AuthorStats,
    pub comments: Vec<CommentView>,
}

/// Read models: every feed is filter, newest first, ten per page.
#[derive(Clone)]
pub struct FeedService {
    users: Arc<dyn UserRepository>,
    groups: Arc<dyn GroupRepository>,
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    follows: FollowService,
}

impl FeedService {
    pub fn new(repos: &Repositories, follows: FollowService) -> Self {
        Self {
            users: Arc::clone(&repos.users),
            groups: Arc::clone(&repos.groups),
            posts: Arc::clone(&repos.posts),
            comments: Arc::clone(&repos.comments),
            follows,
        }
    }

    async fn paginate(
        &self,
        filter: FeedFilter,
        requested: PageNumber,
    ) -> Result<Page<FeedEntry>, DomainError> {
        let total = self.posts.count(filter).await?;
        let paginator = Paginator::new(total, PAGE_SIZE);
        let number = paginator.resolve(requested);
        let items = self
            .posts
            .page(filter, paginator.limit(), paginator.offset(number))
            .await?;
        Ok(paginator.page(number, items))
    }

    pub async fn global_feed(&self, page: PageNumber) -> Result<Page<FeedEntry>, DomainError> {
        self.paginate(FeedFilter::All, page).await
    }

    #[instrument(skip(self))]
    pub async fn group_feed(&self, slug: &str, page: PageNumber) -> Result<GroupFeed, DomainError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound(slug.to_string()))?;
        let page = self.paginate(FeedFilter::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    #[instrument(skip(self))]
    pub async fn author_feed(
        &self,
        username: &str,
        viewer: Option<i64>,
        page: PageNumber,
    ) -> Result<AuthorFeed, DomainError> {
        let author = self.find_author(username).await?;
        let stats = self.author_stats(author.id).await?;
        let following = match viewer {
            Some(viewer_id) => self.follows.is_following(viewer_id, author.id).await?,
            None => false,
        };
        let page = self.paginate(FeedFilter::Author(author.id), page).await?;
        Ok(AuthorFeed {
            author,
            stats,
            following,
            page,
        })
    }

    /// Posts by every author `user_id` follows, as of this call.
    #[instrument(skip(self))]
    pub async fn followed_feed(
        &self,
        user_id: i64,
        page: PageNumber,
    ) -> Result<Page<FeedEntry>, DomainError> {
        self.paginate(FeedFilter::FollowedBy(user_id), page).await
    }

    /// The post only resolves under its own author's name.
    #[instrument(skip(self))]
    pub async fn post_detail(&self, username: &str, post_id: i64) -> Result<PostDetail, DomainError> {
        let author = self.find_author(username).await?;
        let entry = self
            .posts
            .find_entry(post_id)
            .await?
            .filter(|entry| entry.post.author_id == author.id)
            .ok_or(DomainError::PostNotFound(post_id))?;
        let stats = self.author_stats(author.id).await?;
        let comments = self.comments.list_for_post(post_id).await?;
        Ok(PostDetail {
            entry,
            author,
            stats,
            comments,
        })
    }

    pub async fn author_stats(&self, author_id: i64) -> Result<AuthorStats, DomainError> {
        Ok(AuthorStats {
            post_count: self.posts.count(FeedFilter::Author(author_id)).await? as i64,
            follower_count: self.follows.follower_count(author_id).await?,
            following_count: self.follows.following_count(author_id).await?,
        })
    }

    pub async fn follows_anyone(&self, user_id: i64) -> Result<bool, DomainError> {
        Ok(self.follows.following_count(user_id).await? > 0)
    }

    async fn find_author(&self, username: &str) -> Result<User, DomainError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::domain::group::NewGroup;
    use crate::domain::post::NewPost;
    use crate::domain::user::NewUser;

    struct Fixture {
        repos: Repositories,
        feeds: FeedService,
        follows: FollowService,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory(MemoryStore::new());
        let follows = FollowService::new(Arc::clone(&repos.follows));
        let feeds = FeedService::new(&repos, follows.clone());
        Fixture {
            repos,
            feeds,
            follows,
        }
    }

    async fn user(f: &Fixture, name: &str) -> User {
        f.repos
            .users
            .create(NewUser::new(name.into(), format!("{name}@example.com"), "h".into()))
            .await
            .unwrap()
    }

    async fn post(f: &Fixture, author: &User, text: &str, group_id: Option<i64>) -> i64 {
        f.repos
            .posts
            .create(NewPost {
                text: text.into(),
                author_id: author.id,
                group_id,
                image: None,
            })
            .await
            .unwrap()
            .id
    }

    fn texts(page: &Page<FeedEntry>) -> Vec<&str> {
        page.items.iter().map(|e| e.post.text.as_str()).collect()
    }

    #[tokio::test]
    async fn global_feed_pages_by_ten_newest_first() {
        let f = fixture();
        let sarah = user(&f, "sarah").await;
        for i in 0..23 {
            post(&f, &sarah, &format!("post {i}"), None).await;
        }

        let first = f.feeds.global_feed(PageNumber::first()).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.num_pages, 3);
        assert_eq!(first.items[0].post.text, "post 22");

        let last = f.feeds.global_feed(PageNumber::new(3)).await.unwrap();
        assert_eq!(texts(&last), vec!["post 2", "post 1", "post 0"]);

        let clamped = f.feeds.global_feed(PageNumber::new(40)).await.unwrap();
        assert_eq!(clamped.number, 3);
        assert_eq!(texts(&clamped), texts(&last));
    }

    #[tokio::test]
    async fn group_feed_filters_and_404s() {
        let f = fixture();
        let sarah = user(&f, "sarah").await;
        let group = f
            .repos
            .groups
            .create(NewGroup {
                title: "test123".into(),
                slug: "test".into(),
                description: "testing".into(),
            })
            .await
            .unwrap();
        post(&f, &sarah, "in group", Some(group.id)).await;
        post(&f, &sarah, "outside", None).await;

        let feed = f.feeds.group_feed("test", PageNumber::first()).await.unwrap();
        assert_eq!(feed.group.title, "test123");
        assert_eq!(texts(&feed.page), vec!["in group"]);
        assert_eq!(feed.page.items[0].group_slug.as_deref(), Some("test"));

        assert!(matches!(
            f.feeds.group_feed("missing", PageNumber::first()).await,
            Err(DomainError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn author_feed_reports_stats() {
        let f = fixture();
        let sarah = user(&f, "sarah").await;
        let brian = user(&f, "brian").await;
        post(&f, &sarah, "one", None).await;
        post(&f, &sarah, "two", None).await;
        post(&f, &brian, "other", None).await;
        f.follows.follow(brian.id, sarah.id).await.unwrap();

        let feed = f
            .feeds
            .author_feed("sarah", Some(brian.id), PageNumber::first())
            .await
            .unwrap();
        assert_eq!(texts(&feed.page), vec!["two", "one"]);
        assert_eq!(
            feed.stats,
            AuthorStats {
                post_count: 2,
                follower_count: 1,
                following_count: 0,
            }
        );
        assert!(feed.following);

        let anonymous = f
            .feeds
            .author_feed("sarah", None, PageNumber::first())
            .await
            .unwrap();
        assert!(!anonymous.following);

        assert!(matches!(
            f.feeds.author_feed("ghost", None, PageNumber::first()).await,
            Err(DomainError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn followed_feed_tracks_edges() {
        let f = fixture();
        let sarah = user(&f, "sarah").await;
        let brian = user(&f, "brian").await;
        post(&f, &sarah, "cache text", None).await;

        let feed = f.feeds.followed_feed(brian.id, PageNumber::first()).await.unwrap();
        assert!(feed.is_empty());

        f.follows.follow(brian.id, sarah.id).await.unwrap();
        let feed = f.feeds.followed_feed(brian.id, PageNumber::first()).await.unwrap();
        assert_eq!(texts(&feed), vec!["cache text"]);
        assert!(f.feeds.follows_anyone(brian.id).await.unwrap());

        f.follows.unfollow(brian.id, sarah.id).await.unwrap();
        post(&f, &sarah, "favourite users", None).await;
        let feed = f.feeds.followed_feed(brian.id, PageNumber::first()).await.unwrap();
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn post_detail_requires_matching_author() {
        let f = fixture();
        let sarah = user(&f, "sarah").await;
        user(&f, "brian").await;
        let id = post(&f, &sarah, "fred", None).await;

        let detail = f.feeds.post_detail("sarah", id).await.unwrap();
        assert_eq!(detail.entry.post.text, "fred");
        assert_eq!(detail.stats.post_count, 1);
        assert!(detail.comments.is_empty());

        assert!(matches!(
            f.feeds.post_detail("brian", id).await,
            Err(DomainError::PostNotFound(_))
        ));
        assert!(matches!(
            f.feeds.post_detail("sarah", 999).await,
            Err(DomainError::PostNotFound(999))
        ));
    }
}
