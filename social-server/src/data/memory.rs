//! In-process store used when no `DATABASE_URL` is configured, and by tests.
//!
//! One mutex guards every table, so each repository call is atomic. Deletes
//! execute the same [`plan_delete`] steps the PostgreSQL backend runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::data::comment_repository::CommentRepository;
use crate::data::follow_repository::FollowRepository;
use crate::data::group_repository::GroupRepository;
use crate::data::post_repository::PostRepository;
use crate::data::user_repository::UserRepository;
use crate::domain::comment::{Comment, CommentView, NewComment};
use crate::domain::deletion::{DeleteStep, Selection, Table, plan_delete};
use crate::domain::error::DomainError;
use crate::domain::follow::Follow;
use crate::domain::group::{Group, NewGroup};
use crate::domain::post::{FeedEntry, FeedFilter, NewPost, Post, PostChanges};
use crate::domain::user::{NewUser, User};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    follows: BTreeMap<i64, Follow>,
    sequences: HashMap<Table, i64>,
}

impl State {
    fn next_id(&mut self, table: Table) -> i64 {
        let seq = self.sequences.entry(table).or_insert(0);
        *seq += 1;
        *seq
    }

    /// `(row id, column value)` for every row of `table`.
    fn column(&self, table: Table, column: &str) -> Result<Vec<(i64, Option<i64>)>, DomainError> {
        let values = match (table, column) {
            (Table::Users, "id") => self.users.keys().map(|id| (*id, Some(*id))).collect(),
            (Table::Groups, "id") => self.groups.keys().map(|id| (*id, Some(*id))).collect(),
            (Table::Posts, "id") => self.posts.keys().map(|id| (*id, Some(*id))).collect(),
            (Table::Comments, "id") => self.comments.keys().map(|id| (*id, Some(*id))).collect(),
            (Table::Follows, "id") => self.follows.keys().map(|id| (*id, Some(*id))).collect(),
            (Table::Posts, "author_id") => self
                .posts
                .values()
                .map(|p| (p.id, Some(p.author_id)))
                .collect(),
            (Table::Posts, "group_id") => self.posts.values().map(|p| (p.id, p.group_id)).collect(),
            (Table::Comments, "author_id") => self
                .comments
                .values()
                .map(|c| (c.id, Some(c.author_id)))
                .collect(),
            (Table::Comments, "post_id") => {
                self.comments.values().map(|c| (c.id, c.post_id)).collect()
            }
            (Table::Follows, "user_id") => self
                .follows
                .values()
                .map(|f| (f.id, Some(f.user_id)))
                .collect(),
            (Table::Follows, "author_id") => self
                .follows
                .values()
                .map(|f| (f.id, Some(f.author_id)))
                .collect(),
            _ => {
                return Err(DomainError::Internal(format!(
                    "unknown column {}.{}",
                    table.name(),
                    column
                )));
            }
        };
        Ok(values)
    }

    fn rows_where(
        &self,
        table: Table,
        column: &str,
        values: &HashSet<i64>,
    ) -> Result<HashSet<i64>, DomainError> {
        Ok(self
            .column(table, column)?
            .into_iter()
            .filter_map(|(id, value)| value.filter(|v| values.contains(v)).map(|_| id))
            .collect())
    }

    fn select(&self, selection: &Selection, root: i64) -> Result<HashSet<i64>, DomainError> {
        match selection {
            Selection::Root => Ok(HashSet::from([root])),
            Selection::Referencing {
                table,
                column,
                within,
            } => {
                let parents = self.select(within, root)?;
                self.rows_where(*table, column, &parents)
            }
        }
    }

    fn nullify(&mut self, table: Table, column: &str, rows: &HashSet<i64>) -> Result<u64, DomainError> {
        let mut touched = 0;
        match (table, column) {
            (Table::Posts, "group_id") => {
                for id in rows {
                    if let Some(post) = self.posts.get_mut(id) {
                        post.group_id = None;
                        touched += 1;
                    }
                }
            }
            (Table::Comments, "post_id") => {
                for id in rows {
                    if let Some(comment) = self.comments.get_mut(id) {
                        comment.post_id = None;
                        touched += 1;
                    }
                }
            }
            _ => {
                return Err(DomainError::Internal(format!(
                    "{}.{} is not nullable",
                    table.name(),
                    column
                )));
            }
        }
        Ok(touched)
    }

    fn remove(&mut self, table: Table, rows: &HashSet<i64>) -> u64 {
        let mut removed = 0;
        for id in rows {
            let hit = match table {
                Table::Users => self.users.remove(id).is_some(),
                Table::Groups => self.groups.remove(id).is_some(),
                Table::Posts => self.posts.remove(id).is_some(),
                Table::Comments => self.comments.remove(id).is_some(),
                Table::Follows => self.follows.remove(id).is_some(),
            };
            if hit {
                removed += 1;
            }
        }
        removed
    }

    fn delete(&mut self, table: Table, id: i64) -> Result<bool, DomainError> {
        let plan = plan_delete(table);
        let mut affected = 0;
        for step in &plan.steps {
            affected = match step {
                DeleteStep::Nullify {
                    table,
                    column,
                    selection,
                } => {
                    let parents = self.select(selection, id)?;
                    let rows = self.rows_where(*table, column, &parents)?;
                    self.nullify(*table, column, &rows)?
                }
                DeleteStep::Remove {
                    table,
                    column,
                    selection,
                } => {
                    let parents = self.select(selection, id)?;
                    let rows = self.rows_where(*table, column, &parents)?;
                    self.remove(*table, &rows)
                }
            };
            debug!(table = table.name(), id, affected, "delete step");
        }
        Ok(affected > 0)
    }

    fn entry(&self, post: &Post) -> Option<FeedEntry> {
        let author = self.users.get(&post.author_id)?;
        let group = post.group_id.and_then(|id| self.groups.get(&id));
        Some(FeedEntry {
            post: post.clone(),
            author_username: author.username.clone(),
            group_slug: group.map(|g| g.slug.clone()),
            group_title: group.map(|g| g.title.clone()),
        })
    }

    fn matches(&self, post: &Post, filter: FeedFilter) -> bool {
        match filter {
            FeedFilter::All => true,
            FeedFilter::Group(group_id) => post.group_id == Some(group_id),
            FeedFilter::Author(author_id) => post.author_id == author_id,
            FeedFilter::FollowedBy(user_id) => self
                .follows
                .values()
                .any(|f| f.user_id == user_id && f.author_id == post.author_id),
        }
    }

    fn feed(&self, filter: FeedFilter) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .posts
            .values()
            .filter(|p| self.users.contains_key(&p.author_id) && self.matches(p, filter))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge without the existence check, reproducing what a racing
    /// pair of requests can leave behind in the permissive schema.
    pub fn insert_follow_unchecked(&self, user_id: i64, author_id: i64) -> Follow {
        let mut state = self.state.lock();
        let id = state.next_id(Table::Follows);
        let follow = Follow {
            id,
            user_id,
            author_id,
        };
        state.follows.insert(id, follow);
        follow
    }

    pub fn comment(&self, id: i64) -> Option<Comment> {
        self.state.lock().comments.get(&id).cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, DomainError> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.username == user.username) {
            return Err(DomainError::UserAlreadyExists(user.username));
        }
        let id = state.next_id(Table::Users);
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        state.users.insert(id, created.clone());
        info!(user_id = id, username = %created.username, "user created");
        Ok(created)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        let state = self.state.lock();
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DomainError> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        self.state.lock().delete(Table::Users, id)
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn create(&self, group: NewGroup) -> Result<Group, DomainError> {
        let mut state = self.state.lock();
        if state.groups.values().any(|g| g.slug == group.slug) {
            return Err(DomainError::GroupAlreadyExists(group.slug));
        }
        let id = state.next_id(Table::Groups);
        let created = Group {
            id,
            title: group.title,
            slug: group.slug,
            description: group.description,
        };
        state.groups.insert(id, created.clone());
        info!(group_id = id, slug = %created.slug, "group created");
        Ok(created)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Group>, DomainError> {
        let state = self.state.lock();
        Ok(state.groups.values().find(|g| g.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, DomainError> {
        Ok(self.state.lock().groups.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Group>, DomainError> {
        let mut groups: Vec<Group> = self.state.lock().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        self.state.lock().delete(Table::Groups, id)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<Post, DomainError> {
        let mut state = self.state.lock();
        let id = state.next_id(Table::Posts);
        let created = Post {
            id,
            text: post.text,
            pub_date: Utc::now(),
            author_id: post.author_id,
            group_id: post.group_id,
            image: post.image,
        };
        state.posts.insert(id, created.clone());
        info!(post_id = id, author_id = created.author_id, "post created");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Post>, DomainError> {
        Ok(self.state.lock().posts.get(&id).cloned())
    }

    async fn find_entry(&self, id: i64) -> Result<Option<FeedEntry>, DomainError> {
        let state = self.state.lock();
        Ok(state.posts.get(&id).and_then(|post| state.entry(post)))
    }

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Option<Post>, DomainError> {
        let mut state = self.state.lock();
        let Some(post) = state.posts.get_mut(&id) else {
            return Ok(None);
        };
        post.text = changes.text;
        post.group_id = changes.group_id;
        post.image = changes.image;
        info!(post_id = id, "post updated");
        Ok(Some(post.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        self.state.lock().delete(Table::Posts, id)
    }

    async fn count(&self, filter: FeedFilter) -> Result<u64, DomainError> {
        Ok(self.state.lock().feed(filter).len() as u64)
    }

    async fn page(
        &self,
        filter: FeedFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<FeedEntry>, DomainError> {
        let state = self.state.lock();
        Ok(state
            .feed(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|post| state.entry(post))
            .collect())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create(&self, comment: NewComment) -> Result<Comment, DomainError> {
        let mut state = self.state.lock();
        let id = state.next_id(Table::Comments);
        let created = Comment {
            id,
            post_id: Some(comment.post_id),
            author_id: comment.author_id,
            text: comment.text,
            created: Utc::now(),
        };
        state.comments.insert(id, created.clone());
        info!(comment_id = id, post_id = comment.post_id, "comment created");
        Ok(created)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentView>, DomainError> {
        let state = self.state.lock();
        let mut comments: Vec<CommentView> = state
            .comments
            .values()
            .filter(|c| c.post_id == Some(post_id))
            .filter_map(|c| {
                state.users.get(&c.author_id).map(|author| CommentView {
                    comment: c.clone(),
                    author_username: author.username.clone(),
                })
            })
            .collect();
        comments.sort_by(|a, b| {
            a.comment
                .created
                .cmp(&b.comment.created)
                .then(a.comment.id.cmp(&b.comment.id))
        });
        Ok(comments)
    }
}

#[async_trait]
impl FollowRepository for MemoryStore {
    async fn insert_if_absent(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError> {
        let mut state = self.state.lock();
        if state
            .follows
            .values()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(false);
        }
        let id = state.next_id(Table::Follows);
        state.follows.insert(
            id,
            Follow {
                id,
                user_id,
                author_id,
            },
        );
        info!(user_id, author_id, "follow created");
        Ok(true)
    }

    async fn delete_all(&self, user_id: i64, author_id: i64) -> Result<u64, DomainError> {
        let mut state = self.state.lock();
        let before = state.follows.len();
        state
            .follows
            .retain(|_, f| !(f.user_id == user_id && f.author_id == author_id));
        let removed = (before - state.follows.len()) as u64;
        if removed > 0 {
            info!(user_id, author_id, "follow removed");
        }
        Ok(removed)
    }

    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError> {
        let state = self.state.lock();
        Ok(state
            .follows
            .values()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn count_followers(&self, author_id: i64) -> Result<i64, DomainError> {
        let state = self.state.lock();
        Ok(state.follows.values().filter(|f| f.author_id == author_id).count() as i64)
    }

    async fn count_following(&self, user_id: i64) -> Result<i64, DomainError> {
        let state = self.state.lock();
        Ok(state.follows.values().filter(|f| f.user_id == user_id).count() as i64)
    }
}
