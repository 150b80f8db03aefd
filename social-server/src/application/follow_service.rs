use std::sync::Arc;

use tracing::{debug, instrument};

use crate::data::follow_repository::FollowRepository;
use crate::domain::error::DomainError;
use crate::domain::follow::FollowOutcome;

/// Maintains follow edges. The store does not enforce one edge per pair, so
/// every insert is preceded by an existence check here.
#[derive(Clone)]
pub struct FollowService {
    repo: Arc<dyn FollowRepository>,
}

impl FollowService {
    pub fn new(repo: Arc<dyn FollowRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn follow(&self, user_id: i64, author_id: i64) -> Result<FollowOutcome, DomainError> {
        if user_id == author_id {
            debug!(user_id, "self-follow ignored");
            return Ok(FollowOutcome::SelfFollow);
        }
        if self.repo.exists(user_id, author_id).await? {
            return Ok(FollowOutcome::AlreadyFollowing);
        }
        // A concurrent request may have won since the check; the store's
        // conditional insert reports that as "nothing inserted".
        if self.repo.insert_if_absent(user_id, author_id).await? {
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Removes every edge between the pair; a no-op when there is none.
    #[instrument(skip(self))]
    pub async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<u64, DomainError> {
        self.repo.delete_all(user_id, author_id).await
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError> {
        self.repo.exists(user_id, author_id).await
    }

    pub async fn follower_count(&self, author_id: i64) -> Result<i64, DomainError> {
        self.repo.count_followers(author_id).await
    }

    pub async fn following_count(&self, user_id: i64) -> Result<i64, DomainError> {
        self.repo.count_following(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use rstest::{fixture, rstest};

    const SARAH: i64 = 1;
    const BRIAN: i64 = 2;

    #[fixture]
    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[rstest]
    #[tokio::test]
    async fn follow_twice_counts_once(store: MemoryStore) {
        let follows = FollowService::new(Arc::new(store));
        assert_eq!(follows.follow(BRIAN, SARAH).await.unwrap(), FollowOutcome::Created);
        assert_eq!(
            follows.follow(BRIAN, SARAH).await.unwrap(),
            FollowOutcome::AlreadyFollowing
        );
        assert!(follows.is_following(BRIAN, SARAH).await.unwrap());
        assert!(!follows.is_following(SARAH, BRIAN).await.unwrap());
        assert_eq!(follows.follower_count(SARAH).await.unwrap(), 1);
        assert_eq!(follows.following_count(BRIAN).await.unwrap(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn self_follow_creates_nothing(store: MemoryStore) {
        let follows = FollowService::new(Arc::new(store));
        assert_eq!(follows.follow(SARAH, SARAH).await.unwrap(), FollowOutcome::SelfFollow);
        assert_eq!(follows.follower_count(SARAH).await.unwrap(), 0);
        assert!(!follows.is_following(SARAH, SARAH).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn unfollow_without_edge_is_noop(store: MemoryStore) {
        let follows = FollowService::new(Arc::new(store));
        assert_eq!(follows.unfollow(BRIAN, SARAH).await.unwrap(), 0);
        assert_eq!(follows.follower_count(SARAH).await.unwrap(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unfollow_clears_duplicate_edges(store: MemoryStore) {
        store.insert_follow_unchecked(BRIAN, SARAH);
        store.insert_follow_unchecked(BRIAN, SARAH);
        let follows = FollowService::new(Arc::new(store));
        assert_eq!(follows.follower_count(SARAH).await.unwrap(), 2);
        assert_eq!(follows.unfollow(BRIAN, SARAH).await.unwrap(), 2);
        assert!(!follows.is_following(BRIAN, SARAH).await.unwrap());
        assert_eq!(follows.following_count(BRIAN).await.unwrap(), 0);
    }
}
