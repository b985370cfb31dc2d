//! Process-local registry backed by a concurrent hash map.
//!
//! State lives only as long as the process. Each user's slot sits behind its
//! own shard lock, so reads and writes for one user are linearizable while
//! different users never contend on the same entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{AttemptStore, Slot, SlotWrite, StoreError};
use crate::attempt::{Attempt, UserId};

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    slots: DashMap<UserId, Slot>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no user has any recorded state.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl AttemptStore for InMemoryRegistry {
    async fn put_attempt(&self, user_id: &UserId, attempt: Attempt) -> Result<(), StoreError> {
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        SlotWrite::PutAttempt(attempt).apply_to(&mut slot);
        Ok(())
    }

    async fn get_attempt(&self, user_id: &UserId) -> Result<Option<Attempt>, StoreError> {
        Ok(self
            .slots
            .get(user_id)
            .and_then(|slot| slot.attempt.clone()))
    }

    async fn clear_attempt(&self, user_id: &UserId) -> Result<(), StoreError> {
        if let Some(mut slot) = self.slots.get_mut(user_id) {
            if slot.attempt.take().is_some() {
                slot.version += 1;
            }
        }
        Ok(())
    }

    async fn put_cooldown(&self, user_id: &UserId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        slot.cooldown_until = Some(until);
        slot.version += 1;
        Ok(())
    }

    async fn get_cooldown(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.slots.get(user_id).and_then(|slot| slot.cooldown_until))
    }

    async fn load(&self, user_id: &UserId) -> Result<Slot, StoreError> {
        Ok(self
            .slots
            .get(user_id)
            .map(|slot| slot.clone())
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        user_id: &UserId,
        expected_version: u64,
        write: SlotWrite,
    ) -> Result<u64, StoreError> {
        // The entry guard holds the shard lock for the whole check-and-set.
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        if slot.version != expected_version {
            return Err(StoreError::VersionConflict {
                user_id: user_id.clone(),
                expected: expected_version,
                actual: slot.version,
            });
        }
        Ok(write.apply_to(&mut slot))
    }

    async fn apply(&self, user_id: &UserId, write: SlotWrite) -> Result<u64, StoreError> {
        let mut slot = self.slots.entry(user_id.clone()).or_default();
        Ok(write.apply_to(&mut slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::FormVariant;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn attempt(user: &str, variant: FormVariant) -> Attempt {
        Attempt::new(UserId::new(user), variant, t0(), 25 * 60)
    }

    #[tokio::test]
    async fn test_put_get_attempt_overwrites() {
        let registry = InMemoryRegistry::new();
        let user = UserId::new("u1");

        assert_eq!(registry.get_attempt(&user).await.unwrap(), None);

        registry
            .put_attempt(&user, attempt("u1", FormVariant::A))
            .await
            .unwrap();
        registry
            .put_attempt(&user, attempt("u1", FormVariant::B))
            .await
            .unwrap();

        let stored = registry.get_attempt(&user).await.unwrap().unwrap();
        assert_eq!(stored.form_variant, FormVariant::B);
    }

    #[tokio::test]
    async fn test_clear_attempt_is_idempotent() {
        let registry = InMemoryRegistry::new();
        let user = UserId::new("u1");

        registry.clear_attempt(&user).await.unwrap();
        registry
            .put_attempt(&user, attempt("u1", FormVariant::A))
            .await
            .unwrap();
        registry.clear_attempt(&user).await.unwrap();
        registry.clear_attempt(&user).await.unwrap();

        assert_eq!(registry.get_attempt(&user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_cooldown_returns_expired_value() {
        let registry = InMemoryRegistry::new();
        let user = UserId::new("u1");
        let past = t0() - Duration::hours(1);

        registry.put_cooldown(&user, past).await.unwrap();
        assert_eq!(registry.get_cooldown(&user).await.unwrap(), Some(past));

        registry.put_cooldown(&user, t0()).await.unwrap();
        assert_eq!(registry.get_cooldown(&user).await.unwrap(), Some(t0()));
    }

    #[tokio::test]
    async fn test_load_unknown_user_is_empty_slot() {
        let registry = InMemoryRegistry::new();
        let slot = registry.load(&UserId::new("nobody")).await.unwrap();

        assert_eq!(slot, Slot::default());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version() {
        let registry = InMemoryRegistry::new();
        let user = UserId::new("u1");

        let slot = registry.load(&user).await.unwrap();
        let v1 = registry
            .commit(
                &user,
                slot.version,
                SlotWrite::PutAttempt(attempt("u1", FormVariant::A)),
            )
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let err = registry
            .commit(
                &user,
                slot.version,
                SlotWrite::PutAttempt(attempt("u1", FormVariant::B)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        let stored = registry.get_attempt(&user).await.unwrap().unwrap();
        assert_eq!(stored.form_variant, FormVariant::A);
    }

    #[tokio::test]
    async fn test_close_clears_attempt_and_sets_cooldown() {
        let registry = InMemoryRegistry::new();
        let user = UserId::new("u1");
        let until = t0() + Duration::hours(12);

        registry
            .put_attempt(&user, attempt("u1", FormVariant::A))
            .await
            .unwrap();
        registry
            .apply(&user, SlotWrite::Close { cooldown_until: until })
            .await
            .unwrap();

        let slot = registry.load(&user).await.unwrap();
        assert_eq!(slot.attempt, None);
        assert_eq!(slot.cooldown_until, Some(until));
    }

    #[tokio::test]
    async fn test_concurrent_commits_single_winner() {
        let registry = Arc::new(InMemoryRegistry::new());
        let user = UserId::new("racer");
        let base = registry.load(&user).await.unwrap().version;

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                let variant = if i % 2 == 0 { FormVariant::A } else { FormVariant::B };
                registry
                    .commit(
                        &user,
                        base,
                        SlotWrite::PutAttempt(Attempt::new(user.clone(), variant, t0(), 60)),
                    )
                    .await
                    .is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.load(&user).await.unwrap().version, 1);
    }
}
