//! Block-level edit locks derived from presence.
//!
//! There is no lock table. A block is locked when some peer's presence
//! record names it in `locked_block_id`; acquiring a lock is just publishing
//! our own record with that field set. Enforcement is advisory and first
//! writer wins: two peers acquiring the same block within one propagation
//! delay can both succeed.

use sitekit_core::BlockId;
use uuid::Uuid;

use crate::presence::{PresenceMessage, PresencePatch, PresenceRecord, PresenceStore};

/// Another connection holds the lock on `block_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub block_id: BlockId,
    pub holder: Uuid,
    /// Display name for the "locked by" badge.
    pub holder_name: String,
}

impl LockConflict {
    fn from_record(block_id: &BlockId, record: &PresenceRecord) -> Self {
        Self {
            block_id: block_id.clone(),
            holder: record.connection_id,
            holder_name: record.name.clone(),
        }
    }
}

/// Stateless lock checks over a [`PresenceStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LockCoordinator;

impl LockCoordinator {
    /// The peer currently holding `block_id`, if any. Our own lock is not a conflict.
    pub fn holder<'a>(presence: &'a PresenceStore, block_id: &BlockId) -> Option<&'a PresenceRecord> {
        presence
            .list_others()
            .into_iter()
            .find(|r| r.locked_block_id.as_ref() == Some(block_id))
    }

    /// Fails when a peer holds `block_id`.
    pub fn check(presence: &PresenceStore, block_id: &BlockId) -> Result<(), LockConflict> {
        match Self::holder(presence, block_id) {
            Some(record) => Err(LockConflict::from_record(block_id, record)),
            None => Ok(()),
        }
    }

    /// Acquire `block_id` for the local connection. On success the block also
    /// becomes the local selection and the returned message must be propagated.
    pub fn try_lock(
        presence: &mut PresenceStore,
        block_id: &BlockId,
    ) -> Result<PresenceMessage, LockConflict> {
        Self::check(presence, block_id)?;
        Ok(presence.update_presence(
            PresencePatch::default()
                .locked(Some(block_id.clone()))
                .selected(Some(block_id.clone())),
        ))
    }

    /// Drop the local lock. Returns `None` when nothing was held.
    pub fn release(presence: &mut PresenceStore) -> Option<PresenceMessage> {
        presence.self_record().locked_block_id.as_ref()?;
        Some(presence.update_presence(PresencePatch::default().locked(None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_core::Identity;

    fn pair() -> (PresenceStore, PresenceStore) {
        let a = PresenceStore::new(Uuid::new_v4(), &Identity::editor("a", "Alice"));
        let b = PresenceStore::new(Uuid::new_v4(), &Identity::editor("b", "Bob"));
        (a, b)
    }

    #[test]
    fn test_lock_free_block() {
        let (mut a, _) = pair();
        let hero = BlockId::from("hero-1");
        let msg = LockCoordinator::try_lock(&mut a, &hero).unwrap();

        assert_eq!(a.self_record().locked_block_id, Some(hero.clone()));
        assert_eq!(a.self_record().selected_block_id, Some(hero));
        assert!(matches!(msg, PresenceMessage::Update { .. }));
    }

    #[test]
    fn test_lock_exclusion() {
        let (mut a, mut b) = pair();
        let hero = BlockId::from("hero-1");

        let msg = LockCoordinator::try_lock(&mut a, &hero).unwrap();
        b.apply_remote(&msg, 0);

        let conflict = LockCoordinator::try_lock(&mut b, &hero).unwrap_err();
        assert_eq!(conflict.holder, a.connection_id());
        assert_eq!(conflict.holder_name, "Alice");
        assert!(b.self_record().locked_block_id.is_none());
    }

    #[test]
    fn test_own_lock_is_not_conflict() {
        let (mut a, _) = pair();
        let hero = BlockId::from("hero-1");
        LockCoordinator::try_lock(&mut a, &hero).unwrap();
        assert!(LockCoordinator::check(&a, &hero).is_ok());
        assert!(LockCoordinator::try_lock(&mut a, &hero).is_ok());
    }

    #[test]
    fn test_release_frees_block_for_peers() {
        let (mut a, mut b) = pair();
        let hero = BlockId::from("hero-1");

        b.apply_remote(&LockCoordinator::try_lock(&mut a, &hero).unwrap(), 0);
        let release = LockCoordinator::release(&mut a).unwrap();
        b.apply_remote(&release, 1);

        assert!(LockCoordinator::check(&b, &hero).is_ok());
        assert!(LockCoordinator::release(&mut a).is_none());
    }

    #[test]
    fn test_leave_frees_block() {
        let (mut a, mut b) = pair();
        let hero = BlockId::from("hero-1");

        b.apply_remote(&LockCoordinator::try_lock(&mut a, &hero).unwrap(), 0);
        b.apply_remote(&a.disconnect(), 1);
        assert!(LockCoordinator::holder(&b, &hero).is_none());
    }
}
