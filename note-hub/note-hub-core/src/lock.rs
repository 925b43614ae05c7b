//! Per-block lease lock.
//!
//! A block is either unlocked or leased to one identity until an instant.
//! The lease is plain data on the block document; every decision here is a
//! pure function of the stored lease, the caller and the current time, and
//! callers run it inside the same store transaction that reads the block.
//!
//! | stored lease          | acquire | renew     | release   | guard  |
//! |-----------------------|---------|-----------|-----------|--------|
//! | none                  | grant   | NotHolder | NotHolder | pass   |
//! | caller, any expiry    | extend  | extend    | clear     | pass   |
//! | other, expired        | steal   | NotHolder | NotHolder | pass   |
//! | other, active         | Locked  | NotHolder | NotHolder | Locked |

use crate::error::{CoreError, Result};
use crate::model::timestamp;
use crate::store::Fields;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub holder: String,
    pub until: DateTime<Utc>,
}

impl Lease {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }

    pub fn is_held_by(&self, uid: &str) -> bool {
        self.holder == uid
    }
}

/// Effective state of a block once expiry has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    LockedBy(Lease),
}

impl LockState {
    /// An expired lease counts as unlocked even though its fields remain.
    pub fn at(lease: Option<&Lease>, now: DateTime<Utc>) -> Self {
        match lease {
            Some(lease) if lease.is_active(now) => LockState::LockedBy(lease.clone()),
            _ => LockState::Unlocked,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeaseLock {
    ttl: Duration,
}

impl LeaseLock {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Take the lease, extend our own, or steal an expired one.
    pub fn acquire(&self, current: Option<&Lease>, uid: &str, now: DateTime<Utc>) -> Result<Lease> {
        match LockState::at(current, now) {
            LockState::LockedBy(lease) if !lease.is_held_by(uid) => {
                debug!(holder = %lease.holder, caller = uid, "acquire refused");
                Err(CoreError::Locked)
            }
            _ => self.grant(uid, now),
        }
    }

    /// Extend the caller's lease. Only the stored holder is compared, so a
    /// holder whose lease already lapsed may still renew it as long as
    /// nobody has taken it over.
    pub fn renew(&self, current: Option<&Lease>, uid: &str, now: DateTime<Utc>) -> Result<Lease> {
        match current {
            Some(lease) if lease.is_held_by(uid) => self.grant(uid, now),
            _ => Err(CoreError::NotHolder),
        }
    }

    /// Drop the caller's lease.
    pub fn release(&self, current: Option<&Lease>, uid: &str) -> Result<()> {
        match current {
            Some(lease) if lease.is_held_by(uid) => Ok(()),
            _ => Err(CoreError::NotHolder),
        }
    }

    /// Check used by update and delete before touching a block.
    pub fn guard(&self, current: Option<&Lease>, uid: &str, now: DateTime<Utc>) -> Result<()> {
        match LockState::at(current, now) {
            LockState::LockedBy(lease) if !lease.is_held_by(uid) => Err(CoreError::Locked),
            _ => Ok(()),
        }
    }

    fn grant(&self, uid: &str, now: DateTime<Utc>) -> Result<Lease> {
        let until = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| CoreError::Internal(format!("lease ttl {} overflows the clock", self.ttl)))?;
        Ok(Lease {
            holder: uid.to_string(),
            until,
        })
    }
}

/// Store fields for a lease. Both keys are always written together.
pub fn lease_fields(lease: Option<&Lease>) -> Fields {
    let mut fields = Fields::new();
    match lease {
        Some(lease) => {
            fields.insert("lockHolder".into(), Value::String(lease.holder.clone()));
            fields.insert("lockUntil".into(), timestamp(lease.until));
        }
        None => {
            fields.insert("lockHolder".into(), Value::Null);
            fields.insert("lockUntil".into(), Value::Null);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> LeaseLock {
        LeaseLock::new(Duration::seconds(30))
    }

    fn lease(holder: &str, until: DateTime<Utc>) -> Lease {
        Lease {
            holder: holder.into(),
            until,
        }
    }

    #[test]
    fn acquire_unlocked_grants_ttl() {
        let now = Utc::now();
        let granted = lock().acquire(None, "a", now).unwrap();
        assert_eq!(granted, lease("a", now + Duration::seconds(30)));
    }

    #[test]
    fn acquire_against_active_holder_is_locked() {
        let now = Utc::now();
        let held = lease("a", now + Duration::seconds(10));
        assert_eq!(lock().acquire(Some(&held), "b", now), Err(CoreError::Locked));
    }

    #[test]
    fn acquire_is_reentrant_and_extends() {
        let now = Utc::now();
        let held = lease("a", now + Duration::seconds(5));
        let extended = lock().acquire(Some(&held), "a", now).unwrap();
        assert_eq!(extended.until, now + Duration::seconds(30));
    }

    #[test]
    fn expired_lease_can_be_stolen() {
        let now = Utc::now();
        let stale = lease("a", now - Duration::seconds(1));
        let stolen = lock().acquire(Some(&stale), "b", now).unwrap();
        assert_eq!(stolen.holder, "b");
    }

    #[test]
    fn lease_expiring_exactly_now_is_inactive() {
        let now = Utc::now();
        let edge = lease("a", now);
        assert_eq!(LockState::at(Some(&edge), now), LockState::Unlocked);
        assert!(lock().acquire(Some(&edge), "b", now).is_ok());
        assert!(lock().guard(Some(&edge), "b", now).is_ok());
    }

    #[test]
    fn renew_checks_holder_only() {
        let now = Utc::now();
        let stale = lease("a", now - Duration::seconds(60));
        let renewed = lock().renew(Some(&stale), "a", now).unwrap();
        assert_eq!(renewed.until, now + Duration::seconds(30));

        assert_eq!(lock().renew(Some(&stale), "b", now), Err(CoreError::NotHolder));
        assert_eq!(lock().renew(None, "a", now), Err(CoreError::NotHolder));
    }

    #[test]
    fn release_requires_holder() {
        let now = Utc::now();
        let held = lease("a", now + Duration::seconds(10));
        assert!(lock().release(Some(&held), "a").is_ok());
        assert_eq!(lock().release(Some(&held), "b"), Err(CoreError::NotHolder));
        assert_eq!(lock().release(None, "a"), Err(CoreError::NotHolder));
    }

    #[test]
    fn guard_passes_for_holder_free_or_expired() {
        let now = Utc::now();
        let held = lease("a", now + Duration::seconds(10));
        let stale = lease("a", now - Duration::seconds(10));

        assert!(lock().guard(None, "b", now).is_ok());
        assert!(lock().guard(Some(&held), "a", now).is_ok());
        assert!(lock().guard(Some(&stale), "b", now).is_ok());
        assert_eq!(lock().guard(Some(&held), "b", now), Err(CoreError::Locked));
    }

    #[test]
    fn lease_fields_set_and_clear_together() {
        let now = Utc::now();
        let set = lease_fields(Some(&lease("a", now)));
        assert_eq!(set["lockHolder"], "a");
        assert!(set["lockUntil"].is_string());

        let cleared = lease_fields(None);
        assert_eq!(cleared.len(), 2);
        assert!(cleared.values().all(Value::is_null));
    }

    #[test]
    fn oversized_ttl_fails_instead_of_overflowing() {
        let now = Utc::now();
        let huge = LeaseLock::new(Duration::MAX);
        assert!(matches!(huge.acquire(None, "a", now), Err(CoreError::Internal(_))));

        let held = lease("a", now + Duration::seconds(5));
        assert!(matches!(huge.renew(Some(&held), "a", now), Err(CoreError::Internal(_))));
    }
}
