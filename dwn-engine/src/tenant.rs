// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant serialization.
//!
//! Message processing for one tenant must appear sequential: prior state is
//! read, acceptance decided and new state written under one exclusive lock.
//! Locks are keyed by tenant, created lazily and reclaimed once no handler
//! holds or awaits them, so idle tenants cost nothing.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use dwn_core::Did;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub(crate) struct TenantLocks {
    inner: Mutex<HashMap<Did, Weak<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    /// Acquire the exclusive lock of a tenant, awaiting any holder.
    pub(crate) async fn acquire(&self, tenant: &Did) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .inner
                .lock()
                .expect("acquire exclusive access on lock map");

            locks.retain(|_, weak| weak.strong_count() > 0);

            match locks.get(tenant).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(tenant.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use dwn_core::Did;

    use super::TenantLocks;

    #[tokio::test]
    async fn same_tenant_is_exclusive() {
        let locks = TenantLocks::default();
        let tenant = Did::new("did:example:alice");

        let guard = locks.acquire(&tenant).await;

        let pending = {
            let second = locks.acquire(&tenant);
            tokio::pin!(second);
            // The second acquisition must not resolve while the first guard
            // is held.
            tokio::select! {
                biased;
                _ = &mut second => false,
                _ = tokio::task::yield_now() => true,
            }
        };
        assert!(pending);

        drop(guard);
        let _guard = locks.acquire(&tenant).await;
    }

    #[tokio::test]
    async fn different_tenants_do_not_contend() {
        let locks = TenantLocks::default();

        let _alice = locks.acquire(&Did::new("did:example:alice")).await;
        let _bob = locks.acquire(&Did::new("did:example:bob")).await;
    }

    #[tokio::test]
    async fn locks_are_reclaimed_when_released() {
        let locks = TenantLocks::default();
        let tenant = Did::new("did:example:alice");

        drop(locks.acquire(&tenant).await);
        assert!(
            locks
                .inner
                .lock()
                .unwrap()
                .get(&tenant)
                .is_none_or(|weak| weak.strong_count() == 0)
        );
    }
}
