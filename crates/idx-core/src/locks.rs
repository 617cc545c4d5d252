use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-entity critical sections. Mutations on one uuid are serialized;
/// different uuids never contend beyond the short map lookup.
#[derive(Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub async fn lock(&self, uuid: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Drop locks nobody holds or waits on.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(uuid)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
