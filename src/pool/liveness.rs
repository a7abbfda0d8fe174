//! Shared worker liveness map.

use tokio::sync::{RwLock, RwLockReadGuard};

use super::WorkerId;

/// Liveness state behind the lock.
#[derive(Debug)]
pub struct LivenessState {
    alive: Vec<bool>,
    sealed: bool,
}

impl LivenessState {
    pub fn is_alive(&self, worker_id: WorkerId) -> bool {
        self.alive.get(worker_id).copied().unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.alive
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Worker ID → alive flag, written by health monitors and read by the
/// dispatcher under the same lock.
///
/// Once sealed (on coordinator stop) every worker stays dead and further
/// writes are ignored.
#[derive(Debug)]
pub struct LivenessMap {
    state: RwLock<LivenessState>,
}

impl LivenessMap {
    /// All workers start alive.
    pub fn new(num_workers: usize) -> Self {
        Self {
            state: RwLock::new(LivenessState {
                alive: vec![true; num_workers],
                sealed: false,
            }),
        }
    }

    pub async fn is_alive(&self, worker_id: WorkerId) -> bool {
        self.state.read().await.is_alive(worker_id)
    }

    /// Set a worker's flag. Returns the previous value, or `None` if the ID is
    /// unknown or the map is sealed.
    pub async fn set(&self, worker_id: WorkerId, alive: bool) -> Option<bool> {
        let mut state = self.state.write().await;
        if state.sealed {
            return None;
        }
        let slot = state.alive.get_mut(worker_id)?;
        Some(std::mem::replace(slot, alive))
    }

    /// Mark every worker dead and refuse further updates.
    pub async fn seal(&self) {
        let mut state = self.state.write().await;
        state.alive.iter_mut().for_each(|alive| *alive = false);
        state.sealed = true;
    }

    pub async fn is_sealed(&self) -> bool {
        self.state.read().await.sealed
    }

    pub async fn snapshot(&self) -> Vec<bool> {
        self.state.read().await.alive.clone()
    }

    /// Hold the read lock across a routing decision.
    pub async fn read(&self) -> RwLockReadGuard<'_, LivenessState> {
        self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_all_alive() {
        let map = LivenessMap::new(3);
        assert_eq!(map.snapshot().await, vec![true, true, true]);
    }

    #[tokio::test]
    async fn set_returns_previous() {
        let map = LivenessMap::new(2);
        assert_eq!(map.set(1, false).await, Some(true));
        assert_eq!(map.set(1, false).await, Some(false));
        assert!(!map.is_alive(1).await);
        assert_eq!(map.set(5, false).await, None);
        assert!(!map.is_alive(5).await);
    }

    #[tokio::test]
    async fn sealed_map_ignores_writes() {
        let map = LivenessMap::new(2);
        map.seal().await;
        assert!(map.is_sealed().await);
        assert_eq!(map.set(0, true).await, None);
        assert_eq!(map.snapshot().await, vec![false, false]);
    }
}
