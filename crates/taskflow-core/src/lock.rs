//! Tabla de locks por task: exclusión mutua entre runs concurrentes.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use tokio::time::{sleep, Instant};

use crate::constants::LOCK_POLL_MS;

/// Tabla en memoria con una entrada viva por task en ejecución. Las
/// entradas se eliminan al liberar, nunca quedan tombstones.
#[derive(Default)]
pub struct RunLockTable {
    entries: DashMap<String, ()>,
}

impl RunLockTable {
    pub fn new() -> RunLockTable { RunLockTable { entries: DashMap::new() } }

    /// Intenta adquirir el lock de `task_id` sondeando hasta agotar
    /// `limit`. Devuelve `false` si otro run lo retuvo todo el plazo.
    pub async fn acquire(&self, task_id: &str, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            match self.entries.entry(task_id.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(());
                    debug!("lock acquire:ok task_id={task_id}");
                    return true;
                }
                Entry::Occupied(_) => {}
            }
            if Instant::now() >= deadline {
                debug!("lock acquire:timeout task_id={task_id}");
                return false;
            }
            sleep(Duration::from_millis(LOCK_POLL_MS)).await;
        }
    }

    /// Libera el lock; liberar una entrada ausente es un no-op.
    pub fn release(&self, task_id: &str) {
        self.entries.remove(task_id);
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let table = RunLockTable::new();
        assert!(table.acquire("t1", Duration::from_millis(50)).await);
        assert!(table.is_running("t1"));
        assert!(!table.acquire("t1", Duration::from_millis(250)).await,
                "held lock must reject a second acquire");
        table.release("t1");
        assert!(table.acquire("t1", Duration::from_millis(50)).await);
        table.release("t1");
    }

    #[tokio::test]
    async fn different_tasks_do_not_contend() {
        let table = RunLockTable::new();
        assert!(table.acquire("a", Duration::from_millis(50)).await);
        assert!(table.acquire("b", Duration::from_millis(50)).await);
        assert_eq!(table.len(), 2);
        table.release("a");
        table.release("b");
        assert!(table.is_empty(), "released entries are removed, not tombstoned");
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let table = RunLockTable::new();
        table.release("never-held");
        assert!(table.acquire("x", Duration::from_millis(50)).await);
        table.release("x");
        table.release("x");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn acquire_succeeds_once_holder_releases_within_the_window() {
        let table = Arc::new(RunLockTable::new());
        assert!(table.acquire("t", Duration::from_millis(50)).await);
        let holder = table.clone();
        let releaser = tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            holder.release("t");
        });
        assert!(table.acquire("t", Duration::from_secs(2)).await,
                "waiter inside the window must win the lock after release");
        releaser.await.expect("releaser");
        table.release("t");
    }

    #[tokio::test]
    async fn exclusivity_under_concurrent_acquirers() {
        let table = Arc::new(RunLockTable::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                table.acquire("same", Duration::from_millis(120)).await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one concurrent acquirer may win");
        table.release("same");
    }
}
