use parking_lot::{Condvar, Mutex};
use rao_core::Network;
use std::ops::{Deref, DerefMut};

/// Fixed set of network clones checked out by leaf workers.
///
/// A checked-out network is owned by one worker only. On release it is reset
/// to the base network before going back to the pool.
pub struct NetworkPool {
    base: Network,
    idle: Mutex<Vec<Network>>,
    released: Condvar,
}

impl NetworkPool {
    pub fn new(base: &Network, size: usize) -> Self {
        let size = size.max(1);
        Self {
            base: base.clone(),
            idle: Mutex::new((0..size).map(|_| base.clone()).collect()),
            released: Condvar::new(),
        }
    }

    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    /// Block until a network is free.
    pub fn acquire(&self) -> PooledNetwork<'_> {
        let mut idle = self.idle.lock();
        loop {
            if let Some(network) = idle.pop() {
                return PooledNetwork {
                    pool: self,
                    network: Some(network),
                };
            }
            self.released.wait(&mut idle);
        }
    }

    fn release(&self, mut network: Network) {
        network.clone_from(&self.base);
        self.idle.lock().push(network);
        self.released.notify_one();
    }
}

/// Network checked out of a [`NetworkPool`]; returned on drop.
pub struct PooledNetwork<'a> {
    pool: &'a NetworkPool,
    network: Option<Network>,
}

impl Deref for PooledNetwork<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        // Only `drop` takes the network out.
        match &self.network {
            Some(network) => network,
            None => &self.pool.base,
        }
    }
}

impl DerefMut for PooledNetwork<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        self.network.get_or_insert_with(|| self.pool.base.clone())
    }
}

impl Drop for PooledNetwork<'_> {
    fn drop(&mut self) {
        if let Some(network) = self.network.take() {
            self.pool.release(network);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{Bus, Edge, ElementId, Switch};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn network() -> Network {
        let mut n = Network::new();
        n.add_bus(Bus::new("a", None)).unwrap();
        n.add_bus(Bus::new("b", None)).unwrap();
        n.add_edge(Edge::Switch(Switch {
            id: ElementId::new("s1"),
            from_bus: ElementId::new("a"),
            to_bus: ElementId::new("b"),
            open: false,
        }))
        .unwrap();
        n
    }

    #[test]
    fn test_released_network_is_reset() {
        let pool = NetworkPool::new(&network(), 1);
        {
            let mut n = pool.acquire();
            n.set_open(&ElementId::new("s1"), true).unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
        let n = pool.acquire();
        assert!(!n.is_open(&ElementId::new("s1")).unwrap());
    }

    #[test]
    fn test_never_more_checkouts_than_size() {
        let pool = Arc::new(NetworkPool::new(&network(), 2));
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (pool, in_use, peak) = (pool.clone(), in_use.clone(), peak.clone());
                std::thread::spawn(move || {
                    let _n = pool.acquire();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    in_use.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }
}
