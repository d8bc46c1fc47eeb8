//! Generic reusable-object pool (spec §3: ObjectPool) used for both
//! `ServerRequest` and `ServerConnection` instances (spec §4.8/§6).
//!
//! Grounded in the teacher's `threadpool.rs`: the same mutex-guarded shared
//! state that there dispatches jobs to worker threads here just hands out
//! and reclaims whole objects. There's no channel here because ownership of
//! a pooled object moves to exactly one thread for the life of a connection,
//! never broadcast to a pool of workers.

use std::collections::VecDeque;
use std::sync::Mutex;

struct Inner<T> {
    free: VecDeque<T>,
    all_count: usize,
}

pub struct ObjectPool<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectPool<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                free: VecDeque::new(),
                all_count: 0,
            }),
        }
    }

    /// Hands out the oldest idle object if one is free, otherwise calls
    /// `factory` to create a new one (spec §3/§4.6: "`get()` returns the
    /// oldest free entry (FIFO)").
    pub fn get(&self, factory: impl FnOnce() -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        if let Some(obj) = inner.free.pop_front() {
            return obj;
        }
        inner.all_count += 1;
        drop(inner);
        factory()
    }

    /// Returns `obj` to the back of the free list for reuse (spec:
    /// ObjectPool.release).
    pub fn release(&self, obj: T) {
        self.inner.lock().unwrap().free.push_back(obj);
    }

    /// Evicts a single idle object, for the janitor to call once per tick
    /// (spec §9 open question: eviction is deliberately rate-limited to one
    /// object per pool per tick rather than draining the whole free list).
    pub fn evict_one(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.free.pop_front().is_some() {
            inner.all_count -= 1;
            true
        } else {
            false
        }
    }

    pub fn total_count(&self) -> usize {
        self.inner.lock().unwrap().all_count
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().unwrap().free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_new_object_when_pool_empty() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new();
        let obj = pool.get(|| vec![1, 2, 3]);
        assert_eq!(obj, vec![1, 2, 3]);
        assert_eq!(pool.total_count(), 1);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn reuses_released_object_instead_of_creating() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new();
        let obj = pool.get(|| vec![9]);
        pool.release(obj);
        assert_eq!(pool.free_count(), 1);

        let mut factory_called = false;
        let reused = pool.get(|| {
            factory_called = true;
            vec![]
        });
        assert!(!factory_called);
        assert_eq!(reused, vec![9]);
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn get_returns_oldest_released_object_first() {
        let pool: ObjectPool<u32> = ObjectPool::new();
        let a = pool.get(|| 1);
        let b = pool.get(|| 2);
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.get(|| panic!("should reuse")), 1);
        assert_eq!(pool.get(|| panic!("should reuse")), 2);
    }

    #[test]
    fn evict_one_removes_a_single_idle_object() {
        let pool: ObjectPool<u32> = ObjectPool::new();
        pool.release(pool.get(|| 1));
        pool.release(pool.get(|| 2));
        assert_eq!(pool.free_count(), 2);

        assert!(pool.evict_one());
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.total_count(), 1);

        assert!(pool.evict_one());
        assert!(!pool.evict_one());
    }
}
