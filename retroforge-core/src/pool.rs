//! Sprite-instance pool manager (§4.9).
//!
//! Eligibility: a sprite is pooled iff it is not a UI sprite and its `maxSpawn` is
//! greater than 10; everything else is never pooled. Each pool holds its own mutex;
//! the manager additionally holds a read-write lock over the name→pool map so new
//! pools can be created without blocking lookups on existing ones for long.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, RwLock};

use crate::cart::SpriteDef;

/// One live sprite instance handed out by `Pool::acquire`.
#[derive(Debug, Clone)]
pub struct SpriteInstance {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub age: f64,
    pub active: bool,
    pub pooled: bool,
    pub custom: HashMap<String, String>,
}

impl SpriteInstance {
    fn fresh(name: &str, pooled: bool) -> Self {
        SpriteInstance {
            name: name.to_string(),
            x: 0.0,
            y: 0.0,
            age: 0.0,
            active: true,
            pooled,
            custom: HashMap::new(),
        }
    }
}

/// Failure reported by `Pool::acquire`/`Pool::release`.
#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The pool's active set reached `max_size`; the caller received a non-pooled
    /// overflow instance instead and should decide whether to log or drop it.
    Exhausted,
    /// `release` was called with an instance that isn't pooled or isn't active.
    NotActive,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted => write!(f, "pool exhausted, overflow instance allocated"),
            PoolError::NotActive => write!(f, "instance is not active in this pool"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Point-in-time stats for one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub name: String,
    pub available: usize,
    pub active: usize,
    pub max_size: usize,
    pub utilization: f64,
}

struct PoolInner {
    name: String,
    max_size: usize,
    available: Vec<SpriteInstance>,
    active: HashSet<usize>,
    next_id: usize,
    active_instances: HashMap<usize, SpriteInstance>,
}

/// A single sprite's instance pool.
pub struct Pool {
    inner: Mutex<PoolInner>,
}

/// Growth-chunk id paired with a live instance, so callers can release by identity.
pub struct Acquired {
    pub id: usize,
    pub instance: SpriteInstance,
}

impl Pool {
    fn new(name: &str, max_spawn: u32) -> Self {
        let max_size = max_spawn as usize;
        let initial = 50.min((max_size as f64 * 0.5).floor() as usize).max(1);
        let mut inner = PoolInner {
            name: name.to_string(),
            max_size,
            available: Vec::with_capacity(initial),
            active: HashSet::new(),
            next_id: 0,
            active_instances: HashMap::new(),
        };
        for _ in 0..initial.min(max_size) {
            inner.available.push(SpriteInstance::fresh(name, true));
        }
        Pool {
            inner: Mutex::new(inner),
        }
    }

    /// Acquire one instance. On exhaustion, returns a non-pooled overflow instance
    /// alongside `PoolError::Exhausted` so the caller may choose to log it.
    pub fn acquire(&self) -> (Acquired, Option<PoolError>) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(mut instance) = inner.available.pop() {
            instance.active = true;
            instance.age = 0.0;
            instance.x = 0.0;
            instance.y = 0.0;
            instance.custom.clear();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.active.insert(id);
            inner.active_instances.insert(id, instance.clone());
            return (Acquired { id, instance }, None);
        }

        if inner.active.len() < inner.max_size {
            let remaining = inner.max_size - inner.active.len();
            let grow = remaining.max(1).min((inner.max_size as f64 * 0.25).floor().max(1.0) as usize);
            let name = inner.name.clone();
            for _ in 0..grow {
                inner.available.push(SpriteInstance::fresh(&name, true));
            }
            let mut instance = inner.available.pop().expect("just grew the pool");
            instance.active = true;
            let id = inner.next_id;
            inner.next_id += 1;
            inner.active.insert(id);
            inner.active_instances.insert(id, instance.clone());
            return (Acquired { id, instance }, None);
        }

        let name = inner.name.clone();
        let overflow = SpriteInstance::fresh(&name, false);
        let id = inner.next_id;
        inner.next_id += 1;
        (
            Acquired {
                id,
                instance: overflow,
            },
            Some(PoolError::Exhausted),
        )
    }

    /// Release a previously acquired instance back to the pool. Rejects instances
    /// that are not pooled or not currently active.
    pub fn release(&self, id: usize) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut instance) = inner.active_instances.remove(&id) else {
            return Err(PoolError::NotActive);
        };
        if !instance.pooled || !inner.active.remove(&id) {
            return Err(PoolError::NotActive);
        }
        instance.active = false;
        instance.age = 0.0;
        instance.x = 0.0;
        instance.y = 0.0;
        instance.custom.clear();
        inner.available.push(instance);
        Ok(())
    }

    /// Advance every active instance's age by `dt`; returns the ids that crossed
    /// `lifetime_s`. Expired instances remain active until the caller releases them.
    pub fn update(&self, dt: f64, lifetime_s: f64) -> Vec<usize> {
        if lifetime_s <= 0.0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock().unwrap();
        let mut expired = Vec::new();
        for (&id, instance) in inner.active_instances.iter_mut() {
            instance.age += dt;
            if instance.age >= lifetime_s {
                expired.push(id);
            }
        }
        expired
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().unwrap();
        let active = inner.active.len();
        PoolStats {
            name: inner.name.clone(),
            available: inner.available.len(),
            active,
            max_size: inner.max_size,
            utilization: if inner.max_size == 0 {
                0.0
            } else {
                active as f64 / inner.max_size as f64
            },
        }
    }
}

/// Owns every sprite's pool, created lazily the first time a poolable sprite is
/// acquired.
#[derive(Default)]
pub struct PoolManager {
    pools: RwLock<BTreeMap<String, Pool>>,
}

impl PoolManager {
    pub fn new() -> Self {
        PoolManager {
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Acquire an instance of `name`, creating its pool on first use. Returns `None`
    /// if `def` is not poolable (§4.9 eligibility predicate) — the caller should
    /// allocate an unpooled instance itself in that case.
    pub fn acquire(&self, name: &str, def: &SpriteDef) -> Option<(Acquired, Option<PoolError>)> {
        if !def.is_poolable() {
            return None;
        }
        {
            let pools = self.pools.read().unwrap();
            if let Some(pool) = pools.get(name) {
                return Some(pool.acquire());
            }
        }
        let mut pools = self.pools.write().unwrap();
        let pool = pools
            .entry(name.to_string())
            .or_insert_with(|| Pool::new(name, def.max_spawn));
        Some(pool.acquire())
    }

    pub fn release(&self, name: &str, id: usize) -> Result<(), PoolError> {
        let pools = self.pools.read().unwrap();
        match pools.get(name) {
            Some(pool) => pool.release(id),
            None => Err(PoolError::NotActive),
        }
    }

    pub fn stats(&self, name: &str) -> Option<PoolStats> {
        self.pools.read().unwrap().get(name).map(Pool::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poolable_def(max_spawn: u32) -> SpriteDef {
        SpriteDef {
            width: 8,
            height: 8,
            pixels: vec![vec![-1; 8]; 8],
            use_collision: false,
            mount_points: vec![],
            is_ui: false,
            lifetime_ms: 0,
            max_spawn,
        }
    }

    #[test]
    fn ui_sprites_are_never_pooled() {
        let mut def = poolable_def(100);
        def.is_ui = true;
        assert!(!def.is_poolable());
    }

    #[test]
    fn max_spawn_at_or_below_ten_is_not_pooled() {
        assert!(!poolable_def(10).is_poolable());
        assert!(poolable_def(11).is_poolable());
    }

    #[test]
    fn initial_pool_size_matches_formula() {
        let pool = Pool::new("bullet", 20);
        let stats = pool.stats();
        assert_eq!(stats.available, 10); // min(50, max(1, floor(20*0.5)))
        assert_eq!(stats.max_size, 20);
    }

    #[test]
    fn acquire_marks_active_and_resets_fields() {
        let pool = Pool::new("bullet", 20);
        let (acquired, err) = pool.acquire();
        assert!(err.is_none());
        assert!(acquired.instance.active);
        assert_eq!(acquired.instance.age, 0.0);
        assert_eq!(pool.stats().active, 1);
    }

    #[test]
    fn release_returns_instance_to_available_stack() {
        let pool = Pool::new("bullet", 20);
        let (acquired, _) = pool.acquire();
        let before = pool.stats();
        pool.release(acquired.id).unwrap();
        let after = pool.stats();
        assert_eq!(after.active, before.active - 1);
        assert_eq!(after.available, before.available + 1);
    }

    #[test]
    fn release_of_unknown_id_fails() {
        let pool = Pool::new("bullet", 20);
        assert_eq!(pool.release(9999), Err(PoolError::NotActive));
    }

    #[test]
    fn exhaustion_yields_overflow_instance_and_error() {
        let pool = Pool::new("bullet", 2);
        let (_, _) = pool.acquire();
        let (_, _) = pool.acquire();
        let (acquired, err) = pool.acquire();
        assert_eq!(err, Some(PoolError::Exhausted));
        assert!(!acquired.instance.pooled);
    }

    #[test]
    fn update_reports_expired_instances_but_leaves_them_active() {
        let pool = Pool::new("bullet", 20);
        let (acquired, _) = pool.acquire();
        let expired = pool.update(1.5, 1.0);
        assert_eq!(expired, vec![acquired.id]);
        assert_eq!(pool.stats().active, 1);
    }

    #[test]
    fn manager_returns_none_for_unpoolable_sprite() {
        let manager = PoolManager::new();
        let mut def = poolable_def(5);
        def.max_spawn = 5;
        assert!(manager.acquire("coin", &def).is_none());
    }

    #[test]
    fn manager_creates_pool_lazily_on_first_acquire() {
        let manager = PoolManager::new();
        let def = poolable_def(20);
        assert!(manager.stats("bullet").is_none());
        manager.acquire("bullet", &def);
        assert!(manager.stats("bullet").is_some());
    }
}
