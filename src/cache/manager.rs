//! Partitioned in-memory cache of scaled textures.
//!
//! Records are grouped by source image so that invalidating one image only
//! locks and scans that image's partition. Every mutation of a partition's
//! map happens under its write lock, and the recency list is updated while
//! that lock is held, so a record is never in the LRU without being in a map.
//!
//! Lock order: duplicate table, then the partition table, then a partition's
//! slots, then the recency list.

use super::disk::DiskCache;
use super::entry::{CacheEntry, ScaleResult};
use super::fingerprint::Fingerprint;
use super::lru::RecencyList;
use crate::config::ResampleConfig;
use crate::geometry::Bounds;
use crate::memory::MemoryAccounting;
use crate::source::{SourceId, SourceImage};
use crate::texture::{ManagedTexture, ScaledTexture, TextureKey, TextureState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of [`CacheManager::claim`]
#[derive(Debug, Clone)]
pub enum Claim {
    /// A published texture exists
    Ready(Arc<ScaledTexture>),
    /// Another caller is computing this fingerprint
    InFlight(Arc<ScaledTexture>),
    /// The caller now owns the computation and must publish or abandon it
    Claimed(Arc<ScaledTexture>),
}

impl Claim {
    pub fn texture(&self) -> &Arc<ScaledTexture> {
        match self {
            Claim::Ready(t) | Claim::InFlight(t) | Claim::Claimed(t) => t,
        }
    }
}

/// Counters kept by the cache manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub evicted_bytes: u64,
    pub stale_discards: u64,
    pub duplicate_purges: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    evicted_bytes: AtomicU64,
    stale_discards: AtomicU64,
    duplicate_purges: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

#[derive(Debug)]
struct Partition {
    slots: RwLock<HashMap<Fingerprint, Arc<ScaledTexture>>>,
    last_access_frame: AtomicU64,
}

impl Partition {
    fn new(frame: u64) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            last_access_frame: AtomicU64::new(frame),
        }
    }

    fn touch(&self, frame: u64) {
        self.last_access_frame.fetch_max(frame, Ordering::AcqRel);
    }

    fn last_access_frame(&self) -> u64 {
        self.last_access_frame.load(Ordering::Acquire)
    }
}

fn holds(slots: &HashMap<Fingerprint, Arc<ScaledTexture>>, texture: &Arc<ScaledTexture>) -> bool {
    slots
        .get(&texture.key().fingerprint)
        .is_some_and(|current| Arc::ptr_eq(current, texture))
}

/// Owner of every scaled texture record
///
/// Constructed once per scheduler and shared as `Arc<CacheManager>`.
/// [`CacheManager::clear`] disposes everything it holds.
pub struct CacheManager {
    partitions: RwLock<HashMap<SourceId, Arc<Partition>>>,
    recency: RecencyList,
    memory: Arc<MemoryAccounting>,
    disk: Option<DiskCache>,
    duplicates: Mutex<HashMap<String, SourceId>>,
    discard_duplicates: bool,
    duplicate_delay: u64,
    duplicate_deny: Vec<String>,
    frame: AtomicU64,
    counters: Counters,
}

impl CacheManager {
    /// Build a manager from `config`
    ///
    /// An unusable cache directory is logged and disk caching disabled.
    pub fn new(config: &ResampleConfig, memory: Arc<MemoryAccounting>) -> Self {
        let disk = config
            .cache_directory
            .as_ref()
            .and_then(|root| match DiskCache::open(root) {
                Ok(disk) => Some(disk),
                Err(err) => {
                    log::warn!("Disk cache disabled: {}", err);
                    None
                }
            });

        Self {
            partitions: RwLock::new(HashMap::new()),
            recency: RecencyList::new(),
            memory,
            disk,
            duplicates: Mutex::new(HashMap::new()),
            discard_duplicates: config.discard_duplicates,
            duplicate_delay: config.discard_duplicates_frame_delay,
            duplicate_deny: config.discard_duplicates_deny.clone(),
            frame: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryAccounting> {
        &self.memory
    }

    pub fn recency(&self) -> &RecencyList {
        &self.recency
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Frame number stamped on every access from now on
    pub fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Records of every state across all partitions
    pub fn entry_count(&self) -> usize {
        let partitions: Vec<Arc<Partition>> = self.partitions.read().values().cloned().collect();
        partitions.iter().map(|p| p.slots.read().len()).sum()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            evicted_bytes: c.evicted_bytes.load(Ordering::Relaxed),
            stale_discards: c.stale_discards.load(Ordering::Relaxed),
            duplicate_purges: c.duplicate_purges.load(Ordering::Relaxed),
        }
    }

    fn partition(&self, source: SourceId) -> Option<Arc<Partition>> {
        self.partitions.read().get(&source).cloned()
    }

    fn partition_for(&self, source: SourceId) -> Arc<Partition> {
        if let Some(partition) = self.partition(source) {
            return partition;
        }
        let frame = self.frame();
        Arc::clone(
            self.partitions
                .write()
                .entry(source)
                .or_insert_with(|| Arc::new(Partition::new(frame))),
        )
    }

    /// Called with the partition's slots locked
    fn mark_used(&self, partition: &Partition, texture: &Arc<ScaledTexture>) {
        let frame = self.frame();
        partition.touch(frame);
        texture.touch(frame);
        self.recency.touch(texture);
    }

    fn release(&self, texture: &ScaledTexture) -> u64 {
        let bytes = texture.dispose();
        if bytes > 0 {
            self.memory.remove(bytes);
        }
        bytes
    }

    /// The published record for `key`, refreshing its recency
    pub fn lookup(&self, key: TextureKey) -> Option<Arc<ScaledTexture>> {
        let partition = self.partition(key.source)?;
        let slots = partition.slots.read();
        let texture = slots.get(&key.fingerprint).filter(|t| t.is_ready())?;
        self.mark_used(&partition, texture);
        bump(&self.counters.hits, 1);
        Some(Arc::clone(texture))
    }

    /// The record for `key` in any state, without refreshing its recency
    pub fn peek(&self, key: TextureKey) -> Option<Arc<ScaledTexture>> {
        let partition = self.partition(key.source)?;
        let slots = partition.slots.read();
        slots.get(&key.fingerprint).cloned()
    }

    /// Ready texture, in-flight marker, or a fresh marker owned by the caller
    ///
    /// The test and the insertion of a new marker happen under one write
    /// lock, so concurrent callers with the same key get exactly one
    /// [`Claim::Claimed`].
    pub fn claim(&self, source: &SourceImage, key: TextureKey, region: Bounds, scale: u32) -> Claim {
        let partition = self.partition_for(key.source);
        {
            let slots = partition.slots.read();
            if let Some(claim) = slots.get(&key.fingerprint).and_then(|t| self.reuse(&partition, t)) {
                return claim;
            }
        }

        let mut slots = partition.slots.write();
        if let Some(claim) = slots.get(&key.fingerprint).and_then(|t| self.reuse(&partition, t)) {
            return claim;
        }
        let texture = Arc::new(ScaledTexture::pending(
            key,
            source.name().map(str::to_owned),
            region,
            scale,
            self.frame(),
        ));
        slots.insert(key.fingerprint, Arc::clone(&texture));
        partition.touch(self.frame());
        bump(&self.counters.misses, 1);
        Claim::Claimed(texture)
    }

    fn reuse(&self, partition: &Partition, existing: &Arc<ScaledTexture>) -> Option<Claim> {
        match existing.state() {
            TextureState::Ready if existing.is_ready() => {
                self.mark_used(partition, existing);
                bump(&self.counters.hits, 1);
                Some(Claim::Ready(Arc::clone(existing)))
            }
            TextureState::Pending | TextureState::Publishing => {
                partition.touch(self.frame());
                Some(Claim::InFlight(Arc::clone(existing)))
            }
            _ => None,
        }
    }

    /// Attach a finished result to a claimed record
    ///
    /// Returns `None` and disposes the record when it went stale while the
    /// result was computed: the source was invalidated, or the record was
    /// replaced or disposed.
    pub fn publish(&self, texture: &Arc<ScaledTexture>, entry: CacheEntry) -> Option<Arc<ManagedTexture>> {
        let Some(partition) = self.partition(texture.key().source) else {
            self.discard_stale(texture);
            return None;
        };

        let slots = partition.slots.read();
        if !holds(&slots, texture) || !texture.begin_publish() {
            drop(slots);
            self.discard_stale(texture);
            return None;
        }
        let managed = Arc::new(ManagedTexture::new(entry, texture.scale()));
        if texture.finish_publish(Arc::clone(&managed)).is_err() {
            drop(slots);
            self.discard_stale(texture);
            return None;
        }
        self.memory.add(managed.size_bytes());
        self.mark_used(&partition, texture);
        drop(slots);

        log::info!(
            "Published {} region {} x{} as {} {:?} ({} bytes)",
            texture.name().unwrap_or("<unnamed>"),
            texture.region(),
            texture.scale(),
            managed.dimensions(),
            managed.format(),
            managed.size_bytes()
        );
        Some(managed)
    }

    fn discard_stale(&self, texture: &ScaledTexture) {
        texture.dispose();
        bump(&self.counters.stale_discards, 1);
        log::debug!(
            "Discarded stale result for {} region {}",
            texture.name().unwrap_or("<unnamed>"),
            texture.region()
        );
    }

    /// Drop a claimed record whose computation failed, waking its waiters
    pub fn abandon(&self, texture: &Arc<ScaledTexture>) {
        if let Some(partition) = self.partition(texture.key().source) {
            let mut slots = partition.slots.write();
            if holds(&slots, texture) {
                slots.remove(&texture.key().fingerprint);
            }
        }
        self.release(texture);
    }

    /// Publish `entry` directly under `key`
    ///
    /// Any record previously stored under the key is disposed and returned.
    pub fn insert(
        &self,
        source: &SourceImage,
        key: TextureKey,
        region: Bounds,
        scale: u32,
        entry: CacheEntry,
    ) -> Option<Arc<ScaledTexture>> {
        let partition = self.partition_for(key.source);
        let texture = Arc::new(ScaledTexture::pending(
            key,
            source.name().map(str::to_owned),
            region,
            scale,
            self.frame(),
        ));
        let managed = Arc::new(ManagedTexture::new(entry, scale));

        let previous = {
            let mut slots = partition.slots.write();
            let previous = slots.insert(key.fingerprint, Arc::clone(&texture));
            if let Some(previous) = &previous {
                self.recency.remove(previous);
            }
            if texture.begin_publish() && texture.finish_publish(Arc::clone(&managed)).is_ok() {
                self.memory.add(managed.size_bytes());
                self.mark_used(&partition, &texture);
            }
            previous
        };
        if let Some(previous) = &previous {
            self.release(previous);
        }
        previous
    }

    /// Dispose every record of `source`, or only those whose region
    /// intersects `region`; returns the number of records disposed
    pub fn invalidate(&self, source: SourceId, region: Option<Bounds>) -> usize {
        let victims = match region {
            None => {
                let victims = self.detach_partition(source);
                self.duplicates.lock().retain(|_, id| *id != source);
                victims
            }
            Some(bounds) => self.detach_region(source, bounds),
        };
        let released: u64 = victims.iter().map(|t| self.release(t)).sum();
        if !victims.is_empty() {
            log::info!(
                "Invalidated {} textures of source {:?} ({} bytes)",
                victims.len(),
                source,
                released
            );
        }
        victims.len()
    }

    /// Host notification that `source` is gone
    pub fn dispose_source(&self, source: SourceId) -> usize {
        self.invalidate(source, None)
    }

    fn detach_partition(&self, source: SourceId) -> Vec<Arc<ScaledTexture>> {
        let Some(partition) = self.partitions.write().remove(&source) else {
            return Vec::new();
        };
        let mut slots = partition.slots.write();
        let victims: Vec<Arc<ScaledTexture>> = slots.drain().map(|(_, t)| t).collect();
        for texture in &victims {
            self.recency.remove(texture);
        }
        victims
    }

    fn detach_region(&self, source: SourceId, bounds: Bounds) -> Vec<Arc<ScaledTexture>> {
        let Some(partition) = self.partition(source) else {
            return Vec::new();
        };
        let mut slots = partition.slots.write();
        let keys: Vec<Fingerprint> = slots
            .iter()
            .filter(|(_, t)| t.region().intersects(&bounds))
            .map(|(fp, _)| *fp)
            .collect();
        let victims: Vec<Arc<ScaledTexture>> = keys.iter().filter_map(|fp| slots.remove(fp)).collect();
        for texture in &victims {
            self.recency.remove(texture);
        }
        victims
    }

    fn evict_one(&self, texture: &Arc<ScaledTexture>) -> u64 {
        match self.partition(texture.key().source) {
            Some(partition) => {
                let mut slots = partition.slots.write();
                if holds(&slots, texture) {
                    slots.remove(&texture.key().fingerprint);
                }
                self.recency.remove(texture);
            }
            None => {
                self.recency.remove(texture);
            }
        }
        let bytes = self.release(texture);
        bump(&self.counters.evictions, 1);
        bump(&self.counters.evicted_bytes, bytes);
        bytes
    }

    /// Dispose least recently used textures until `target_bytes` are freed
    /// or nothing evictable remains; returns the bytes freed
    ///
    /// Records that are still being computed or published are never touched.
    pub fn evict(&self, target_bytes: u64) -> u64 {
        let mut freed = 0u64;
        let mut count = 0usize;
        while freed < target_bytes {
            let candidates = self.recency.eviction_candidates(target_bytes - freed);
            if candidates.is_empty() {
                break;
            }
            for texture in &candidates {
                freed += self.evict_one(texture);
                count += 1;
            }
        }
        if count > 0 {
            log::info!(
                "Evicted {} textures ({} bytes, {} requested)",
                count,
                freed,
                target_bytes
            );
        }
        freed
    }

    /// Evict every published texture not used in the current frame
    pub fn compact(&self) -> u64 {
        let stale = self.recency.stale_since(self.frame());
        let freed: u64 = stale.iter().map(|t| self.evict_one(t)).sum();
        if !stale.is_empty() {
            log::info!("Compacted {} textures ({} bytes)", stale.len(), freed);
        }
        freed
    }

    /// Track `source` under its logical name
    ///
    /// When an older source with the same name has been unreferenced for
    /// longer than the grace period, its partition is purged and its id
    /// returned.
    pub fn check_duplicates(&self, source: &SourceImage) -> Option<SourceId> {
        if !self.discard_duplicates {
            return None;
        }
        let name = source.name()?;
        if self.duplicate_deny.iter().any(|deny| deny == name) {
            return None;
        }

        let mut duplicates = self.duplicates.lock();
        let previous = match duplicates.get(name) {
            Some(&id) if id != source.id() => id,
            Some(_) => return None,
            None => {
                duplicates.insert(name.to_owned(), source.id());
                return None;
            }
        };
        if let Some(partition) = self.partition(previous) {
            let idle = self.frame().saturating_sub(partition.last_access_frame());
            if idle <= self.duplicate_delay {
                return None;
            }
        }
        duplicates.insert(name.to_owned(), source.id());
        drop(duplicates);

        let purged = self.detach_partition(previous);
        let released: u64 = purged.iter().map(|t| self.release(t)).sum();
        bump(&self.counters.duplicate_purges, 1);
        log::info!(
            "Purged duplicate of '{}': {} textures ({} bytes)",
            name,
            purged.len(),
            released
        );
        Some(previous)
    }

    /// Read a persisted result; failures are logged and count as a miss
    pub fn fetch_from_disk(&self, fingerprint: Fingerprint) -> Option<ScaleResult> {
        self.disk.as_ref()?.fetch(fingerprint)
    }

    /// Persist a result; failures are logged and otherwise ignored
    pub fn save_to_disk(&self, fingerprint: Fingerprint, result: &ScaleResult) -> bool {
        let Some(disk) = &self.disk else {
            return false;
        };
        match disk.save(fingerprint, result) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Could not persist {}: {}", fingerprint, err);
                false
            }
        }
    }

    /// Dispose every record of every source
    pub fn clear(&self) -> usize {
        let sources: Vec<SourceId> = self.partitions.read().keys().copied().collect();
        sources.into_iter().map(|source| self.invalidate(source, None)).sum()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Extent, Vec2B, Vec2I};
    use crate::resample::{Color16, PixelFormat};
    use std::thread;

    fn manager() -> CacheManager {
        CacheManager::new(&ResampleConfig::default(), Arc::new(MemoryAccounting::new()))
    }

    fn source(name: &str) -> SourceImage {
        let white = Color16::new(u16::MAX, u16::MAX, u16::MAX, u16::MAX);
        SourceImage::new(Some(name.into()), Extent::new(8, 8), vec![white; 64]).unwrap()
    }

    fn key(source: &SourceImage, fp: u64) -> TextureKey {
        TextureKey {
            source: source.id(),
            fingerprint: Fingerprint(fp),
        }
    }

    fn entry(bytes: usize) -> CacheEntry {
        Arc::new(ScaleResult {
            data: vec![7; bytes],
            dimensions: Extent::new(1, (bytes / 4) as u32),
            format: PixelFormat::Rgba8,
            wrapped: Vec2B::FALSE,
            padding: Vec2I::ZERO,
            block_padding: Vec2I::ZERO,
        })
    }

    fn published(cache: &CacheManager, src: &SourceImage, fp: u64, bytes: usize) -> Arc<ScaledTexture> {
        let region = Bounds::new(0, 0, 4, 4);
        let Claim::Claimed(texture) = cache.claim(src, key(src, fp), region, 2) else {
            panic!("expected a fresh claim");
        };
        cache.publish(&texture, entry(bytes)).unwrap();
        texture
    }

    #[test]
    fn test_claim_then_publish_then_lookup() {
        let cache = manager();
        let src = source("a.png");
        let k = key(&src, 1);
        assert!(cache.lookup(k).is_none());

        let claim = cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2);
        let texture = match claim {
            Claim::Claimed(t) => t,
            other => panic!("unexpected {:?}", other),
        };
        assert!(matches!(cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2), Claim::InFlight(_)));
        assert!(cache.lookup(k).is_none());

        let managed = cache.publish(&texture, entry(64)).unwrap();
        assert_eq!(managed.size_bytes(), 64);
        assert_eq!(cache.memory().resident_bytes(), 64);

        let first = cache.lookup(k).unwrap();
        let second = cache.lookup(k).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2), Claim::Ready(_)));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_concurrent_claims_yield_one_owner() {
        let cache = Arc::new(manager());
        let src = Arc::new(source("a.png"));
        let k = key(&src, 9);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let src = Arc::clone(&src);
                thread::spawn(move || {
                    matches!(cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2), Claim::Claimed(_))
                })
            })
            .collect();
        let owners = handles.into_iter().map(|h| h.join().unwrap()).filter(|&c| c).count();
        assert_eq!(owners, 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_invalidate_source_before_publish_discards_result() {
        let cache = manager();
        let src = source("a.png");
        let k = key(&src, 3);
        let Claim::Claimed(texture) = cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2) else {
            panic!("expected a fresh claim");
        };

        assert_eq!(cache.dispose_source(src.id()), 1);
        assert!(texture.is_disposed());
        assert!(cache.publish(&texture, entry(32)).is_none());
        assert!(cache.lookup(k).is_none());
        assert_eq!(cache.memory().resident_bytes(), 0);
        assert_eq!(cache.stats().stale_discards, 1);
        assert!(cache.recency().is_empty());
    }

    #[test]
    fn test_invalidate_region_only_hits_overlaps() {
        let cache = manager();
        let src = source("atlas.png");
        let left = key(&src, 1);
        let right = key(&src, 2);
        for (k, x) in [(left, 0), (right, 4)] {
            let Claim::Claimed(t) = cache.claim(&src, k, Bounds::new(x, 0, 4, 4), 2) else {
                panic!("expected a fresh claim");
            };
            cache.publish(&t, entry(16)).unwrap();
        }

        assert_eq!(cache.invalidate(src.id(), Some(Bounds::new(5, 1, 1, 1))), 1);
        assert!(cache.lookup(left).is_some());
        assert!(cache.lookup(right).is_none());
        assert_eq!(cache.memory().resident_bytes(), 16);
    }

    #[test]
    fn test_insert_returns_previous() {
        let cache = manager();
        let src = source("a.png");
        let k = key(&src, 5);
        let region = Bounds::new(0, 0, 4, 4);

        assert!(cache.insert(&src, k, region, 2, entry(16)).is_none());
        let previous = cache.insert(&src, k, region, 2, entry(32)).unwrap();
        assert!(previous.is_disposed());
        assert_eq!(cache.memory().resident_bytes(), 32);
        assert_eq!(cache.lookup(k).unwrap().memory_size(), 32);
        assert_eq!(cache.recency().len(), 1);
    }

    #[test]
    fn test_evict_lru_first() {
        let cache = manager();
        let src = source("a.png");
        let a = published(&cache, &src, 1, 100);
        let b = published(&cache, &src, 2, 100);
        let c = published(&cache, &src, 3, 100);
        cache.lookup(a.key());

        let freed = cache.evict(150);
        assert_eq!(freed, 200);
        assert!(b.is_disposed());
        assert!(c.is_disposed());
        assert!(a.is_ready());
        assert_eq!(cache.memory().resident_bytes(), 100);
        assert_eq!(cache.recency().len(), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_evict_skips_in_flight() {
        let cache = manager();
        let src = source("a.png");
        let Claim::Claimed(pending) = cache.claim(&src, key(&src, 1), Bounds::new(0, 0, 4, 4), 2) else {
            panic!("expected a fresh claim");
        };
        assert_eq!(cache.evict(u64::MAX), 0);
        assert!(!pending.is_disposed());
    }

    #[test]
    fn test_compact_keeps_current_frame() {
        let cache = manager();
        let src = source("a.png");
        let old = published(&cache, &src, 1, 10);
        cache.set_frame(4);
        let fresh = published(&cache, &src, 2, 20);

        assert_eq!(cache.compact(), 10);
        assert!(old.is_disposed());
        assert!(fresh.is_ready());
    }

    #[test]
    fn test_duplicates_purged_after_grace_period() {
        let cache = manager();
        let first = source("hero.png");
        let second = source("hero.png");
        published(&cache, &first, 1, 10);

        assert_eq!(cache.check_duplicates(&first), None);
        cache.set_frame(1);
        assert_eq!(cache.check_duplicates(&second), None);
        assert_eq!(cache.partition_count(), 1);

        cache.set_frame(10);
        assert_eq!(cache.check_duplicates(&second), Some(first.id()));
        assert_eq!(cache.partition_count(), 0);
        assert_eq!(cache.memory().resident_bytes(), 0);
        assert_eq!(cache.stats().duplicate_purges, 1);
    }

    #[test]
    fn test_duplicate_deny_list() {
        let config = ResampleConfig {
            discard_duplicates_deny: vec!["font.png".into()],
            ..ResampleConfig::default()
        };
        let cache = CacheManager::new(&config, Arc::new(MemoryAccounting::new()));
        let first = source("font.png");
        let second = source("font.png");
        published(&cache, &first, 1, 10);
        cache.check_duplicates(&first);
        cache.set_frame(100);
        assert_eq!(cache.check_duplicates(&second), None);
        assert_eq!(cache.partition_count(), 1);
    }

    #[test]
    fn test_abandon_wakes_waiters() {
        let cache = Arc::new(manager());
        let src = source("a.png");
        let k = key(&src, 1);
        let Claim::Claimed(texture) = cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2) else {
            panic!("expected a fresh claim");
        };
        let waiter = {
            let texture = Arc::clone(&texture);
            thread::spawn(move || texture.wait(None).is_none())
        };
        cache.abandon(&texture);
        assert!(waiter.join().unwrap());
        assert!(matches!(cache.claim(&src, k, Bounds::new(0, 0, 4, 4), 2), Claim::Claimed(_)));
    }

    #[test]
    fn test_clear_releases_everything() {
        let cache = manager();
        let a = source("a.png");
        let b = source("b.png");
        published(&cache, &a, 1, 10);
        published(&cache, &b, 1, 10);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.memory().snapshot().resident_bytes, 0);
        assert_eq!(cache.memory().texture_count(), 0);
    }
}
