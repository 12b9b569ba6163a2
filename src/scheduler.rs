//! Request entry point and per-frame scheduling of upscales.
//!
//! One thread owns the frame: it calls [`Scheduler::request`] while drawing
//! and [`Scheduler::end_frame`] once per frame. Background upscales run on a
//! [`WorkerPool`] and come back through a bounded channel of
//! [`PublishJob`]s, which only the draining thread turns into textures.

use crate::cache::fingerprint::{Fingerprint, FingerprintInputs};
use crate::cache::{CacheEntry, CacheManager, CacheStats, Claim};
use crate::config::ResampleConfig;
use crate::geometry::{Bounds, Vec2B};
use crate::memory::{MemoryAccounting, MemorySnapshot};
use crate::resample::pipeline::retry_on_oom;
use crate::resample::{ResampleError, Upscaler};
use crate::source::{SourceImage, SourceId, SourceRegion};
use crate::texture::{ManagedTexture, ScaledTexture, TextureKey};
use crate::threading::{ThreadError, WorkerPool};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a synchronous waiter sleeps before draining the publish queue
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Answer to a draw request
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Draw the unscaled source this time
    NotReady,
    Ready(Arc<ManagedTexture>),
}

impl Lookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, Lookup::Ready(_))
    }

    pub fn texture(&self) -> Option<&Arc<ManagedTexture>> {
        match self {
            Lookup::Ready(texture) => Some(texture),
            Lookup::NotReady => None,
        }
    }

    pub fn into_texture(self) -> Option<Arc<ManagedTexture>> {
        match self {
            Lookup::Ready(texture) => Some(texture),
            Lookup::NotReady => None,
        }
    }
}

/// A finished background computation waiting to be published
pub struct PublishJob {
    pub fingerprint: Fingerprint,
    texture: Arc<ScaledTexture>,
    result: Result<CacheEntry, ResampleError>,
}

// ============================================================================
// Texel timer
// ============================================================================

/// Running average of upscale time per source texel
#[derive(Debug, Default)]
pub struct TexelTimer {
    nanos: AtomicU64,
    texels: AtomicU64,
}

impl TexelTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, texels: u64, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
        self.texels.fetch_add(texels, Ordering::Relaxed);
    }

    /// Zero until something has been measured
    pub fn nanos_per_texel(&self) -> f64 {
        let texels = self.texels.load(Ordering::Relaxed);
        if texels == 0 {
            return 0.0;
        }
        self.nanos.load(Ordering::Relaxed) as f64 / texels as f64
    }

    pub fn estimate(&self, texels: u64) -> Duration {
        Duration::from_nanos((self.nanos_per_texel() * texels as f64) as u64)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of scheduler activity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    pub frame: u64,
    pub requests: u64,
    pub deferred: u64,
    pub upscales: u64,
    pub disk_hits: u64,
    pub published: u64,
    pub discarded: u64,
    pub failed: u64,
    pub pending_jobs: usize,
    pub nanos_per_texel: f64,
    pub cache: CacheStats,
    pub memory: MemorySnapshot,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    deferred: AtomicU64,
    upscales: AtomicU64,
    disk_hits: AtomicU64,
    published: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// Frame budget
// ============================================================================

#[derive(Debug, Default)]
struct FrameBudget {
    spent_texels: u64,
    claims: u32,
}

impl FrameBudget {
    /// The first claim of a frame always passes
    fn admit(&mut self, texels: u64, limit: u64) -> bool {
        if self.claims > 0 && self.spent_texels.saturating_add(texels) > limit {
            return false;
        }
        self.claims += 1;
        self.spent_texels = self.spent_texels.saturating_add(texels);
        true
    }

    /// Return the charge of a claim that found someone else's work
    fn refund(&mut self, texels: u64) {
        self.claims = self.claims.saturating_sub(1);
        self.spent_texels = self.spent_texels.saturating_sub(texels);
    }

    fn started_work(&self) -> bool {
        self.claims > 0
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Everything a computation needs, cloneable into a worker job
#[derive(Clone)]
struct Producer {
    upscaler: Upscaler,
    cache: Arc<CacheManager>,
    timer: Arc<TexelTimer>,
    counters: Arc<Counters>,
}

impl Producer {
    /// Persisted result if present, otherwise a fresh upscale that is then
    /// persisted. Unnamed sources never touch the disk cache since their
    /// fingerprints do not survive the process.
    fn produce(
        &self,
        source: &SourceImage,
        key: TextureKey,
        bounds: Bounds,
        tiling: Vec2B,
        scale: u32,
    ) -> Result<CacheEntry, ResampleError> {
        let persistent = source.name().is_some();
        if persistent {
            if let Some(result) = self.cache.fetch_from_disk(key.fingerprint) {
                bump(&self.counters.disk_hits);
                return Ok(Arc::new(result));
            }
        }

        let started = Instant::now();
        let upscaled = retry_on_oom(
            || self.upscaler.upscale(source, bounds, tiling, scale),
            || self.cache.compact(),
        )?;
        self.timer.record(bounds.extent.area(), started.elapsed());
        bump(&self.counters.upscales);

        if persistent {
            self.cache.save_to_disk(key.fingerprint, &upscaled.result);
        }
        Ok(Arc::new(upscaled.result))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Front door of the resampler
pub struct Scheduler {
    config: Arc<ResampleConfig>,
    producer: Producer,
    pool: Option<WorkerPool>,
    publish_tx: Sender<PublishJob>,
    publish_rx: Receiver<PublishJob>,
    budget: Mutex<FrameBudget>,
    frame: AtomicU64,
    digest: u64,
}

impl Scheduler {
    /// Build a scheduler with its own cache and memory accounting
    pub fn new(config: ResampleConfig) -> Result<Self, ThreadError> {
        let memory = Arc::new(MemoryAccounting::new());
        let cache = Arc::new(CacheManager::new(&config, memory));
        Self::with_cache(Arc::new(config), cache)
    }

    /// Build a scheduler around an existing cache
    pub fn with_cache(config: Arc<ResampleConfig>, cache: Arc<CacheManager>) -> Result<Self, ThreadError> {
        let pool = if config.async_enabled {
            Some(WorkerPool::new("resample", config.effective_worker_threads())?)
        } else {
            None
        };
        let (publish_tx, publish_rx) = channel::bounded(config.publish_queue_capacity.max(1));
        let producer = Producer {
            upscaler: Upscaler::new(Arc::clone(&config)),
            cache,
            timer: Arc::new(TexelTimer::new()),
            counters: Arc::new(Counters::default()),
        };
        let frame = producer.cache.frame();

        Ok(Self {
            digest: config.digest(),
            config,
            producer,
            pool,
            publish_tx,
            publish_rx,
            budget: Mutex::new(FrameBudget::default()),
            frame: AtomicU64::new(frame),
        })
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.producer.cache
    }

    pub fn memory(&self) -> &Arc<MemoryAccounting> {
        self.producer.cache.memory()
    }

    pub fn timer(&self) -> &TexelTimer {
        &self.producer.timer
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Cache key of `region` at an already effective `scale`
    pub fn key_for(&self, region: &SourceRegion, scale: u32) -> TextureKey {
        let source = &region.source;
        let content_hash = self
            .config
            .hash_content
            .then(|| source.region_hash(region.bounds));
        let fingerprint = Fingerprint::compute(&FingerprintInputs {
            source_id: source.id(),
            name: source.name(),
            image_extent: source.extent(),
            region: region.bounds,
            scale,
            tiling: region.tiling,
            config_digest: self.digest,
            content_hash,
        });
        TextureKey {
            source: source.id(),
            fingerprint,
        }
    }

    /// Resolve a draw request
    ///
    /// Precondition violations are returned as errors. Everything else that
    /// keeps a texture from being available right now (budget, background
    /// work, failures) is [`Lookup::NotReady`]. With `sync`, a miss is
    /// computed on the calling thread and an in-flight computation is waited
    /// for.
    pub fn request(&self, region: &SourceRegion, requested_scale: u32, sync: bool) -> Result<Lookup, ResampleError> {
        region.validate()?;
        let scale = self.producer.upscaler.effective_scale(region.bounds.extent, requested_scale)?;
        bump(&self.producer.counters.requests);

        let cache = &self.producer.cache;
        cache.check_duplicates(&region.source);
        let key = self.key_for(region, scale);
        let sync = sync || self.pool.is_none();

        if let Some(existing) = cache.lookup(key) {
            if let Some(texture) = existing.texture() {
                return Ok(Lookup::Ready(texture));
            }
        }
        if let Some(existing) = cache.peek(key).filter(|t| !t.is_disposed()) {
            if !existing.is_ready() {
                return Ok(self.in_flight(&existing, sync));
            }
        }

        let texels = region.bounds.extent.area();
        if !self.budget.lock().admit(texels, self.config.budget_per_frame_texels) {
            bump(&self.producer.counters.deferred);
            log::trace!(
                "Deferred {} region {} ({} texels, ~{:?})",
                region.source.name().unwrap_or("<unnamed>"),
                region.bounds,
                texels,
                self.producer.timer.estimate(texels)
            );
            return Ok(Lookup::NotReady);
        }

        match cache.claim(&region.source, key, region.bounds, scale) {
            Claim::Ready(existing) => {
                self.budget.lock().refund(texels);
                Ok(existing.texture().map_or(Lookup::NotReady, Lookup::Ready))
            }
            Claim::InFlight(existing) => {
                self.budget.lock().refund(texels);
                Ok(self.in_flight(&existing, sync))
            }
            Claim::Claimed(texture) if sync => Ok(self.compute_inline(region, key, scale, &texture)),
            Claim::Claimed(texture) => Ok(self.spawn(region, key, scale, texture)),
        }
    }

    fn in_flight(&self, texture: &Arc<ScaledTexture>, sync: bool) -> Lookup {
        if !sync {
            return Lookup::NotReady;
        }
        loop {
            if let Some(ready) = texture.wait(Some(WAIT_SLICE)) {
                return Lookup::Ready(ready);
            }
            if texture.is_disposed() {
                return Lookup::NotReady;
            }
            // the computation may be parked in the publish queue; publish up
            // to and including it, nothing after
            while !texture.is_ready() && !texture.is_disposed() && self.drain(Some(1)) == 1 {}
        }
    }

    fn compute_inline(&self, region: &SourceRegion, key: TextureKey, scale: u32, texture: &Arc<ScaledTexture>) -> Lookup {
        let result = self
            .producer
            .produce(&region.source, key, region.bounds, region.tiling, scale);
        self.finish(texture, result)
            .map_or(Lookup::NotReady, Lookup::Ready)
    }

    fn spawn(&self, region: &SourceRegion, key: TextureKey, scale: u32, texture: Arc<ScaledTexture>) -> Lookup {
        let Some(pool) = &self.pool else {
            return self.compute_inline(region, key, scale, &texture);
        };

        let producer = self.producer.clone();
        let tx = self.publish_tx.clone();
        let source = Arc::clone(&region.source);
        let (bounds, tiling) = (region.bounds, region.tiling);
        let job_texture = Arc::clone(&texture);
        let queued = pool.execute(move || {
            let result = producer.produce(&source, key, bounds, tiling, scale);
            let job = PublishJob {
                fingerprint: key.fingerprint,
                texture: job_texture,
                result,
            };
            if let Err(rejected) = tx.send(job) {
                producer.cache.abandon(&rejected.0.texture);
            }
        });

        if let Err(err) = queued {
            log::warn!("Could not queue upscale: {}", err);
            self.producer.cache.abandon(&texture);
        } else {
            log::debug!(
                "Queued {} region {} x{} (~{:?})",
                texture.name().unwrap_or("<unnamed>"),
                texture.region(),
                scale,
                self.producer.timer.estimate(region.bounds.extent.area())
            );
        }
        Lookup::NotReady
    }

    fn finish(&self, texture: &Arc<ScaledTexture>, result: Result<CacheEntry, ResampleError>) -> Option<Arc<ManagedTexture>> {
        let counters = &self.producer.counters;
        match result {
            Ok(entry) => match self.producer.cache.publish(texture, entry) {
                Some(published) => {
                    bump(&counters.published);
                    Some(published)
                }
                None => {
                    bump(&counters.discarded);
                    None
                }
            },
            Err(err) => {
                log::warn!(
                    "Upscale of {} region {} abandoned: {}",
                    texture.name().unwrap_or("<unnamed>"),
                    texture.region(),
                    err
                );
                bump(&counters.failed);
                self.producer.cache.abandon(texture);
                None
            }
        }
    }

    /// Publish up to `max` finished background jobs (all with `None`)
    ///
    /// Returns the number of jobs processed.
    pub fn drain(&self, max: Option<usize>) -> usize {
        let mut processed = 0;
        while max.map_or(true, |max| processed < max) {
            let Ok(job) = self.publish_rx.try_recv() else {
                break;
            };
            self.finish(&job.texture, job.result);
            processed += 1;
        }
        processed
    }

    /// Per-frame housekeeping
    ///
    /// Evicts down to the memory budget, drains finished jobs, resets the
    /// texel budget and advances the frame counter.
    pub fn end_frame(&self) -> u64 {
        let cache = &self.producer.cache;
        if let Some(excess) = cache
            .memory()
            .excess_over(self.config.max_resident_bytes, self.config.eviction_hysteresis)
        {
            cache.evict(excess);
        }

        let started_work = {
            let mut budget = self.budget.lock();
            let started = budget.started_work();
            *budget = FrameBudget::default();
            started
        };
        if self.config.can_fetch_and_load_same_frame || !started_work {
            let limit = usize::try_from(self.config.max_loads_per_frame).ok();
            self.drain(limit);
        }

        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        cache.set_frame(frame);
        frame
    }

    /// Host notification that a source image is gone
    pub fn dispose_source(&self, source: SourceId) -> usize {
        self.producer.cache.dispose_source(source)
    }

    /// Jobs queued, running, or waiting to be published
    pub fn pending_jobs(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::outstanding) + self.publish_rx.len()
    }

    /// Block until no background job is queued or running
    ///
    /// Finished jobs stay in the publish queue. Returns `false` on timeout.
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        let Some(pool) = &self.pool else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while pool.outstanding() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.producer.counters;
        SchedulerStats {
            frame: self.frame(),
            requests: c.requests.load(Ordering::Relaxed),
            deferred: c.deferred.load(Ordering::Relaxed),
            upscales: c.upscales.load(Ordering::Relaxed),
            disk_hits: c.disk_hits.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            pending_jobs: self.pending_jobs(),
            nanos_per_texel: self.producer.timer.nanos_per_texel(),
            cache: self.producer.cache.stats(),
            memory: self.producer.cache.memory().snapshot(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let Some(mut pool) = self.pool.take() else {
            return;
        };
        // workers may be blocked on a full publish queue
        while pool.outstanding() > 0 {
            match self.publish_rx.recv_timeout(WAIT_SLICE) {
                Ok(job) => self.producer.cache.abandon(&job.texture),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let _ = pool.shutdown();
        while let Ok(job) = self.publish_rx.try_recv() {
            self.producer.cache.abandon(&job.texture);
        }
    }
}
