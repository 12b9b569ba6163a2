//! Published textures and their lifecycle.
//!
//! A [`ScaledTexture`] is created `Pending` when a computation is claimed,
//! moves to `Publishing` while the frame thread creates its
//! [`ManagedTexture`], and becomes `Ready` once that texture is attached.
//! Any state may move to `Disposed`, which is terminal. A texture is never
//! observable as ready without a live underlying texture.

use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::Fingerprint;
use crate::geometry::{Bounds, Extent, Vec2B, Vec2I};
use crate::resample::PixelFormat;
use crate::source::SourceId;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Key of a cached texture: the owning source and the request fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey {
    pub source: SourceId,
    pub fingerprint: Fingerprint,
}

/// Texture object handed to the host
///
/// Owns the pixel data of one [`CacheEntry`]. Once disposed it must no
/// longer be drawn.
#[derive(Debug)]
pub struct ManagedTexture {
    id: TextureId,
    entry: CacheEntry,
    scale: u32,
    disposed: AtomicBool,
}

impl ManagedTexture {
    pub fn new(entry: CacheEntry, scale: u32) -> Self {
        Self {
            id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
            entry,
            scale,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn format(&self) -> PixelFormat {
        self.entry.format
    }

    pub fn dimensions(&self) -> Extent {
        self.entry.dimensions
    }

    pub fn logical_extent(&self) -> Extent {
        self.entry.logical_extent()
    }

    pub fn padding(&self) -> Vec2I {
        self.entry.padding
    }

    pub fn wrapped(&self) -> Vec2B {
        self.entry.wrapped
    }

    pub fn size_bytes(&self) -> u64 {
        self.entry.byte_size() as u64
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark as released; returns `true` only for the first call
    fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextureState {
    Pending = 0,
    Publishing = 1,
    Ready = 2,
    Disposed = 3,
}

impl TextureState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TextureState::Pending,
            1 => TextureState::Publishing,
            2 => TextureState::Ready,
            _ => TextureState::Disposed,
        }
    }

    fn is_settled(self) -> bool {
        matches!(self, TextureState::Ready | TextureState::Disposed)
    }
}

/// Cache-side record of one resampled region
#[derive(Debug)]
pub struct ScaledTexture {
    key: TextureKey,
    name: Option<String>,
    region: Bounds,
    scale: u32,
    state: AtomicU8,
    texture: Mutex<Option<Arc<ManagedTexture>>>,
    last_access_frame: AtomicU64,
    settled: Mutex<bool>,
    settled_cond: Condvar,
}

impl ScaledTexture {
    /// A new record in the `Pending` state
    pub fn pending(key: TextureKey, name: Option<String>, region: Bounds, scale: u32, frame: u64) -> Self {
        Self {
            key,
            name,
            region,
            scale,
            state: AtomicU8::new(TextureState::Pending as u8),
            texture: Mutex::new(None),
            last_access_frame: AtomicU64::new(frame),
            settled: Mutex::new(false),
            settled_cond: Condvar::new(),
        }
    }

    pub fn key(&self) -> TextureKey {
        self.key
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn region(&self) -> Bounds {
        self.region
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn state(&self) -> TextureState {
        TextureState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ready with a live underlying texture
    pub fn is_ready(&self) -> bool {
        self.texture().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == TextureState::Disposed
    }

    /// The underlying texture, only while ready
    pub fn texture(&self) -> Option<Arc<ManagedTexture>> {
        if self.state() != TextureState::Ready {
            return None;
        }
        let guard = self.texture.lock();
        guard.as_ref().filter(|t| !t.is_disposed()).cloned()
    }

    /// Byte size of the attached texture
    pub fn memory_size(&self) -> u64 {
        self.texture.lock().as_ref().map_or(0, |t| t.size_bytes())
    }

    pub fn touch(&self, frame: u64) {
        self.last_access_frame.fetch_max(frame, Ordering::AcqRel);
    }

    pub fn last_access_frame(&self) -> u64 {
        self.last_access_frame.load(Ordering::Acquire)
    }

    fn transition(&self, from: TextureState, to: TextureState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the right to publish (`Pending` to `Publishing`)
    pub fn begin_publish(&self) -> bool {
        self.transition(TextureState::Pending, TextureState::Publishing)
    }

    /// Attach the created texture and become `Ready`
    ///
    /// Fails (returning the texture) if the record was disposed meanwhile.
    pub fn finish_publish(&self, texture: Arc<ManagedTexture>) -> Result<(), Arc<ManagedTexture>> {
        let mut slot = self.texture.lock();
        if !self.transition(TextureState::Publishing, TextureState::Ready) {
            return Err(texture);
        }
        *slot = Some(texture);
        drop(slot);
        self.signal_settled();
        Ok(())
    }

    /// Release the underlying texture; returns the bytes released by this call
    ///
    /// Idempotent: later calls release nothing.
    pub fn dispose(&self) -> u64 {
        let previous = TextureState::from_u8(self.state.swap(TextureState::Disposed as u8, Ordering::AcqRel));
        let released = {
            let mut slot = self.texture.lock();
            match slot.take() {
                Some(texture) if texture.dispose() => texture.size_bytes(),
                _ => 0,
            }
        };
        if previous != TextureState::Disposed {
            self.signal_settled();
        }
        released
    }

    fn signal_settled(&self) {
        let mut settled = self.settled.lock();
        *settled = true;
        self.settled_cond.notify_all();
    }

    /// Block until the record is `Ready` or `Disposed`
    ///
    /// Returns the texture when it became ready.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<Arc<ManagedTexture>> {
        {
            let mut settled = self.settled.lock();
            while !*settled && !self.state().is_settled() {
                match timeout {
                    Some(limit) => {
                        if self.settled_cond.wait_for(&mut settled, limit).timed_out() {
                            break;
                        }
                    }
                    None => self.settled_cond.wait(&mut settled),
                }
            }
        }
        self.texture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::ScaleResult;
    use std::thread;

    fn entry(bytes: usize) -> CacheEntry {
        Arc::new(ScaleResult {
            data: vec![0; bytes],
            dimensions: Extent::new(1, (bytes / 4) as u32),
            format: PixelFormat::Rgba8,
            wrapped: Vec2B::FALSE,
            padding: Vec2I::ZERO,
            block_padding: Vec2I::ZERO,
        })
    }

    fn record() -> ScaledTexture {
        let key = TextureKey {
            source: SourceId(1),
            fingerprint: Fingerprint(2),
        };
        ScaledTexture::pending(key, Some("a.png".into()), Bounds::new(0, 0, 4, 4), 2, 0)
    }

    #[test]
    fn test_publish_lifecycle() {
        let rec = record();
        assert_eq!(rec.state(), TextureState::Pending);
        assert!(rec.texture().is_none());

        assert!(rec.begin_publish());
        assert!(!rec.begin_publish());
        assert!(rec.texture().is_none());

        rec.finish_publish(Arc::new(ManagedTexture::new(entry(64), 2))).unwrap();
        assert!(rec.is_ready());
        assert_eq!(rec.memory_size(), 64);
        let tex = rec.texture().unwrap();
        assert!(!tex.is_disposed());

        assert_eq!(rec.dispose(), 64);
        assert!(rec.is_disposed());
        assert!(tex.is_disposed());
        assert!(rec.texture().is_none());
        assert_eq!(rec.dispose(), 0);
    }

    #[test]
    fn test_publish_after_dispose_fails() {
        let rec = record();
        assert!(rec.begin_publish());
        rec.dispose();
        let tex = Arc::new(ManagedTexture::new(entry(16), 2));
        assert!(rec.finish_publish(tex).is_err());
        assert!(rec.texture().is_none());
        assert!(!rec.begin_publish());
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let rec = Arc::new(record());
        let waiter = {
            let rec = Arc::clone(&rec);
            thread::spawn(move || rec.wait(None).map(|t| t.size_bytes()))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(rec.begin_publish());
        rec.finish_publish(Arc::new(ManagedTexture::new(entry(32), 2))).unwrap();
        assert_eq!(waiter.join().unwrap(), Some(32));
    }

    #[test]
    fn test_wait_wakes_on_dispose() {
        let rec = Arc::new(record());
        let waiter = {
            let rec = Arc::clone(&rec);
            thread::spawn(move || rec.wait(None).is_none())
        };
        thread::sleep(Duration::from_millis(20));
        rec.dispose();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout() {
        let rec = record();
        assert!(rec.wait(Some(Duration::from_millis(5))).is_none());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let rec = record();
        rec.touch(5);
        rec.touch(3);
        assert_eq!(rec.last_access_frame(), 5);
    }
}
