//! Global recency list of published textures.

use crate::texture::{ScaledTexture, TextureKey};
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Most-recently-used ordering over every published texture
///
/// Entries are weak: the owning partition holds the strong reference, so a
/// texture that has been dropped elsewhere simply falls out of the list.
pub struct RecencyList {
    entries: Mutex<LruCache<TextureKey, Weak<ScaledTexture>>>,
}

impl RecencyList {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Insert or move a texture to the most-recent end
    pub fn touch(&self, texture: &Arc<ScaledTexture>) {
        self.entries.lock().put(texture.key(), Arc::downgrade(texture));
    }

    /// Unregister `texture`; a different record under the same key is kept
    pub fn remove(&self, texture: &Arc<ScaledTexture>) -> bool {
        let key = texture.key();
        let mut entries = self.entries.lock();
        let same = entries
            .peek(&key)
            .is_some_and(|weak| Weak::as_ptr(weak) == Arc::as_ptr(texture));
        if same {
            entries.pop(&key);
        }
        same
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ready textures from least recently used, until `target_bytes` is covered
    ///
    /// Textures that are not ready are skipped; dead weak entries are pruned.
    pub fn eviction_candidates(&self, target_bytes: u64) -> Vec<Arc<ScaledTexture>> {
        self.collect_from_tail(|_, covered| covered >= target_bytes, |_| true)
    }

    /// Ready textures last used before `frame`, least recent first
    pub fn stale_since(&self, frame: u64) -> Vec<Arc<ScaledTexture>> {
        self.collect_from_tail(|_, _| false, |t| t.last_access_frame() < frame)
    }

    fn collect_from_tail(
        &self,
        done: impl Fn(usize, u64) -> bool,
        accept: impl Fn(&ScaledTexture) -> bool,
    ) -> Vec<Arc<ScaledTexture>> {
        let mut entries = self.entries.lock();
        let mut picked = Vec::new();
        let mut dead = Vec::new();
        let mut covered = 0u64;

        for (key, weak) in entries.iter().rev() {
            if done(picked.len(), covered) {
                break;
            }
            match weak.upgrade() {
                Some(texture) if texture.is_disposed() => dead.push(*key),
                Some(texture) => {
                    if texture.is_ready() && accept(&texture) {
                        covered += texture.memory_size();
                        picked.push(texture);
                    }
                }
                None => dead.push(*key),
            }
        }
        for key in dead {
            entries.pop(&key);
        }
        picked
    }
}

impl Default for RecencyList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::ScaleResult;
    use crate::cache::fingerprint::Fingerprint;
    use crate::geometry::{Bounds, Extent, Vec2B, Vec2I};
    use crate::resample::PixelFormat;
    use crate::source::SourceId;
    use crate::texture::ManagedTexture;

    fn ready(id: u64, bytes: usize) -> Arc<ScaledTexture> {
        let key = TextureKey {
            source: SourceId(1),
            fingerprint: Fingerprint(id),
        };
        let tex = Arc::new(ScaledTexture::pending(key, None, Bounds::new(0, 0, 1, 1), 2, 0));
        let entry = Arc::new(ScaleResult {
            data: vec![0; bytes],
            dimensions: Extent::new(1, (bytes / 4) as u32),
            format: PixelFormat::Rgba8,
            wrapped: Vec2B::FALSE,
            padding: Vec2I::ZERO,
            block_padding: Vec2I::ZERO,
        });
        assert!(tex.begin_publish());
        tex.finish_publish(Arc::new(ManagedTexture::new(entry, 2))).unwrap();
        tex
    }

    #[test]
    fn test_candidates_in_lru_order() {
        let list = RecencyList::new();
        let a = ready(1, 100);
        let b = ready(2, 100);
        let c = ready(3, 100);
        list.touch(&a);
        list.touch(&b);
        list.touch(&c);
        list.touch(&a);

        let picked = list.eviction_candidates(150);
        let keys: Vec<u64> = picked.iter().map(|t| t.key().fingerprint.0).collect();
        assert_eq!(keys, vec![2, 3]);
    }

    #[test]
    fn test_candidates_skip_pending_and_prune_dead() {
        let list = RecencyList::new();
        let a = ready(1, 100);
        let pending = Arc::new(ScaledTexture::pending(
            TextureKey {
                source: SourceId(1),
                fingerprint: Fingerprint(9),
            },
            None,
            Bounds::new(0, 0, 1, 1),
            2,
            0,
        ));
        list.touch(&pending);
        list.touch(&a);
        {
            let gone = ready(5, 100);
            list.touch(&gone);
        }
        assert_eq!(list.len(), 3);

        let picked = list.eviction_candidates(u64::MAX);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].key().fingerprint.0, 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove_ignores_replaced_record() {
        let list = RecencyList::new();
        let old = ready(1, 10);
        let new = ready(1, 10);
        list.touch(&old);
        list.touch(&new);
        assert_eq!(list.len(), 1);
        assert!(!list.remove(&old));
        assert!(list.entries.lock().contains(&new.key()));
    }

    #[test]
    fn test_stale_since() {
        let list = RecencyList::new();
        let old = ready(1, 10);
        let fresh = ready(2, 10);
        fresh.touch(7);
        list.touch(&old);
        list.touch(&fresh);
        let stale = list.stale_since(7);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key().fingerprint.0, 1);
    }

    #[test]
    fn test_remove() {
        let list = RecencyList::new();
        let a = ready(1, 10);
        list.touch(&a);
        assert!(list.entries.lock().contains(&a.key()));
        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert!(list.is_empty());
    }
}
