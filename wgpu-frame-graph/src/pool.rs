use crate::Result;
use crate::backend::Backend;
use crate::resource::{ResourceState, TextureDesc, TextureUsageFlags};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct PoolSlot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub desc: TextureDesc,
    pub usage: TextureUsageFlags,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle_frames: u64,
    pub max_free_entries: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_frames: 120,
            max_free_entries: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: u64,
    pub reuses: u64,
    pub evictions: u64,
}

struct PoolEntry<T> {
    key: PoolKey,
    texture: T,
    state: ResourceState,
    in_use: bool,
    last_released: u64,
}

pub struct TransientPool<B: Backend> {
    entries: SlotMap<PoolSlot, PoolEntry<B::Texture>>,
    config: PoolConfig,
    frame: u64,
    stats: PoolStats,
}

impl<B: Backend> TransientPool<B> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            entries: SlotMap::with_key(),
            config,
            frame: 0,
            stats: PoolStats::default(),
        }
    }

    /// Binds a free entry matching `key`, creating one on a miss.
    ///
    /// Returns the slot and the state the texture was last left in.
    pub fn acquire(
        &mut self,
        backend: &B,
        label: &str,
        key: PoolKey,
    ) -> Result<(PoolSlot, ResourceState)> {
        if let Some((slot, entry)) = self
            .entries
            .iter_mut()
            .find(|(_, entry)| !entry.in_use && entry.key == key)
        {
            entry.in_use = true;
            self.stats.reuses += 1;
            log::debug!(
                "Reusing pooled texture for '{}' ({}x{} {:?}, state {:?})",
                label,
                key.desc.width,
                key.desc.height,
                key.desc.format,
                entry.state
            );
            return Ok((slot, entry.state));
        }

        let texture = backend.create_texture(label, &key.desc, key.usage)?;
        let slot = self.entries.insert(PoolEntry {
            key,
            texture,
            state: ResourceState::Undefined,
            in_use: true,
            last_released: self.frame,
        });
        self.stats.allocations += 1;
        log::debug!(
            "Allocated pooled texture for '{}' ({}x{} {:?} {:?})",
            label,
            key.desc.width,
            key.desc.height,
            key.desc.format,
            key.usage
        );

        Ok((slot, ResourceState::Undefined))
    }

    /// Frees the entry for reuse. `final_state` is what the next `acquire` of
    /// this slot will report.
    pub fn release(&mut self, slot: PoolSlot, final_state: ResourceState) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.in_use = false;
            entry.state = final_state;
            entry.last_released = self.frame;
        }
    }

    pub fn texture(&self, slot: PoolSlot) -> Option<&B::Texture> {
        self.entries.get(slot).map(|entry| &entry.texture)
    }

    pub fn state(&self, slot: PoolSlot) -> Option<ResourceState> {
        self.entries.get(slot).map(|entry| entry.state)
    }

    pub fn end_frame(&mut self) -> usize {
        self.frame += 1;

        let before = self.entries.len();
        let frame = self.frame;
        let max_idle_frames = self.config.max_idle_frames;
        self.entries.retain(|_, entry| {
            entry.in_use || frame.saturating_sub(entry.last_released) <= max_idle_frames
        });

        let mut free: Vec<(PoolSlot, u64)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.in_use)
            .map(|(slot, entry)| (slot, entry.last_released))
            .collect();

        if free.len() > self.config.max_free_entries {
            free.sort_by_key(|&(_, last_released)| last_released);
            let excess = free.len() - self.config.max_free_entries;
            for &(slot, _) in free.iter().take(excess) {
                self.entries.remove(slot);
            }
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            self.stats.evictions += evicted as u64;
            log::debug!("Evicted {} idle pooled textures", evicted);
        }
        evicted
    }

    pub fn trim(&mut self) -> usize {
        let before = self.entries.len();
        // In-use entries are still bound to a running graph.
        self.entries.retain(|_, entry| entry.in_use);
        let evicted = before - self.entries.len();
        self.stats.evictions += evicted as u64;
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_use_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.in_use).count()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<B: Backend> Default for TransientPool<B> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingBackend;
    use wgpu::TextureFormat;

    fn key(width: u32, usage: TextureUsageFlags) -> PoolKey {
        PoolKey {
            desc: TextureDesc::new(width, width, TextureFormat::Rgba8Unorm),
            usage,
        }
    }

    #[test]
    fn released_entries_are_reused_with_their_state() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::default();
        let key = key(512, TextureUsageFlags::RENDER_TARGET);

        let (slot, state) = pool.acquire(&backend, "a", key).unwrap();
        assert_eq!(state, ResourceState::Undefined);
        pool.release(slot, ResourceState::ShaderResource);

        let (reused, state) = pool.acquire(&backend, "b", key).unwrap();
        assert_eq!(reused, slot);
        assert_eq!(state, ResourceState::ShaderResource);
        assert_eq!(backend.created.get(), 1);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn in_use_and_mismatched_entries_are_not_shared() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::default();

        let (first, _) = pool
            .acquire(&backend, "a", key(512, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        let (second, _) = pool
            .acquire(&backend, "b", key(512, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        assert_ne!(first, second);

        pool.release(first, ResourceState::RenderTarget);
        let (third, _) = pool
            .acquire(
                &backend,
                "c",
                key(
                    512,
                    TextureUsageFlags::RENDER_TARGET | TextureUsageFlags::UNORDERED_ACCESS,
                ),
            )
            .unwrap();
        assert_ne!(third, first);
        assert_eq!(backend.created.get(), 3);
        assert_eq!(pool.in_use_count(), 2);
    }

    #[test]
    fn idle_entries_are_evicted() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::new(PoolConfig {
            max_idle_frames: 2,
            max_free_entries: 16,
        });

        let (slot, _) = pool
            .acquire(&backend, "a", key(256, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.release(slot, ResourceState::RenderTarget);

        assert_eq!(pool.end_frame(), 0);
        assert_eq!(pool.end_frame(), 0);
        assert_eq!(pool.end_frame(), 1);
        assert!(pool.is_empty());
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn in_use_entries_survive_eviction() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::new(PoolConfig {
            max_idle_frames: 0,
            max_free_entries: 0,
        });

        pool.acquire(&backend, "a", key(256, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.end_frame();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.trim(), 0);
    }

    #[test]
    fn free_entries_are_capped_oldest_first() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::new(PoolConfig {
            max_idle_frames: 100,
            max_free_entries: 1,
        });

        let (old, _) = pool
            .acquire(&backend, "old", key(128, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.release(old, ResourceState::RenderTarget);
        pool.end_frame();

        let (new, _) = pool
            .acquire(&backend, "new", key(64, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.release(new, ResourceState::RenderTarget);
        assert_eq!(pool.end_frame(), 1);

        assert!(pool.texture(old).is_none());
        assert!(pool.texture(new).is_some());
    }

    #[test]
    fn trim_drops_free_entries() {
        let backend = CountingBackend::default();
        let mut pool = TransientPool::<CountingBackend>::default();

        let (a, _) = pool
            .acquire(&backend, "a", key(128, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.acquire(&backend, "b", key(128, TextureUsageFlags::RENDER_TARGET))
            .unwrap();
        pool.release(a, ResourceState::RenderTarget);

        assert_eq!(pool.trim(), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.in_use_count(), 1);
    }
}
