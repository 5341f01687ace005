//! GPU texture pool for texture reuse across ticks.
//!
//! Avoids allocating/deallocating textures per tick by keeping free textures
//! keyed by their descriptor. Textures read or written by a submission are
//! retired against it and only become reusable once it completes, so the next
//! tick never writes backing memory the previous one may still be using.

use crate::binding::{ResourceBinding, SubmissionId};
use crate::error::BindingError;
use crate::texture::{TextureDesc, TextureHandle};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

struct Retired {
    submission: SubmissionId,
    handle: TextureHandle,
    desc: TextureDesc,
}

/// Pool of reusable textures with a memory budget.
pub struct TexturePool {
    /// Available (free) textures, keyed by descriptor.
    free: HashMap<TextureDesc, Vec<TextureHandle>>,
    /// Textures waiting for their submission to complete, oldest first.
    retired: VecDeque<Retired>,
    /// Textures currently handed out.
    live: HashMap<TextureHandle, TextureDesc>,
    free_memory: usize,
    retired_memory: usize,
    live_memory: usize,
    /// Maximum memory budget for the pool.
    max_memory: usize,
}

impl TexturePool {
    /// Create a new texture pool with the given memory budget.
    pub fn new(max_memory: usize) -> Self {
        Self {
            free: HashMap::new(),
            retired: VecDeque::new(),
            live: HashMap::new(),
            free_memory: 0,
            retired_memory: 0,
            live_memory: 0,
            max_memory,
        }
    }

    /// Acquire a texture from the pool or allocate a new one.
    ///
    /// When the budget is exhausted, free textures of other shapes are
    /// destroyed first, then the oldest in-flight submission is waited on.
    pub fn acquire(
        &mut self,
        binding: &mut dyn ResourceBinding,
        desc: TextureDesc,
    ) -> Result<TextureHandle, BindingError> {
        self.reclaim(binding);

        if let Some(handle) = self.take_free(&desc) {
            return Ok(handle);
        }

        let size = desc.memory_size();
        while self.memory_usage() + size > self.max_memory {
            if self.evict_one_free(binding) {
                continue;
            }
            let Some(oldest) = self.retired.front().map(|r| r.submission) else {
                warn!(
                    requested = size,
                    in_use = self.live_memory,
                    budget = self.max_memory,
                    "Texture budget exceeded by live textures, allocating anyway"
                );
                break;
            };
            debug!(submission = oldest.0, "Texture pool exhausted, waiting for in-flight work");
            binding.wait(oldest)?;
            self.reclaim(binding);
            if let Some(handle) = self.take_free(&desc) {
                return Ok(handle);
            }
        }

        let handle = binding.allocate_texture(&desc)?;
        self.live.insert(handle, desc);
        self.live_memory += size;
        Ok(handle)
    }

    /// Track a texture allocated outside the pool (e.g. by a render delegate).
    pub fn adopt(&mut self, handle: TextureHandle, desc: TextureDesc) {
        if self.live.insert(handle, desc).is_none() {
            self.live_memory += desc.memory_size();
        }
    }

    /// Return a texture that no submitted work references.
    pub fn release(&mut self, binding: &mut dyn ResourceBinding, handle: TextureHandle) {
        let Some(desc) = self.take_live(binding, handle) else {
            return;
        };
        self.push_free(binding, handle, desc);
    }

    /// Return a texture that `submission` may still read or write.
    pub fn retire(
        &mut self,
        binding: &mut dyn ResourceBinding,
        handle: TextureHandle,
        submission: SubmissionId,
    ) {
        let Some(desc) = self.take_live(binding, handle) else {
            return;
        };
        self.retired_memory += desc.memory_size();
        self.retired.push_back(Retired {
            submission,
            handle,
            desc,
        });
    }

    /// Move retired textures whose submission completed into the free lists.
    pub fn reclaim(&mut self, binding: &mut dyn ResourceBinding) {
        binding.poll();
        while let Some(front) = self.retired.front() {
            if !binding.is_complete(front.submission) {
                break;
            }
            if let Some(retired) = self.retired.pop_front() {
                self.retired_memory -= retired.desc.memory_size();
                self.push_free(binding, retired.handle, retired.desc);
            }
        }
    }

    /// Total memory held: live, in flight and free.
    pub fn memory_usage(&self) -> usize {
        self.live_memory + self.retired_memory + self.free_memory
    }

    /// Number of free textures in the pool.
    pub fn texture_count(&self) -> usize {
        self.free.values().map(|v| v.len()).sum()
    }

    /// Number of textures waiting on in-flight submissions.
    pub fn in_flight_count(&self) -> usize {
        self.retired.len()
    }

    /// Number of textures currently handed out.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Destroy every free and retired texture, waiting for in-flight work.
    pub fn clear(&mut self, binding: &mut dyn ResourceBinding) {
        while let Some(retired) = self.retired.pop_front() {
            if let Err(e) = binding.wait(retired.submission) {
                warn!(error = %e, "Waiting on retired texture failed during pool clear");
            }
            binding.release_texture(retired.handle);
        }
        for (_, handles) in self.free.drain() {
            for handle in handles {
                binding.release_texture(handle);
            }
        }
        self.retired_memory = 0;
        self.free_memory = 0;
    }

    fn take_free(&mut self, desc: &TextureDesc) -> Option<TextureHandle> {
        let handles = self.free.get_mut(desc)?;
        let handle = handles.pop()?;
        if handles.is_empty() {
            self.free.remove(desc);
        }
        let size = desc.memory_size();
        self.free_memory -= size;
        self.live_memory += size;
        self.live.insert(handle, *desc);
        Some(handle)
    }

    fn take_live(
        &mut self,
        binding: &dyn ResourceBinding,
        handle: TextureHandle,
    ) -> Option<TextureDesc> {
        match self.live.remove(&handle) {
            Some(desc) => {
                self.live_memory -= desc.memory_size();
                Some(desc)
            }
            None => binding.texture_desc(handle),
        }
    }

    fn push_free(&mut self, binding: &mut dyn ResourceBinding, handle: TextureHandle, desc: TextureDesc) {
        let mem = desc.memory_size();

        // Destroy instead of pooling if keeping it would exceed the budget.
        if self.memory_usage() + mem > self.max_memory {
            binding.release_texture(handle);
            return;
        }

        self.free_memory += mem;
        self.free.entry(desc).or_default().push(handle);
    }

    fn evict_one_free(&mut self, binding: &mut dyn ResourceBinding) -> bool {
        // Find the key with the most textures and remove one
        let key = self
            .free
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .max_by_key(|(_, v)| v.len())
            .map(|(k, _)| *k);

        let Some(key) = key else {
            return false;
        };
        if let Some(textures) = self.free.get_mut(&key) {
            if let Some(handle) = textures.pop() {
                self.free_memory -= key.memory_size();
                binding.release_texture(handle);
            }
            if textures.is_empty() {
                self.free.remove(&key);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBinding;
    use pixgraph_core::{PixelFormat, Resolution};

    fn desc(size: u32) -> TextureDesc {
        TextureDesc::render_target(Resolution::square(size), PixelFormat::Rgba8)
    }

    #[test]
    fn test_release_then_reuse() {
        let mut binding = CpuBinding::new();
        let mut pool = TexturePool::new(1 << 20);
        let a = pool.acquire(&mut binding, desc(8)).unwrap();
        pool.release(&mut binding, a);
        assert_eq!(pool.texture_count(), 1);
        let b = pool.acquire(&mut binding, desc(8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(binding.stats().allocations, 1);
    }

    #[test]
    fn test_retired_not_reused_until_complete() {
        let mut binding = CpuBinding::new().with_deferred_completion(true);
        let mut pool = TexturePool::new(1 << 20);
        let a = pool.acquire(&mut binding, desc(8)).unwrap();
        let cmd = binding.make_command_buffer().unwrap();
        let submission = binding.commit(cmd).unwrap();
        pool.retire(&mut binding, a, submission);

        let b = pool.acquire(&mut binding, desc(8)).unwrap();
        assert_ne!(a, b, "in-flight texture must not be handed out");
        assert_eq!(pool.in_flight_count(), 1);

        binding.wait(submission).unwrap();
        pool.release(&mut binding, b);
        let c = pool.acquire(&mut binding, desc(8)).unwrap();
        let d = pool.acquire(&mut binding, desc(8)).unwrap();
        assert!([c, d].contains(&a));
        assert_eq!(pool.in_flight_count(), 0);
    }

    #[test]
    fn test_exhausted_budget_waits_for_retired() {
        let mut binding = CpuBinding::new().with_deferred_completion(true);
        let one = desc(8).memory_size();
        let mut pool = TexturePool::new(one);
        let a = pool.acquire(&mut binding, desc(8)).unwrap();
        let cmd = binding.make_command_buffer().unwrap();
        let submission = binding.commit(cmd).unwrap();
        pool.retire(&mut binding, a, submission);

        let b = pool.acquire(&mut binding, desc(8)).unwrap();
        assert_eq!(a, b, "acquire waited for the in-flight submission");
        assert!(binding.is_complete(submission));
    }

    #[test]
    fn test_eviction_frees_other_shapes() {
        let mut binding = CpuBinding::new();
        let mut pool = TexturePool::new(desc(8).memory_size());
        let a = pool.acquire(&mut binding, desc(8)).unwrap();
        pool.release(&mut binding, a);
        let _b = pool.acquire(&mut binding, desc(4)).unwrap();
        assert_eq!(pool.texture_count(), 0);
        assert_eq!(binding.stats().releases, 1);
    }
}
