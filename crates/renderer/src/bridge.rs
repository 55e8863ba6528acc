//! Frame → GPU texture bridging.
//!
//! Conversion goes through a small texture arena: a fixed ring of reusable
//! slots, so steady-state operation allocates nothing. The bridge hands out
//! [`GpuImage`] handles instead of raw views; resolving a handle checks the
//! slot generation, so a handle that survived past its slot's recycling is
//! rejected instead of silently sampling a newer frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use capture::Frame;
use tracing::{debug, warn};

/// Number of arena slots. Two covers the in-flight frame plus the latched
/// one; the third absorbs a conversion racing a slow present.
pub(crate) const ARENA_SLOTS: usize = 3;

/// Handle to a converted frame living in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImage {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
    pub width: u32,
    pub height: u32,
    /// Capture sequence of the source frame, used by the latch ordering.
    pub sequence: u64,
}

/// Pure slot bookkeeping, split out so the recycling rules are testable
/// without a GPU device.
struct SlotTable {
    entries: Vec<SlotMeta>,
    cursor: usize,
    next_generation: u64,
}

#[derive(Clone, Copy, Default)]
struct SlotMeta {
    width: u32,
    height: u32,
    generation: u64,
}

struct Checkout {
    slot: usize,
    generation: u64,
    /// True when the slot's existing texture matches the new geometry.
    reuse: bool,
}

impl SlotTable {
    fn new(len: usize) -> Self {
        Self {
            entries: vec![SlotMeta::default(); len],
            cursor: 0,
            next_generation: 1,
        }
    }

    fn checkout(&mut self, width: u32, height: u32) -> Checkout {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.entries.len();
        let generation = self.next_generation;
        self.next_generation += 1;

        let entry = &mut self.entries[slot];
        let reuse = entry.generation != 0 && entry.width == width && entry.height == height;
        entry.width = width;
        entry.height = height;
        entry.generation = generation;
        Checkout {
            slot,
            generation,
            reuse,
        }
    }

    fn is_current(&self, slot: usize, generation: u64) -> bool {
        self.entries
            .get(slot)
            .is_some_and(|entry| entry.generation == generation)
    }
}

struct ArenaInner {
    table: SlotTable,
    textures: Vec<Option<ArenaSlot>>,
}

struct ArenaSlot {
    texture: wgpu::Texture,
    view: Arc<wgpu::TextureView>,
}

/// Fixed pool of camera textures shared between the conversion worker
/// (writer) and the render loop (reader).
pub struct TextureArena {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    inner: Mutex<ArenaInner>,
}

impl TextureArena {
    pub(crate) fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            inner: Mutex::new(ArenaInner {
                table: SlotTable::new(ARENA_SLOTS),
                textures: (0..ARENA_SLOTS).map(|_| None).collect(),
            }),
        }
    }

    /// Uploads a frame into the next slot, reusing its texture when the
    /// geometry is unchanged.
    fn upload(&self, frame: &Frame) -> GpuImage {
        let mut inner = self.inner.lock().expect("texture arena lock poisoned");
        let checkout = inner.table.checkout(frame.width, frame.height);

        if !checkout.reuse || inner.textures[checkout.slot].is_none() {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("camera frame"),
                size: wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Bgra8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = Arc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            debug!(
                slot = checkout.slot,
                width = frame.width,
                height = frame.height,
                "allocated arena texture"
            );
            inner.textures[checkout.slot] = Some(ArenaSlot { texture, view });
        }

        let slot = inner.textures[checkout.slot]
            .as_ref()
            .expect("arena slot populated above");
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );

        GpuImage {
            slot: checkout.slot,
            generation: checkout.generation,
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
        }
    }

    /// Resolves a handle to its texture view, or `None` when the slot has
    /// since been recycled for a newer frame.
    pub fn resolve(&self, image: &GpuImage) -> Option<Arc<wgpu::TextureView>> {
        let inner = self.inner.lock().expect("texture arena lock poisoned");
        if !inner.table.is_current(image.slot, image.generation) {
            return None;
        }
        inner.textures[image.slot]
            .as_ref()
            .map(|slot| slot.view.clone())
    }
}

/// Converts raw frames into arena-backed GPU images.
pub struct TextureBridge {
    pub(crate) arena: Arc<TextureArena>,
    pub(crate) device_lost: Arc<AtomicBool>,
}

impl TextureBridge {
    /// Converts one frame. Returns `None` on empty geometry, on a payload
    /// shorter than the frame's declared size, or once the GPU device has
    /// been reported lost; the caller counts consecutive failures.
    pub fn convert(&self, frame: &Frame) -> Option<GpuImage> {
        if frame.width == 0 || frame.height == 0 {
            warn!("dropping frame with empty geometry");
            return None;
        }
        if frame.data.len() < frame.expected_len() {
            warn!(
                bytes = frame.data.len(),
                expected = frame.expected_len(),
                "dropping truncated frame"
            );
            return None;
        }
        if self.device_lost.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.arena.upload(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_slot_rejects_old_handles() {
        let mut table = SlotTable::new(3);
        let first = table.checkout(640, 480);
        assert!(table.is_current(first.slot, first.generation));

        // Cycling through every slot recycles the first one.
        for _ in 0..3 {
            table.checkout(640, 480);
        }
        assert!(!table.is_current(first.slot, first.generation));
    }

    #[test]
    fn same_geometry_reuses_the_slot_texture() {
        let mut table = SlotTable::new(2);
        table.checkout(640, 480);
        table.checkout(640, 480);
        let again = table.checkout(640, 480);
        assert!(again.reuse, "matching geometry should reuse");
        let resized = table.checkout(1280, 720);
        assert!(!resized.reuse, "size change must reallocate");
    }

    #[test]
    fn generations_are_strictly_increasing() {
        let mut table = SlotTable::new(2);
        let a = table.checkout(64, 64);
        let b = table.checkout(64, 64);
        assert!(b.generation > a.generation);
    }
}
