//! GPU memory estimation
//!
//! The engine calls an estimator at most once per memory interval and uses
//! the numbers as they come. [`SceneMemoryEstimator`] is the default:
//! it sizes each geometry and texture once from the flattened scene.

use std::collections::HashSet;

use frameperf_shared::utils::{bytes_to_mib, process};
use frameperf_shared::{Drawable, EstimatedMemory, TextureInfo};

/// Estimated mip chain overhead on top of the base level
const MIPMAP_FACTOR: f64 = 1.33;

/// Bytes per texel of an uncompressed RGBA8 upload
const BYTES_PER_TEXEL: f64 = 4.0;

/// Produces a memory estimate for the current scene
pub trait MemoryEstimator {
    fn estimate(&mut self, drawables: &[Drawable]) -> EstimatedMemory;
}

impl<F> MemoryEstimator for F
where
    F: FnMut(&[Drawable]) -> EstimatedMemory,
{
    fn estimate(&mut self, drawables: &[Drawable]) -> EstimatedMemory {
        self(drawables)
    }
}

/// Sizes geometry buffers and textures, each counted once
#[derive(Debug, Clone, Copy)]
pub struct SceneMemoryEstimator {
    include_process: bool,
}

impl SceneMemoryEstimator {
    /// `include_process` adds the host process's resident memory as `ram`
    pub fn new(include_process: bool) -> Self {
        Self { include_process }
    }
}

impl Default for SceneMemoryEstimator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MemoryEstimator for SceneMemoryEstimator {
    fn estimate(&mut self, drawables: &[Drawable]) -> EstimatedMemory {
        let mut geometry_bytes = 0u64;
        let mut texture_bytes = 0.0f64;
        let mut geometries_seen = HashSet::new();
        let mut textures_seen = HashSet::new();

        for drawable in drawables {
            let geometry = &drawable.geometry;
            if geometries_seen.insert(geometry.key) {
                geometry_bytes += geometry.attribute_bytes + geometry.index_bytes;
            }
            for texture in &drawable.textures {
                if textures_seen.insert(texture.key) {
                    texture_bytes += texture_size(texture);
                }
            }
        }

        let geo = bytes_to_mib(geometry_bytes as f64);
        let tex = bytes_to_mib(texture_bytes);
        let ram = if self.include_process {
            process::resident_memory_bytes()
                .map(|b| bytes_to_mib(b as f64))
                .unwrap_or(0.0)
        } else {
            0.0
        };

        EstimatedMemory {
            vram: geo + tex,
            tex,
            geo,
            ram,
        }
    }
}

/// Bytes a texture occupies once uploaded
pub fn texture_size(texture: &TextureInfo) -> f64 {
    if texture.is_compressed() {
        return texture.compressed_mips.iter().sum::<u64>() as f64;
    }
    let base = texture.width as f64 * texture.height as f64 * BYTES_PER_TEXEL;
    if texture.generate_mipmaps {
        base * MIPMAP_FACTOR
    } else {
        base
    }
}
