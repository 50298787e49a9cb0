//! Boundary between the telemetry engine and the rendering host

use crate::types::events::{RenderCounters, ResourceCounts};
use crate::types::profile::RendererInfo;
use crate::types::scene::{Drawable, MaterialKey, ProgramInfo};

/// Read access to a renderer's counters and scene.
///
/// The engine only reads through this trait, with a single exception:
/// [`RenderHost::tag_material`] lets deep analysis attach an identifying
/// define to a material so the programs compiled for it can be traced back.
pub trait RenderHost {
    /// Draw counters accumulated since the renderer's own frame start
    fn counters(&self) -> RenderCounters;

    /// Live resource counts
    fn resources(&self) -> ResourceCounts;

    fn renderer_info(&self) -> RendererInfo {
        RendererInfo::default()
    }

    /// The scene, flattened to its drawable objects
    fn drawables(&self) -> Vec<Drawable>;

    /// Programs the renderer currently has compiled
    fn programs(&self) -> Vec<ProgramInfo>;

    /// Add `define = value` to the material's compile-time defines, so that
    /// programs compiled for it carry `define,value` in their cache key
    fn tag_material(&mut self, material: MaterialKey, define: &str, value: &str);
}
