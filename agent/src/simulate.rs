//! Synthetic render host
//!
//! [`SimulatedScene`] stands in for a real renderer: it holds a flat list of
//! drawables, counts draw calls and primitives on [`SimulatedScene::render`],
//! and "compiles" one program per distinct material define set, with a
//! comma separated cache key the way a real renderer builds one.

use std::collections::{BTreeMap, HashMap, HashSet};

use frameperf_shared::{
    DrawRange, Drawable, GeometryInfo, GeometryKey, MaterialKey, ObjectId, PrimitiveKind,
    ProgramHandle, ProgramInfo, RenderCounters, RenderHost, RendererInfo, ResourceCounts,
    TextureInfo, TextureKey,
};
use tracing::trace;

/// Vertices and indices of a unit box with per-face normals
const BOX_VERTICES: u64 = 24;
const BOX_INDICES: u64 = 36;

/// position + normal + uv, as f32
const BOX_VERTEX_BYTES: u64 = (3 + 3 + 2) * 4;

#[derive(Debug, Default)]
pub struct SimulatedScene {
    drawables: Vec<Drawable>,
    defines: HashMap<MaterialKey, BTreeMap<String, String>>,
    compiled: HashMap<String, ProgramHandle>,
    in_use: Vec<ProgramInfo>,
    counters: RenderCounters,
    next_program: u64,
}

impl SimulatedScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// `meshes` boxes spread round-robin over `materials` materials, every
    /// material carrying one mipmapped 512x512 texture
    pub fn grid(meshes: usize, materials: usize) -> Self {
        let materials = materials.max(1) as u64;
        let mut scene = Self::new();
        for i in 0..meshes as u64 {
            let material = i % materials;
            scene.add(Drawable {
                id: ObjectId(i + 1),
                name: format!("box-{}", i),
                kind: PrimitiveKind::Triangles,
                geometry: box_geometry(GeometryKey(i % 3)),
                materials: vec![MaterialKey(material + 1)],
                textures: vec![TextureInfo {
                    key: TextureKey(material + 1),
                    width: 512,
                    height: 512,
                    generate_mipmaps: true,
                    compressed_mips: Vec::new(),
                }],
                instance_count: None,
                visible: true,
            });
        }
        scene
    }

    pub fn add(&mut self, drawable: Drawable) {
        self.drawables.push(drawable);
    }

    pub fn drawables_mut(&mut self) -> &mut Vec<Drawable> {
        &mut self.drawables
    }

    /// Returns false when no drawable has that id
    pub fn set_visible(&mut self, id: ObjectId, visible: bool) -> bool {
        match self.drawables.iter_mut().find(|d| d.id == id) {
            Some(drawable) => {
                drawable.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Defines attached to a material, sorted by name
    pub fn defines(&self, material: MaterialKey) -> Vec<(String, String)> {
        self.defines
            .get(&material)
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Programs compiled over the scene's lifetime
    pub fn compiled_programs(&self) -> usize {
        self.compiled.len()
    }

    /// Draw every visible object once; counters restart at zero
    pub fn render(&mut self) -> RenderCounters {
        let mut counters = RenderCounters::default();
        let mut used = HashSet::new();
        let mut in_use = Vec::new();

        for index in 0..self.drawables.len() {
            let drawable = &self.drawables[index];
            if !drawable.visible {
                continue;
            }
            counters.calls += 1;
            let primitives = drawable.primitive_count();
            match drawable.kind {
                PrimitiveKind::Triangles => counters.triangles += primitives,
                PrimitiveKind::Lines | PrimitiveKind::LineStrip => counters.lines += primitives,
                PrimitiveKind::Points => counters.points += primitives,
            }

            let Some(material) = drawable.primary_material() else {
                continue;
            };
            let program = self.program_for(material);
            if used.insert(program.handle) {
                in_use.push(program);
            }
        }

        trace!(
            "simulated frame: {} calls, {} triangles",
            counters.calls,
            counters.triangles
        );
        self.in_use = in_use;
        self.counters = counters;
        counters
    }

    fn program_for(&mut self, material: MaterialKey) -> ProgramInfo {
        let mut cache_key = String::from("SimulatedMaterial");
        if let Some(defines) = self.defines.get(&material) {
            for (name, value) in defines {
                cache_key.push(',');
                cache_key.push_str(name);
                cache_key.push(',');
                cache_key.push_str(value);
            }
        }
        cache_key.push_str(",highp");

        let next_program = &mut self.next_program;
        let handle = *self.compiled.entry(cache_key.clone()).or_insert_with(|| {
            *next_program += 1;
            ProgramHandle(*next_program)
        });
        ProgramInfo { handle, cache_key }
    }
}

fn box_geometry(key: GeometryKey) -> GeometryInfo {
    GeometryInfo {
        key,
        vertex_count: BOX_VERTICES,
        index_count: Some(BOX_INDICES),
        draw_range: DrawRange::default(),
        attribute_bytes: BOX_VERTICES * BOX_VERTEX_BYTES,
        index_bytes: BOX_INDICES * 2,
    }
}

impl RenderHost for SimulatedScene {
    fn counters(&self) -> RenderCounters {
        self.counters
    }

    fn resources(&self) -> ResourceCounts {
        let geometries: HashSet<GeometryKey> =
            self.drawables.iter().map(|d| d.geometry.key).collect();
        let textures: HashSet<TextureKey> = self
            .drawables
            .iter()
            .flat_map(|d| d.textures.iter().map(|t| t.key))
            .collect();
        ResourceCounts {
            geometries: geometries.len() as u64,
            textures: textures.len() as u64,
            programs: self.in_use.len() as u64,
        }
    }

    fn renderer_info(&self) -> RendererInfo {
        RendererInfo {
            version: "Simulated 1.0".to_string(),
            renderer: "frameperf simulated renderer".to_string(),
            vendor: "frameperf".to_string(),
        }
    }

    fn drawables(&self) -> Vec<Drawable> {
        self.drawables.clone()
    }

    fn programs(&self) -> Vec<ProgramInfo> {
        self.in_use.clone()
    }

    fn tag_material(&mut self, material: MaterialKey, define: &str, value: &str) {
        self.defines
            .entry(material)
            .or_default()
            .insert(define.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_counts_visible_objects() {
        let mut scene = SimulatedScene::grid(4, 2);
        let counters = scene.render();
        assert_eq!(counters.calls, 4);
        assert_eq!(counters.triangles, 4 * 12);
        assert_eq!(scene.programs().len(), 1);

        assert!(scene.set_visible(ObjectId(1), false));
        assert!(!scene.set_visible(ObjectId(99), false));
        assert_eq!(scene.render().calls, 3);
    }

    #[test]
    fn test_tagging_recompiles_program() {
        let mut scene = SimulatedScene::grid(2, 2);
        scene.render();
        assert_eq!(scene.compiled_programs(), 1);

        scene.tag_material(MaterialKey(1), "perfTag", "0000000000000001");
        scene.render();
        let programs = scene.programs();
        assert_eq!(programs.len(), 2);
        assert!(programs
            .iter()
            .any(|p| p.cache_key == "SimulatedMaterial,perfTag,0000000000000001,highp"));
        assert_eq!(
            scene.defines(MaterialKey(1)),
            vec![("perfTag".to_string(), "0000000000000001".to_string())]
        );
    }

    #[test]
    fn test_resources_are_distinct() {
        let mut scene = SimulatedScene::grid(6, 2);
        scene.render();
        let resources = scene.resources();
        assert_eq!(resources.geometries, 3);
        assert_eq!(resources.textures, 2);
        assert_eq!(resources.programs, 1);
    }
}
