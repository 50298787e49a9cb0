//! GPU program attribution
//!
//! Materials are tagged with a persistent identifier the first time they
//! are seen. The tag is handed to the host as a compile-time define, so it
//! ends up in the cache key of every program compiled for that material,
//! which is how programs are matched back to materials and the objects
//! drawn with them.
//!
//! Each rescan recomputes the mapping from scratch. The previous mapping is
//! only replaced when the number of distinct programs changed. Materials
//! absent from a rescan lose their tag; if one comes back it is stamped
//! again with a fresh tag.

use std::collections::{BTreeMap, HashMap};

use frameperf_shared::{
    DrawCounts, Drawable, MalformedTag, MaterialKey, MaterialTag, MeshDrawCount, ProgramHandle,
    ProgramRecord, RenderHost,
};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Define name carrying the material tag
pub const TAG_DEFINE: &str = "perfTag";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheKeyError {
    #[error("cache key carries no {} define", TAG_DEFINE)]
    MissingTag,

    #[error(transparent)]
    Malformed(#[from] MalformedTag),
}

/// Recover the material tag from a comma separated program cache key
pub fn tag_from_cache_key(cache_key: &str) -> Result<MaterialTag, CacheKeyError> {
    let mut parts = cache_key.split(',').map(str::trim);
    while let Some(part) = parts.next() {
        if part == TAG_DEFINE {
            let value = parts.next().ok_or(CacheKeyError::MissingTag)?;
            return Ok(value.parse()?);
        }
    }
    Err(CacheKeyError::MissingTag)
}

/// Result of a rescan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// The program mapping was replaced
    Replaced { programs: usize },

    /// The distinct program count did not change; previous mapping kept
    Unchanged { programs: usize },
}

/// Maps compiled programs to materials and the objects they draw
#[derive(Debug, Default)]
pub struct ResourceAggregator {
    tags: HashMap<MaterialKey, MaterialTag>,
    next_tag: u64,
    programs: Vec<ProgramRecord>,
    generation: u64,
    last_skipped: usize,
}

impl ResourceAggregator {
    pub fn new() -> Self {
        Self {
            next_tag: 1,
            ..Default::default()
        }
    }

    /// Tag previously assigned to `material`
    pub fn tag_of(&self, material: MaterialKey) -> Option<MaterialTag> {
        self.tags.get(&material).copied()
    }

    /// Materials tagged so far
    pub fn tagged_materials(&self) -> usize {
        self.tags.len()
    }

    /// Tag `material`, stamping the host on first sight
    pub fn stamp(&mut self, host: &mut dyn RenderHost, material: MaterialKey) -> MaterialTag {
        if let Some(tag) = self.tags.get(&material) {
            return *tag;
        }
        let tag = MaterialTag(self.next_tag.max(1));
        self.next_tag = tag.0 + 1;
        host.tag_material(material, TAG_DEFINE, &tag.to_string());
        self.tags.insert(material, tag);
        debug!("tagged material {:?} as {}", material, tag);
        tag
    }

    /// Current program mapping, ordered by tag
    pub fn programs(&self) -> &[ProgramRecord] {
        &self.programs
    }

    /// Incremented every time the mapping is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Programs skipped by the last rescan because their cache key could
    /// not be parsed
    pub fn last_skipped(&self) -> usize {
        self.last_skipped
    }

    /// Each program's share of the frame's primitives
    pub fn shares(&self, frame_total_primitives: u64) -> Vec<(MaterialTag, f64)> {
        self.programs
            .iter()
            .map(|p| (p.tag, p.percent_of(frame_total_primitives)))
            .collect()
    }

    /// Walk the scene and the compiled programs once and rebuild the mapping
    pub fn rescan(&mut self, host: &mut dyn RenderHost) -> RescanOutcome {
        let drawables = host.drawables();

        let mut by_tag: HashMap<MaterialTag, (MaterialKey, Vec<&Drawable>)> = HashMap::new();
        for drawable in &drawables {
            let Some(material) = drawable.primary_material() else {
                continue;
            };
            let tag = self.stamp(host, material);
            by_tag
                .entry(tag)
                .or_insert_with(|| (material, Vec::new()))
                .1
                .push(drawable);
        }

        let before = self.tags.len();
        self.tags.retain(|_, tag| by_tag.contains_key(tag));
        if self.tags.len() < before {
            debug!("forgot {} materials no longer in the scene", before - self.tags.len());
        }

        let mut matched: BTreeMap<MaterialTag, ProgramHandle> = BTreeMap::new();
        let mut skipped = 0;
        for program in host.programs() {
            match tag_from_cache_key(&program.cache_key) {
                Ok(tag) if by_tag.contains_key(&tag) => {
                    matched.insert(tag, program.handle);
                }
                Ok(tag) => trace!("program {:?} belongs to absent material {}", program.handle, tag),
                Err(CacheKeyError::MissingTag) => {
                    trace!("program {:?} is not tagged", program.handle)
                }
                Err(e) => {
                    skipped += 1;
                    warn!("skipping program {:?} during rescan: {}", program.handle, e);
                }
            }
        }
        self.last_skipped = skipped;

        if matched.len() == self.programs.len() {
            return RescanOutcome::Unchanged {
                programs: matched.len(),
            };
        }

        self.programs = matched
            .into_iter()
            .filter_map(|(tag, handle)| {
                let (material, meshes) = by_tag.get(&tag)?;
                Some(build_record(tag, *material, handle, meshes))
            })
            .collect();
        self.generation += 1;
        debug!(
            "program mapping replaced: {} programs (generation {})",
            self.programs.len(),
            self.generation
        );

        RescanOutcome::Replaced {
            programs: self.programs.len(),
        }
    }

    /// Forget the mapping but keep material tags. Tags of materials that
    /// leave the scene are dropped by the next rescan.
    pub fn clear(&mut self) {
        self.programs.clear();
        self.last_skipped = 0;
    }
}

fn build_record(
    tag: MaterialTag,
    material: MaterialKey,
    program: ProgramHandle,
    meshes: &[&Drawable],
) -> ProgramRecord {
    let mut sorted: Vec<&Drawable> = meshes.to_vec();
    sorted.sort_by_key(|d| d.id);
    sorted.dedup_by_key(|d| d.id);

    let data = sorted
        .iter()
        .map(|d| MeshDrawCount {
            object: d.id,
            kind: d.kind,
            count: if d.visible { d.primitive_count() } else { 0 },
        })
        .collect();

    ProgramRecord {
        tag,
        material,
        program,
        meshes: sorted.iter().map(|d| d.id).collect(),
        draw_counts: DrawCounts::from_meshes(data),
        visible: sorted.iter().any(|d| d.visible),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameperf_shared::{
        DrawRange, GeometryInfo, GeometryKey, ObjectId, PrimitiveKind, ProgramInfo,
        RenderCounters, ResourceCounts,
    };

    #[derive(Default)]
    struct TestScene {
        drawables: Vec<Drawable>,
        defines: HashMap<MaterialKey, (String, String)>,
        extra_programs: Vec<ProgramInfo>,
        stamps: usize,
    }

    impl TestScene {
        fn mesh(&mut self, id: u64, materials: &[u64], vertices: u64) {
            self.drawables.push(Drawable {
                id: ObjectId(id),
                name: format!("mesh-{}", id),
                kind: PrimitiveKind::Triangles,
                geometry: GeometryInfo {
                    key: GeometryKey(id),
                    vertex_count: vertices,
                    index_count: None,
                    draw_range: DrawRange::default(),
                    attribute_bytes: vertices * 12,
                    index_bytes: 0,
                },
                materials: materials.iter().map(|m| MaterialKey(*m)).collect(),
                textures: Vec::new(),
                instance_count: None,
                visible: true,
            });
        }
    }

    impl RenderHost for TestScene {
        fn counters(&self) -> RenderCounters {
            RenderCounters::default()
        }

        fn resources(&self) -> ResourceCounts {
            ResourceCounts::default()
        }

        fn drawables(&self) -> Vec<Drawable> {
            self.drawables.clone()
        }

        fn programs(&self) -> Vec<ProgramInfo> {
            let mut programs: Vec<ProgramInfo> = self
                .defines
                .iter()
                .map(|(material, (define, value))| ProgramInfo {
                    handle: ProgramHandle(material.0),
                    cache_key: format!("MeshStandardMaterial,{},{},highp", define, value),
                })
                .collect();
            programs.extend(self.extra_programs.iter().cloned());
            programs
        }

        fn tag_material(&mut self, material: MaterialKey, define: &str, value: &str) {
            self.stamps += 1;
            self.defines
                .insert(material, (define.to_string(), value.to_string()));
        }
    }

    #[test]
    fn test_shared_material_grouped() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 30);
        scene.mesh(2, &[10], 60);
        scene.mesh(3, &[20], 9);

        let mut resources = ResourceAggregator::new();
        let outcome = resources.rescan(&mut scene);

        assert_eq!(outcome, RescanOutcome::Replaced { programs: 2 });
        assert_eq!(resources.programs().len(), 2);

        let shared = resources
            .programs()
            .iter()
            .find(|p| p.material == MaterialKey(10))
            .unwrap();
        assert_eq!(shared.mesh_count(), 2);
        assert_eq!(shared.draw_counts.total, 30);
        assert_eq!(shared.meshes, vec![ObjectId(1), ObjectId(2)]);

        let single = resources
            .programs()
            .iter()
            .find(|p| p.material == MaterialKey(20))
            .unwrap();
        assert_eq!(single.mesh_count(), 1);
        assert_eq!(single.draw_counts.total, 3);
    }

    #[test]
    fn test_tags_are_stable() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 3);
        scene.mesh(2, &[10], 3);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);
        let tag = resources.tag_of(MaterialKey(10)).unwrap();

        resources.rescan(&mut scene);
        resources.rescan(&mut scene);
        assert_eq!(resources.tag_of(MaterialKey(10)), Some(tag));
        assert_eq!(scene.stamps, 1);
    }

    #[test]
    fn test_layered_material_attributes_last_layer() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10, 11], 3);
        scene.mesh(2, &[11], 3);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);

        assert_eq!(resources.tag_of(MaterialKey(10)), None);
        assert_eq!(resources.programs().len(), 1);
        assert_eq!(resources.programs()[0].mesh_count(), 2);
    }

    #[test]
    fn test_unparsable_cache_key_is_skipped() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 3);
        scene.mesh(2, &[20], 3);
        scene.extra_programs.push(ProgramInfo {
            handle: ProgramHandle(99),
            cache_key: format!("ShaderMaterial,{},not-a-tag", TAG_DEFINE),
        });
        scene.extra_programs.push(ProgramInfo {
            handle: ProgramHandle(98),
            cache_key: "BackgroundMaterial,highp".to_string(),
        });

        let mut resources = ResourceAggregator::new();
        let outcome = resources.rescan(&mut scene);

        assert_eq!(outcome, RescanOutcome::Replaced { programs: 2 });
        assert_eq!(resources.last_skipped(), 1);
    }

    #[test]
    fn test_mapping_replaced_only_when_program_count_changes() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 3);
        scene.mesh(2, &[20], 3);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);
        assert_eq!(resources.generation(), 1);

        // same number of programs, different mesh sets
        scene.drawables[1].materials = vec![MaterialKey(10)];
        scene.mesh(3, &[20], 3);
        let outcome = resources.rescan(&mut scene);
        assert_eq!(outcome, RescanOutcome::Unchanged { programs: 2 });
        assert_eq!(resources.generation(), 1);
        let first = resources
            .programs()
            .iter()
            .find(|p| p.material == MaterialKey(10))
            .unwrap();
        assert_eq!(first.mesh_count(), 1);

        scene.mesh(4, &[30], 3);
        let outcome = resources.rescan(&mut scene);
        assert_eq!(outcome, RescanOutcome::Replaced { programs: 3 });
        assert_eq!(resources.generation(), 2);
    }

    #[test]
    fn test_departed_materials_lose_their_tag() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 3);
        scene.mesh(2, &[20], 3);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);
        assert_eq!(resources.tagged_materials(), 2);
        let kept = resources.tag_of(MaterialKey(10)).unwrap();
        let old = resources.tag_of(MaterialKey(20)).unwrap();

        scene.drawables.pop();
        resources.rescan(&mut scene);
        assert_eq!(resources.tagged_materials(), 1);
        assert_eq!(resources.tag_of(MaterialKey(10)), Some(kept));
        assert_eq!(resources.tag_of(MaterialKey(20)), None);

        scene.mesh(3, &[20], 3);
        resources.rescan(&mut scene);
        let fresh = resources.tag_of(MaterialKey(20)).unwrap();
        assert_ne!(fresh, old);
        assert_eq!(scene.stamps, 3);
        assert_eq!(resources.programs().len(), 2);
    }

    #[test]
    fn test_stale_programs_dropped() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 3);
        scene.mesh(2, &[20], 3);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);

        scene.drawables.pop();
        let outcome = resources.rescan(&mut scene);
        assert_eq!(outcome, RescanOutcome::Replaced { programs: 1 });
        assert_eq!(resources.programs()[0].material, MaterialKey(10));
    }

    #[test]
    fn test_hidden_meshes_submit_nothing() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 30);
        scene.mesh(2, &[10], 30);
        scene.drawables[1].visible = false;

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);

        let record = &resources.programs()[0];
        assert_eq!(record.draw_counts.total, 10);
        assert!(record.visible);
    }

    #[test]
    fn test_shares_guard_zero_total() {
        let mut scene = TestScene::default();
        scene.mesh(1, &[10], 30);

        let mut resources = ResourceAggregator::new();
        resources.rescan(&mut scene);

        assert_eq!(resources.shares(0), vec![(resources.programs()[0].tag, 0.0)]);
        assert_eq!(resources.shares(40)[0].1, 25.0);
    }

    #[test]
    fn test_tag_from_cache_key() {
        let tag = MaterialTag(42);
        let key = format!("a,b,{},{},c", TAG_DEFINE, tag);
        assert_eq!(tag_from_cache_key(&key), Ok(tag));
        assert_eq!(tag_from_cache_key("a,b"), Err(CacheKeyError::MissingTag));
        assert_eq!(
            tag_from_cache_key(&format!("a,{}", TAG_DEFINE)),
            Err(CacheKeyError::MissingTag)
        );
        assert!(matches!(
            tag_from_cache_key(&format!("{},xyz", TAG_DEFINE)),
            Err(CacheKeyError::Malformed(_))
        ));
    }
}
