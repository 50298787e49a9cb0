//! Scene description handed over by the rendering host
//!
//! The engine never walks the host's scene graph itself. Instead the host
//! flattens it into [`Drawable`] records once per rescan, and lists the
//! shader programs it has compiled as [`ProgramInfo`] records.

use serde::{Deserialize, Serialize};

/// Host identity of a drawable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Host identity of a material instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialKey(pub u64);

/// Host identity of a geometry buffer set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryKey(pub u64);

/// Host identity of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureKey(pub u64);

/// Opaque handle of a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramHandle(pub u64);

/// Primitive topology a drawable is submitted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    #[default]
    Triangles,
    Lines,
    LineStrip,
    Points,
}

impl PrimitiveKind {
    /// Number of primitives produced by `elements` vertices or indices
    pub fn primitives(&self, elements: u64) -> u64 {
        match self {
            Self::Triangles => elements / 3,
            Self::Lines => elements / 2,
            Self::LineStrip => elements.saturating_sub(1),
            Self::Points => elements,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Triangles => "Triangle",
            Self::Lines | Self::LineStrip => "Line",
            Self::Points => "Point",
        }
    }
}

/// Sub-range of a geometry that is actually drawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRange {
    pub start: u64,

    /// `None` draws to the end of the buffer
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryInfo {
    pub key: GeometryKey,
    pub vertex_count: u64,

    /// Present for indexed geometry
    pub index_count: Option<u64>,

    #[serde(default)]
    pub draw_range: DrawRange,

    /// Byte length of every vertex attribute array combined
    pub attribute_bytes: u64,

    /// Byte length of the index array
    pub index_bytes: u64,
}

impl GeometryInfo {
    /// Vertices or indices submitted once the draw range is applied
    pub fn submitted_elements(&self) -> u64 {
        let available = self.index_count.unwrap_or(self.vertex_count);
        let remaining = available.saturating_sub(self.draw_range.start);
        match self.draw_range.count {
            Some(count) => count.min(remaining),
            None => remaining,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureInfo {
    pub key: TextureKey,
    pub width: u32,
    pub height: u32,
    pub generate_mipmaps: bool,

    /// Byte lengths of the mip levels of a compressed texture; empty for
    /// textures uploaded uncompressed
    #[serde(default)]
    pub compressed_mips: Vec<u64>,
}

impl TextureInfo {
    pub fn is_compressed(&self) -> bool {
        !self.compressed_mips.is_empty()
    }
}

/// One drawable object of the host scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawable {
    pub id: ObjectId,
    pub name: String,
    pub kind: PrimitiveKind,
    pub geometry: GeometryInfo,

    /// Material layers, in draw order
    pub materials: Vec<MaterialKey>,

    /// Textures referenced by any of the materials
    #[serde(default)]
    pub textures: Vec<TextureInfo>,

    /// `Some` for instanced draws
    pub instance_count: Option<u64>,

    pub visible: bool,
}

impl Drawable {
    /// The material layer shading is attributed to: the last one
    pub fn primary_material(&self) -> Option<MaterialKey> {
        self.materials.last().copied()
    }

    /// Primitives submitted for this object in one draw
    pub fn primitive_count(&self) -> u64 {
        let per_instance = self.kind.primitives(self.geometry.submitted_elements());
        per_instance.saturating_mul(self.instance_count.unwrap_or(1))
    }
}

/// A shader program the renderer currently holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInfo {
    pub handle: ProgramHandle,

    /// Comma separated compilation cache key
    pub cache_key: String,
}
