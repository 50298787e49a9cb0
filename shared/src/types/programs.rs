//! Shader program attribution types
//!
//! A [`ProgramRecord`] ties one compiled program to the material that
//! produced it and to the objects drawn with it, together with the number of
//! primitives those objects submit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::scene::{MaterialKey, ObjectId, PrimitiveKind, ProgramHandle};

// ── Material tags ───────────────────────────────────────────────────────────

/// Persistent identifier stamped on a material the first time it is seen.
///
/// Rendered as exactly 16 lowercase hex digits so it can be embedded in a
/// program cache key and recovered from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialTag(pub u64);

impl fmt::Display for MaterialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed material tag: {0:?}")]
pub struct MalformedTag(pub String);

impl FromStr for MaterialTag {
    type Err = MalformedTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MalformedTag(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(MaterialTag)
            .map_err(|_| MalformedTag(s.to_string()))
    }
}

// ── Draw counts ─────────────────────────────────────────────────────────────

/// Primitives submitted by one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDrawCount {
    pub object: ObjectId,
    pub kind: PrimitiveKind,
    pub count: u64,
}

/// Primitives submitted by every object using a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCounts {
    pub total: u64,

    /// Kind contributing the most primitives
    pub kind: PrimitiveKind,

    pub data: Vec<MeshDrawCount>,
}

impl DrawCounts {
    /// Sum the per-object counts and pick the dominant primitive kind
    pub fn from_meshes(data: Vec<MeshDrawCount>) -> Self {
        let mut per_kind: BTreeMap<u8, (PrimitiveKind, u64)> = BTreeMap::new();
        for entry in &data {
            let slot = per_kind
                .entry(kind_order(entry.kind))
                .or_insert((entry.kind, 0));
            slot.1 = slot.1.saturating_add(entry.count);
        }

        // Ties resolve to the earliest kind in declaration order
        let kind = per_kind
            .values()
            .fold(None::<(PrimitiveKind, u64)>, |best, &(kind, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((kind, count)),
            })
            .map(|(kind, _)| kind)
            .unwrap_or_default();

        Self {
            total: data.iter().fold(0u64, |acc, d| acc.saturating_add(d.count)),
            kind,
            data,
        }
    }
}

fn kind_order(kind: PrimitiveKind) -> u8 {
    match kind {
        PrimitiveKind::Triangles => 0,
        PrimitiveKind::Lines => 1,
        PrimitiveKind::LineStrip => 2,
        PrimitiveKind::Points => 3,
    }
}

// ── Program records ─────────────────────────────────────────────────────────

/// One distinct shader program in use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    /// Tag of the material the program was compiled for
    pub tag: MaterialTag,

    pub material: MaterialKey,
    pub program: ProgramHandle,

    /// Objects currently drawn with the material
    pub meshes: Vec<ObjectId>,

    pub draw_counts: DrawCounts,

    /// False when none of the objects is visible
    pub visible: bool,
}

impl ProgramRecord {
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Share of the frame's primitives drawn by this program
    pub fn percent_of(&self, frame_total_primitives: u64) -> f64 {
        percent_of_total(self.draw_counts.total, frame_total_primitives)
    }
}

/// `part / total * 100`, rounded to one decimal place; 0 when `total` is 0
pub fn percent_of_total(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = (part as f64 / total as f64 * 1000.0).round() / 10.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}
