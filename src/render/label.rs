//! Label geometry: a plate sized to the measured text plus one quad per glyph.

use bevy::prelude::*;
use bevy_asset::RenderAssetUsages;
use bevy_mesh::{Indices, PrimitiveTopology};

use crate::config::LabelConfig;
use crate::glyphs::GlyphSet;

const LINE_HEIGHT: f32 = 1.6;
const GLYPH_LIFT: f32 = 0.005;
const GLYPH_THICKNESS: f32 = 0.002;

pub struct LabelGeometry {
    pub plate: Mesh,
    pub plate_half: Vec3,
    /// `None` when the text has no visible characters.
    pub glyphs: Option<GlyphGeometry>,
}

pub struct GlyphGeometry {
    pub mesh: Mesh,
    pub half: Vec3,
    /// Placement of the glyph node relative to the plate.
    pub offset: Vec3,
}

/// Text actually shown on a label, truncated with an ellipsis.
pub fn label_text(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn build_label(text: &str, glyphs: &GlyphSet, cfg: &LabelConfig) -> LabelGeometry {
    let shown = label_text(text, cfg.max_chars);
    let text_width = glyphs.measure(&shown) * cfg.size;
    let plate_half = Vec3::new(
        (text_width * 0.5 + cfg.padding).max(cfg.size),
        cfg.size * LINE_HEIGHT * 0.5,
        cfg.depth * 0.5,
    );
    let plate = Mesh::from(Cuboid::from_size(plate_half * 2.0));

    let glyph_height = glyphs.cap_height * cfg.size;
    let mut quads = Vec::new();
    let mut pen = -text_width * 0.5;
    for ch in shown.chars() {
        let advance = glyphs.advance(ch) * cfg.size;
        if !ch.is_whitespace() {
            let inset = advance * 0.1;
            quads.push(Rect::new(
                pen + inset,
                -glyph_height * 0.5,
                pen + advance - inset,
                glyph_height * 0.5,
            ));
        }
        pen += advance;
    }

    let glyphs = (!quads.is_empty()).then(|| GlyphGeometry {
        mesh: quad_mesh(&quads),
        half: Vec3::new(text_width * 0.5, glyph_height * 0.5, GLYPH_THICKNESS),
        offset: Vec3::new(0.0, 0.0, plate_half.z + GLYPH_LIFT),
    });

    LabelGeometry {
        plate,
        plate_half,
        glyphs,
    }
}

/// Flat quads facing +Z.
fn quad_mesh(quads: &[Rect]) -> Mesh {
    let mut positions = Vec::with_capacity(quads.len() * 4);
    let mut uvs = Vec::with_capacity(quads.len() * 4);
    let mut indices = Vec::with_capacity(quads.len() * 6);

    for quad in quads {
        let base = positions.len() as u32;
        positions.extend_from_slice(&[
            [quad.min.x, quad.min.y, 0.0],
            [quad.max.x, quad.min.y, 0.0],
            [quad.max.x, quad.max.y, 0.0],
            [quad.min.x, quad.max.y, 0.0],
        ]);
        uvs.extend_from_slice(&[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]);
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let normals = vec![[0.0, 0.0, 1.0]; positions.len()];

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices))
}
