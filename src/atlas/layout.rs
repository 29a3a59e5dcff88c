//! Atlas layout math - pure functions
//!
//! Maps a global triangle index to its cell in the square atlas grid and to
//! the UV corners of its diagonal half of that cell. Shared by the live
//! render pass, the camera projection pass, the migration pass, and the mesh
//! export path, so that every consumer agrees on where a triangle lives.

use cgmath::Vector2;

use crate::constants::atlas::{BORDER_TEXELS, RESOLUTION, TRIANGLES_PER_CELL};

/// Side length of the square cell grid, in cells, for a triangle count.
///
/// Cells hold two triangles each, so `side = ceil(sqrt(n / 2))`. A count of
/// zero yields side zero; callers computing per-cell sizes must guard that
/// case before dividing.
pub fn grid_side(triangle_count: u32) -> u32 {
    (triangle_count as f64 / TRIANGLES_PER_CELL as f64).sqrt().ceil() as u32
}

/// UV coordinate of one triangle corner inside the unit-square atlas.
///
/// `primitive` is the global triangle index (entity offset + local triangle
/// index), `vertex` is 0..3 within the triangle, `side` is the current grid
/// side and must be at least 1. Even triangles take the upper-left diagonal
/// half of their cell, odd triangles the lower-right, with every corner
/// inset by [`BORDER_TEXELS`] at the working resolution so neighbouring
/// triangles never share a bilinear footprint.
pub fn cell_uv(primitive: u32, vertex: u32, side: u32) -> Vector2<f32> {
    debug_assert!(side > 0, "cell_uv called with a zero grid side");
    debug_assert!(vertex < 3);

    // One atlas texel, expressed in cell-local units.
    let pixel = 1.0 / RESOLUTION as f32 * side as f32;
    let border = BORDER_TEXELS;
    let offsets = [
        // upper-left triangle
        Vector2::new(border * pixel, border * pixel),
        Vector2::new(1.0 - 2.0 * border * pixel, border * pixel),
        Vector2::new(border * pixel, 1.0 - 2.0 * border * pixel),
        // lower-right triangle
        Vector2::new(1.0 - border * pixel, 2.0 * border * pixel),
        Vector2::new(1.0 - border * pixel, 1.0 - border * pixel),
        Vector2::new(2.0 * border * pixel, 1.0 - border * pixel),
    ];

    let cell = primitive / 2;
    let cell_size = 1.0 / side as f32;
    let top_left = Vector2::new(
        (cell % side) as f32 * cell_size,
        (cell / side) as f32 * cell_size,
    );
    top_left + offsets[(primitive % 2 * 3 + vertex) as usize] * cell_size
}
