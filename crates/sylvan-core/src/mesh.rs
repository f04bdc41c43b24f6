//! CPU-side meshes produced by page generation.
//!
//! Vertex positions are local to the mesh `translation`; generators build
//! geometry relative to a block center and the block then places the mesh.

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::Aabb;

/// Interleaved vertex layout (32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// World placement of the local vertex origin.
    pub translation: Vec3,
    /// Local-space bounds, `None` for an empty mesh.
    pub bound: Option<Aabb>,
}

impl Mesh {
    /// Build a mesh and compute its bound.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bound = Aabb::from_points(vertices.iter().map(Vertex::position));
        Self {
            vertices,
            indices,
            translation: Vec3::ZERO,
            bound,
        }
    }

    /// Check if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Bound in world space, applying `translation`.
    pub fn world_bound(&self) -> Option<Aabb> {
        self.bound.map(|b| b.translated(self.translation))
    }

    /// Recompute the local bound from the vertices.
    pub fn recompute_bound(&mut self) {
        self.bound = Aabb::from_points(self.vertices.iter().map(Vertex::position));
    }

    /// Vertex data as raw bytes, for upload by a renderer.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.vertex_bytes().len()
            + self.indices.len() * std::mem::size_of::<u32>()
    }
}

/// Accumulates quads and transformed meshes into a single merged mesh.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(quads: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(quads * 4),
            indices: Vec::with_capacity(quads * 6),
        }
    }

    /// Add a quad given counter-clockwise corners, starting bottom-left.
    pub fn quad(&mut self, corners: [Vec3; 4], normal: Vec3, uvs: [[f32; 2]; 4]) {
        let base = self.vertices.len() as u32;
        for (corner, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(Vertex::new(corner, normal, uv));
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Append `mesh` with `transform` applied to positions and normals.
    pub fn append_transformed(&mut self, mesh: &Mesh, transform: &Affine3A) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(mesh.vertices.iter().map(|v| {
            let position = transform.transform_point3(Vec3::from_array(v.position));
            let normal = transform
                .transform_vector3(Vec3::from_array(v.normal))
                .normalize_or_zero();
            Vertex::new(position, normal, v.uv)
        }));
        self.indices.extend(mesh.indices.iter().map(|i| base + i));
    }

    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Finish and return the merged mesh.
    pub fn build(self) -> Mesh {
        Mesh::new(self.vertices, self.indices)
    }
}
