//! Tessellated meshes: diagnostics and STL export.

use std::collections::HashMap;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use truck_meshalgo::prelude::*;
use truck_polymesh::stl::{self, StlType};
use truck_polymesh::PolygonMesh;

use crate::bounds::Aabb;
use crate::error::{KernelError, Result};

/// STL encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlFormat {
    /// 80-byte header, little-endian float triangles.
    #[default]
    Binary,
    /// Human-readable `solid ... endsolid`.
    Ascii,
}

impl StlFormat {
    fn stl_type(self) -> StlType {
        match self {
            StlFormat::Binary => StlType::Binary,
            StlFormat::Ascii => StlType::Ascii,
        }
    }
}

/// Indexed triangle soup used for analysis.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]`.
    pub vertices: Vec<f64>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]`.
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Count undirected edges by how many triangles use them.
    ///
    /// Returns `(boundary, non_manifold)`: edges used once and edges used
    /// more than twice. A closed manifold surface has both at zero.
    pub fn edge_defects(&self) -> (usize, usize) {
        let mut uses: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in self.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if a == b {
                    continue;
                }
                *uses.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let boundary = uses.values().filter(|&&n| n == 1).count();
        let non_manifold = uses.values().filter(|&&n| n > 2).count();
        (boundary, non_manifold)
    }

    /// Signed enclosed volume; positive when triangles wind outward.
    ///
    /// Cavities wound inward subtract from the total.
    pub fn signed_volume(&self) -> f64 {
        let v = |i: u32| {
            let i = i as usize * 3;
            Vector3::new(self.vertices[i], self.vertices[i + 1], self.vertices[i + 2])
        };
        self.indices
            .chunks_exact(3)
            .map(|t| v(t[0]).dot(&v(t[1]).cross(&v(t[2]))))
            .sum::<f64>()
            / 6.0
    }
}

/// Summary of a tessellated mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    /// Triangle count.
    pub triangles: usize,
    /// Distinct vertex positions after welding.
    pub vertices: usize,
    /// Edges used by exactly one triangle.
    pub boundary_edges: usize,
    /// Edges used by more than two triangles.
    pub non_manifold_edges: usize,
    /// Minimum corner of the bounding box.
    pub min: [f64; 3],
    /// Maximum corner of the bounding box.
    pub max: [f64; 3],
}

impl MeshStats {
    /// True if every edge is shared by exactly two triangles.
    pub fn is_closed(&self) -> bool {
        self.boundary_edges == 0 && self.non_manifold_edges == 0
    }
}

/// A tessellated shape ready for export.
#[derive(Debug, Clone)]
pub struct Mesh {
    polygon: PolygonMesh,
}

impl Mesh {
    /// Wrap a kernel mesh, welding coincident vertices.
    pub(crate) fn from_polygon(mut polygon: PolygonMesh) -> Self {
        polygon.put_together_same_attrs(truck_base::tolerance::TOLERANCE);
        polygon.remove_unused_attrs();
        Self { polygon }
    }

    /// Underlying kernel mesh.
    pub fn as_polygon(&self) -> &PolygonMesh {
        &self.polygon
    }

    /// Triangle count (quads count as two).
    pub fn triangle_count(&self) -> usize {
        self.polygon.tri_faces().len() + 2 * self.polygon.quad_faces().len()
    }

    /// Vertex position count.
    pub fn vertex_count(&self) -> usize {
        self.polygon.positions().len()
    }

    /// True if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }

    /// Bounding box of all vertex positions.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.polygon.positions().iter().map(|p| [p.x, p.y, p.z]))
    }

    /// Flatten into an indexed triangle list, splitting quads.
    pub fn to_triangles(&self) -> TriangleMesh {
        let mut out = TriangleMesh {
            vertices: Vec::with_capacity(self.vertex_count() * 3),
            indices: Vec::with_capacity(self.triangle_count() * 3),
        };
        for p in self.polygon.positions() {
            out.vertices.extend_from_slice(&[p.x, p.y, p.z]);
        }
        for face in self.polygon.tri_faces() {
            out.indices.extend(face.iter().map(|v| v.pos as u32));
        }
        for quad in self.polygon.quad_faces() {
            out.indices.extend_from_slice(&[
                quad[0].pos as u32,
                quad[1].pos as u32,
                quad[2].pos as u32,
                quad[0].pos as u32,
                quad[2].pos as u32,
                quad[3].pos as u32,
            ]);
        }
        out
    }

    /// Counts, bounds and edge diagnostics.
    pub fn stats(&self) -> MeshStats {
        let tris = self.to_triangles();
        let (boundary_edges, non_manifold_edges) = tris.edge_defects();
        let (min, max) = match self.bounds() {
            Some(bb) => (bb.min.into(), bb.max.into()),
            None => ([0.0; 3], [0.0; 3]),
        };
        MeshStats {
            triangles: tris.num_triangles(),
            vertices: tris.num_vertices(),
            boundary_edges,
            non_manifold_edges,
            min,
            max,
        }
    }

    /// Encode as STL.
    pub fn to_stl_bytes(&self, format: StlFormat) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        stl::write(&self.polygon, &mut bytes, format.stl_type())
            .map_err(|e| KernelError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Write STL to `path`, creating parent directories. Returns bytes written.
    pub fn write_stl(&self, path: impl AsRef<Path>, format: StlFormat) -> Result<u64> {
        let path = path.as_ref();
        let bytes = self.to_stl_bytes(format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KernelError::io(parent, e))?;
        }
        std::fs::write(path, &bytes).map_err(|e| KernelError::io(path, e))?;
        Ok(bytes.len() as u64)
    }
}
