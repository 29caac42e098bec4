//! STEP reader: parses a file and exposes its solids in a stable order.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use truck_meshalgo::prelude::*;
use truck_polymesh::PolygonMesh;
use truck_stepio::r#in::Table;

use crate::bounds::Aabb;
use crate::deflection::Deflection;
use crate::error::{KernelError, Result};
use crate::mesh::Mesh;
use crate::part21::EntityGraph;
use crate::structure::{check_placements, SolidStructure};

/// Tolerance (mm) of the throwaway triangulation used to size each solid.
const BOUNDS_TOLERANCE: f64 = 0.05;

/// One B-rep solid of a STEP document.
#[derive(Debug, Clone, PartialEq)]
pub struct Solid {
    /// Position in the document, in STEP entity order.
    pub index: usize,
    /// STEP entity id of the solid's outer shell.
    pub entity_id: u64,
    /// Shells bounding cavities of a `BREP_WITH_VOIDS` solid, by entity id.
    pub voids: Vec<u64>,
    /// Bounding box of the outer shell from a coarse triangulation.
    pub bounds: Aabb,
}

/// A parsed STEP file.
///
/// Holds the kernel's entity table for the lifetime of one conversion task;
/// dropping the document releases every shape handle.
pub struct StepDocument {
    path: PathBuf,
    table: Table,
    solids: Vec<Solid>,
    reversed: HashSet<u64>,
}

impl std::fmt::Debug for StepDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDocument")
            .field("path", &self.path)
            .field("solids", &self.solids)
            .finish_non_exhaustive()
    }
}

/// Read a STEP file from a path.
///
/// # Errors
///
/// [`KernelError::NotFound`] if the file is missing, [`KernelError::Import`]
/// if it cannot be read, is not valid STEP, contains no convertible shells,
/// or places geometry through a non-identity transform.
pub fn read_step(path: impl AsRef<Path>) -> Result<StepDocument> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            KernelError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            KernelError::import(path, err.to_string())
        }
    })?;
    read_step_from_str(path, &String::from_utf8_lossy(&bytes))
}

/// Parse STEP text. `origin` is only used to label errors and logs.
pub fn read_step_from_str(origin: impl AsRef<Path>, text: &str) -> Result<StepDocument> {
    let path = origin.as_ref();

    let exchange = truck_stepio::r#in::ruststep::parser::parse(text)
        .map_err(|e| KernelError::import(path, format!("failed to parse STEP file: {e}")))?;
    let data = exchange
        .data
        .first()
        .ok_or_else(|| KernelError::import(path, "STEP file contains no data sections"))?;
    let table = Table::from_data_section(data);

    let graph = EntityGraph::parse(text).map_err(|e| KernelError::import(path, e.to_string()))?;
    check_placements(&graph).map_err(|message| KernelError::import(path, message))?;
    let structure = SolidStructure::from_graph(&graph);

    // Entity ids follow authoring order; the table's own iteration order does not.
    let mut ids: Vec<u64> = table.shell.keys().copied().collect();
    ids.sort_unstable();

    let mut outers = Vec::with_capacity(ids.len());
    let mut voids: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut reversed = HashSet::new();
    for &id in &ids {
        if structure.is_wrapper(id) {
            continue;
        }
        match structure.void(id) {
            Some(void) => {
                if void.reversed {
                    reversed.insert(id);
                }
                voids.entry(void.outer).or_default().push(id);
            }
            None => outers.push(id),
        }
    }
    if let Some((outer, _)) = voids.iter().find(|&(outer, _)| !outers.contains(outer)) {
        return Err(KernelError::import(
            path,
            format!("voids reference shell #{outer}, which is not in the file"),
        ));
    }

    let mut solids = Vec::with_capacity(outers.len());
    for (index, &entity_id) in outers.iter().enumerate() {
        let polygon = triangulate_shell(&table, path, index, entity_id, BOUNDS_TOLERANCE, false)
            .map_err(|e| KernelError::import(path, e.to_string()))?;
        let bounds = Aabb::from_points(polygon.positions().iter().map(|p| [p.x, p.y, p.z]))
            .ok_or_else(|| {
                KernelError::import(path, format!("shell #{entity_id} has no geometry"))
            })?;
        solids.push(Solid {
            index,
            entity_id,
            voids: voids.remove(&entity_id).unwrap_or_default(),
            bounds,
        });
    }

    if solids.is_empty() {
        return Err(KernelError::import(path, "no solids found in STEP file"));
    }

    tracing::debug!(
        path = %path.display(),
        solids = solids.len(),
        voids = solids.iter().map(|s| s.voids.len()).sum::<usize>(),
        entities = graph.len(),
        "STEP file loaded"
    );

    Ok(StepDocument {
        path: path.to_path_buf(),
        table,
        solids,
        reversed,
    })
}

impl StepDocument {
    /// Source path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Solids in document order.
    pub fn solids(&self) -> &[Solid] {
        &self.solids
    }

    /// Number of solids.
    pub fn len(&self) -> usize {
        self.solids.len()
    }

    /// True if the document has no solids (never the case for a loaded file).
    pub fn is_empty(&self) -> bool {
        self.solids.is_empty()
    }

    /// True if the document holds more than one solid.
    pub fn is_compound(&self) -> bool {
        self.solids.len() > 1
    }

    /// Bounding box of the whole document.
    pub fn bounds(&self) -> Aabb {
        let mut iter = self.solids.iter().map(|s| s.bounds);
        let first = iter.next().unwrap_or(Aabb::new([0.0; 3], [0.0; 3]));
        iter.fold(first, |acc, b| acc.union(&b))
    }

    /// Tessellate the solids at `indices` into one merged mesh.
    ///
    /// Each solid gets its own chordal tolerance from `deflection` and its
    /// bounding box; void shells are meshed with their solid, facing into
    /// the cavity. Coincident vertices are welded after merging.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidDeflection`] before any kernel work if the
    /// limits are invalid; [`KernelError::Mesh`] if an index is out of
    /// range or a solid yields no triangles.
    pub fn tessellate(&self, indices: &[usize], deflection: &Deflection) -> Result<Mesh> {
        deflection.validate()?;

        let mut merged: Option<PolygonMesh> = None;
        for &index in indices {
            let solid = self.solids.get(index).ok_or_else(|| {
                KernelError::mesh(&self.path, index, "no solid with this index")
            })?;
            let tolerance = deflection.chordal_tolerance(&solid.bounds);
            for &shell in std::iter::once(&solid.entity_id).chain(&solid.voids) {
                let polygon = triangulate_shell(
                    &self.table,
                    &self.path,
                    index,
                    shell,
                    tolerance,
                    self.reversed.contains(&shell),
                )?;

                tracing::trace!(
                    solid = index,
                    shell,
                    tolerance,
                    triangles = polygon.tri_faces().len() + 2 * polygon.quad_faces().len(),
                    "shell tessellated"
                );

                match merged.as_mut() {
                    Some(mesh) => mesh.merge(polygon),
                    None => merged = Some(polygon),
                }
            }
        }

        let polygon = merged.ok_or_else(|| {
            KernelError::mesh(&self.path, 0, "no solids selected for tessellation")
        })?;
        Ok(Mesh::from_polygon(polygon))
    }
}

fn triangulate_shell(
    table: &Table,
    path: &Path,
    index: usize,
    entity_id: u64,
    tolerance: f64,
    reversed: bool,
) -> Result<PolygonMesh> {
    let holder = table
        .shell
        .get(&entity_id)
        .ok_or_else(|| KernelError::mesh(path, index, format!("shell #{entity_id} missing")))?;
    let mut shell = table.to_compressed_shell(holder).map_err(|e| {
        KernelError::mesh(path, index, format!("shell #{entity_id} rejected: {e:?}"))
    })?;
    if reversed {
        for face in &mut shell.faces {
            face.orientation = !face.orientation;
        }
    }
    let polygon = shell.robust_triangulation(tolerance).to_polygon();
    if polygon.tri_faces().is_empty() && polygon.quad_faces().is_empty() {
        return Err(KernelError::mesh(
            path,
            index,
            format!("shell #{entity_id} produced no triangles at tolerance {tolerance}"),
        ));
    }
    Ok(polygon)
}
