//! Solid membership and placement checks on the raw entity graph.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;

use crate::part21::{EntityGraph, Value};

/// Positions closer than this (mm) are the same point.
const POSITION_TOLERANCE: f64 = 1e-6;
/// Unit directions closer than this are the same direction.
const DIRECTION_TOLERANCE: f64 = 1e-9;

/// A shell bounding a cavity of another solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VoidShell {
    /// Closed shell of the solid that owns the cavity.
    pub(crate) outer: u64,
    /// Faces must be flipped so they face into the cavity.
    pub(crate) reversed: bool,
}

/// Which shells are voids of `BREP_WITH_VOIDS` solids.
#[derive(Debug, Default)]
pub(crate) struct SolidStructure {
    voids: HashMap<u64, VoidShell>,
    wrappers: HashSet<u64>,
}

impl SolidStructure {
    pub(crate) fn from_graph(graph: &EntityGraph) -> Self {
        let mut structure = Self::default();
        // BREP_WITH_VOIDS(name, outer, (voids...))
        for (_, brep) in graph.records_of_type("BREP_WITH_VOIDS") {
            let Some(outer) = brep.args.get(1).and_then(Value::as_ref_id) else {
                continue;
            };
            let voids = brep.args.get(2).and_then(Value::as_list).unwrap_or_default();
            for void in voids.iter().filter_map(Value::as_ref_id) {
                // ORIENTED_CLOSED_SHELL(name, *, closed_shell, orientation)
                let (shell, reversed) = match graph.record(void, "ORIENTED_CLOSED_SHELL") {
                    Some(oriented) => {
                        let Some(shell) = oriented.args.get(2).and_then(Value::as_ref_id) else {
                            continue;
                        };
                        structure.wrappers.insert(void);
                        let flag = oriented.args.get(3).and_then(Value::as_enum);
                        (shell, flag == Some("F"))
                    }
                    None => (void, false),
                };
                structure.voids.insert(shell, VoidShell { outer, reversed });
            }
        }
        structure
    }

    /// The void role of `shell`, if it bounds a cavity.
    pub(crate) fn void(&self, shell: u64) -> Option<VoidShell> {
        self.voids.get(&shell).copied()
    }

    /// True for oriented wrappers whose underlying shell is meshed instead.
    pub(crate) fn is_wrapper(&self, shell: u64) -> bool {
        self.wrappers.contains(&shell)
    }
}

/// Reject placement transforms that would move shells.
///
/// The B-rep table reads shells in their own coordinates, so an assembly
/// that relocates geometry through `MAPPED_ITEM` or
/// `ITEM_DEFINED_TRANSFORMATION` would be meshed in the wrong place.
/// Transforms between identical placements are accepted.
pub(crate) fn check_placements(graph: &EntityGraph) -> Result<(), String> {
    // ITEM_DEFINED_TRANSFORMATION(name, description, item1, item2)
    for (id, transform) in graph.records_of_type("ITEM_DEFINED_TRANSFORMATION") {
        let from = transform.args.get(2).and_then(Value::as_ref_id);
        let to = transform.args.get(3).and_then(Value::as_ref_id);
        if !same_placement(graph, from, to) {
            return Err(format!(
                "ITEM_DEFINED_TRANSFORMATION #{id} moves geometry; placement transforms are not supported"
            ));
        }
    }
    // MAPPED_ITEM(name, REPRESENTATION_MAP(origin, representation), target)
    for (id, item) in graph.records_of_type("MAPPED_ITEM") {
        let origin = item
            .args
            .get(1)
            .and_then(Value::as_ref_id)
            .and_then(|map| graph.record(map, "REPRESENTATION_MAP"))
            .and_then(|map| map.args.first())
            .and_then(Value::as_ref_id);
        let target = item.args.get(2).and_then(Value::as_ref_id);
        if !same_placement(graph, origin, target) {
            return Err(format!(
                "MAPPED_ITEM #{id} moves geometry; placement transforms are not supported"
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    location: Vector3<f64>,
    axis: Vector3<f64>,
    ref_direction: Vector3<f64>,
}

fn same_placement(graph: &EntityGraph, a: Option<u64>, b: Option<u64>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    if a == b {
        return true;
    }
    match (frame(graph, a), frame(graph, b)) {
        (Some(a), Some(b)) => {
            (a.location - b.location).norm() <= POSITION_TOLERANCE
                && (a.axis - b.axis).norm() <= DIRECTION_TOLERANCE
                && (a.ref_direction - b.ref_direction).norm() <= DIRECTION_TOLERANCE
        }
        _ => false,
    }
}

/// AXIS2_PLACEMENT_3D(name, location, axis, ref_direction); `$` axes
/// default to +Z and +X.
fn frame(graph: &EntityGraph, id: u64) -> Option<Frame> {
    let placement = graph.record(id, "AXIS2_PLACEMENT_3D")?;
    let location = triple(graph, placement.args.get(1)?.as_ref_id()?, "CARTESIAN_POINT")?;
    let direction = |index: usize, default: Vector3<f64>| -> Option<Vector3<f64>> {
        match placement.args.get(index) {
            None | Some(Value::Null) => Some(default),
            Some(value) => triple(graph, value.as_ref_id()?, "DIRECTION")?.try_normalize(0.0),
        }
    };
    Some(Frame {
        location,
        axis: direction(2, Vector3::z())?,
        ref_direction: direction(3, Vector3::x())?,
    })
}

/// Coordinates of a CARTESIAN_POINT or DIRECTION; missing components are 0.
fn triple(graph: &EntityGraph, id: u64, type_name: &str) -> Option<Vector3<f64>> {
    let coords = graph.record(id, type_name)?.args.get(1)?.as_list()?;
    let mut v = Vector3::zeros();
    for (i, c) in coords.iter().take(3).enumerate() {
        v[i] = c.as_real()?;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(body: &str) -> EntityGraph {
        EntityGraph::parse(&format!("DATA;\n{body}\nENDSEC;")).unwrap()
    }

    const PLACEMENTS: &str = "
#1 = CARTESIAN_POINT('', (0., 0., 0.));
#2 = CARTESIAN_POINT('', (0., 0., 0.));
#3 = CARTESIAN_POINT('', (5., 0., 0.));
#4 = DIRECTION('', (0., 0., 2.));
#10 = AXIS2_PLACEMENT_3D('', #1, $, $);
#11 = AXIS2_PLACEMENT_3D('', #2, #4, $);
#12 = AXIS2_PLACEMENT_3D('', #3, $, $);
#13 = DIRECTION('', (0., 1., 0.));
#14 = AXIS2_PLACEMENT_3D('', #1, #13, $);";

    #[test]
    fn test_voids_follow_orientation() {
        let g = graph(
            "#1 = CLOSED_SHELL('', ());
#2 = CLOSED_SHELL('', ());
#3 = CLOSED_SHELL('', ());
#4 = ORIENTED_CLOSED_SHELL('', *, #2, .F.);
#5 = ORIENTED_CLOSED_SHELL('', *, #3, .T.);
#6 = BREP_WITH_VOIDS('', #1, (#4, #5));",
        );
        let s = SolidStructure::from_graph(&g);
        assert_eq!(s.void(1), None);
        assert_eq!(s.void(2), Some(VoidShell { outer: 1, reversed: true }));
        assert_eq!(s.void(3), Some(VoidShell { outer: 1, reversed: false }));
        assert!(s.is_wrapper(4) && s.is_wrapper(5));
        assert!(!s.is_wrapper(2));
    }

    #[test]
    fn test_default_axes_match_explicit() {
        let g = graph(PLACEMENTS);
        assert!(same_placement(&g, Some(10), Some(11)));
        assert!(!same_placement(&g, Some(10), Some(12)));
        assert!(!same_placement(&g, Some(10), Some(14)));
        assert!(!same_placement(&g, Some(10), None));
        assert!(!same_placement(&g, Some(10), Some(1)));
    }

    #[test]
    fn test_check_placements() {
        let ok = graph(&format!(
            "{PLACEMENTS}\n#20 = ITEM_DEFINED_TRANSFORMATION('', '', #10, #11);"
        ));
        assert!(check_placements(&ok).is_ok());

        let moved = graph(&format!(
            "{PLACEMENTS}\n#20 = ITEM_DEFINED_TRANSFORMATION('', '', #10, #12);"
        ));
        let err = check_placements(&moved).unwrap_err();
        assert!(err.contains("#20"), "{err}");

        let mapped = graph(&format!(
            "{PLACEMENTS}\n#20 = REPRESENTATION_MAP(#10, #1);\n#21 = MAPPED_ITEM('', #20, #14);"
        ));
        assert!(check_placements(&mapped).unwrap_err().contains("MAPPED_ITEM #21"));
    }
}
