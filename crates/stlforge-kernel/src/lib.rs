#![warn(missing_docs)]

//! STEP to triangle-mesh plumbing for stlforge.
//!
//! A thin facade over the truck CAD kernel: STEP parsing and B-rep shell
//! conversion come from `truck-stepio`, tessellation from `truck-meshalgo`,
//! and STL encoding from `truck-polymesh`. This crate adds deterministic
//! solid ordering, bounding boxes, deflection handling and mesh diagnostics.
//!
//! # Example
//!
//! ```no_run
//! use stlforge_kernel::{read_step, Deflection, StlFormat};
//!
//! let doc = read_step("part.step").unwrap();
//! let all: Vec<usize> = (0..doc.len()).collect();
//! let mesh = doc.tessellate(&all, &Deflection::default()).unwrap();
//! mesh.write_stl("part.stl", StlFormat::Binary).unwrap();
//! ```

mod bounds;
mod deflection;
mod error;
mod mesh;
mod part21;
mod reader;
mod structure;

pub use bounds::Aabb;
pub use deflection::Deflection;
pub use error::{KernelError, Result};
pub use mesh::{Mesh, MeshStats, StlFormat, TriangleMesh};
pub use reader::{read_step, read_step_from_str, Solid, StepDocument};
