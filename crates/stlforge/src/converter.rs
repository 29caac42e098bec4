//! Table-driven conversion: load, select, tessellate, export.

use std::path::{Path, PathBuf};

use serde::Serialize;
use stlforge_kernel::{read_step, Deflection, KernelError, Mesh, MeshStats, StlFormat};
use tracing::{debug, error, info, info_span, warn};

use crate::config::{ConvertConfig, OnError, Task};
use crate::error::{ConfigError, ConvertError, Result, SelectionError};
use crate::repair::{self, RepairConfig};
use crate::selection::select;

/// One written STL file.
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    /// Selection label.
    pub label: String,
    /// File written.
    pub path: PathBuf,
    /// Source solid indices.
    pub solids: Vec<usize>,
    /// Mesh diagnostics before any repair.
    pub stats: MeshStats,
    /// Final file size.
    pub bytes: u64,
    /// True if the repair tool ran successfully on this file.
    pub repaired: bool,
}

impl OutputReport {
    /// File size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Result of one successful task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// STEP input.
    pub input: PathBuf,
    /// Solids found in the input.
    pub solid_count: usize,
    /// Deflection used.
    pub deflection: Deflection,
    /// Outputs in rule order.
    pub outputs: Vec<OutputReport>,
}

/// A task that failed.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    /// STEP input.
    pub input: PathBuf,
    /// Error category (`import`, `selection`, ...).
    pub kind: String,
    /// Rendered error.
    pub message: String,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Tasks that finished, in run order.
    pub completed: Vec<TaskReport>,
    /// Tasks that failed, in run order.
    pub failed: Vec<TaskFailure>,
    /// Tasks not attempted because the batch aborted.
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    /// True if no task failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Number of STL files written.
    pub fn output_count(&self) -> usize {
        self.completed.iter().map(|t| t.outputs.len()).sum()
    }
}

/// Runs conversion tasks against a validated configuration.
#[derive(Debug, Clone)]
pub struct Converter {
    config: ConvertConfig,
}

impl Converter {
    /// Validate `config` and build a converter.
    pub fn new(config: ConvertConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Run every task in table order.
    pub fn run(&self) -> Result<BatchReport> {
        self.run_where(|_| true)
    }

    /// Run the tasks accepted by `filter`, in table order.
    ///
    /// Fails only if the output directory cannot be created; task errors
    /// are collected in the report according to `on_error`.
    pub fn run_where(&self, filter: impl Fn(&Task) -> bool) -> Result<BatchReport> {
        let out_dir = &self.config.output_dir;
        std::fs::create_dir_all(out_dir).map_err(|e| ConvertError::Io(KernelError::io(out_dir, e)))?;

        let tasks: Vec<&Task> = self.config.tasks.iter().filter(|t| filter(t)).collect();
        info!(tasks = tasks.len(), output = %out_dir.display(), "starting batch");

        let mut report = BatchReport::default();
        for (i, task) in tasks.iter().enumerate() {
            match self.convert_task(task) {
                Ok(done) => report.completed.push(done),
                Err(err) => {
                    error!(input = %task.input.display(), "{err}");
                    report.failed.push(TaskFailure {
                        input: task.input.clone(),
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                    if self.config.on_error == OnError::Abort {
                        report.skipped = tasks[i + 1..].iter().map(|t| t.input.clone()).collect();
                        if !report.skipped.is_empty() {
                            warn!(skipped = report.skipped.len(), "aborting batch");
                        }
                        break;
                    }
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            outputs = report.output_count(),
            "batch finished"
        );
        Ok(report)
    }

    /// Convert one task. Outputs written before an error stay on disk.
    pub fn convert_task(&self, task: &Task) -> Result<TaskReport> {
        let input = self.config.input_path(task);
        let span = info_span!("task", input = %input.display());
        let _guard = span.enter();

        let deflection = self.config.deflection_for(task);
        deflection
            .validate()
            .map_err(|e| ConfigError::InvalidDeflection(e.to_string()))?;

        let doc = read_step(&input)?;
        info!(solids = doc.len(), rule = %task.rule.describe(), "loaded");

        let selection_error = |source| ConvertError::Selection {
            path: input.clone(),
            source,
        };
        if let Some(expected) = task.expected_solids {
            if expected != doc.len() {
                return Err(selection_error(SelectionError::CountMismatch {
                    expected,
                    actual: doc.len(),
                }));
            }
        }
        let selections = select(doc.solids(), &task.rule).map_err(selection_error)?;

        let mut outputs = Vec::with_capacity(selections.len());
        for selection in selections {
            let path = self.config.output_path(task, &selection.label);
            let mesh = doc.tessellate(&selection.indices, &deflection)?;
            let stats = mesh.stats();
            if !stats.is_closed() {
                warn!(
                    label = %selection.label,
                    boundary = stats.boundary_edges,
                    non_manifold = stats.non_manifold_edges,
                    "mesh is not closed"
                );
            }

            let (bytes, repaired) = export(&mesh, &path, self.config.format, &self.config.repair)?;
            info!(
                file = %path.display(),
                solids = selection.indices.len(),
                triangles = stats.triangles,
                bytes,
                repaired,
                "wrote"
            );
            outputs.push(OutputReport {
                label: selection.label,
                path,
                solids: selection.indices,
                stats,
                bytes,
                repaired,
            });
        }

        Ok(TaskReport {
            input,
            solid_count: doc.len(),
            deflection,
            outputs,
        })
    }
}

/// Write `mesh` to `path`, passing it through the repair tool when enabled.
/// Returns the final file size and whether repair succeeded.
fn export(mesh: &Mesh, path: &Path, format: StlFormat, repair_cfg: &RepairConfig) -> Result<(u64, bool)> {
    if !repair_cfg.enabled {
        return Ok((mesh.write_stl(path, format)?, false));
    }

    let raw = raw_path(path);
    mesh.write_stl(&raw, format)?;
    match repair::run_repair(repair_cfg, &raw, path) {
        Ok(stdout) => {
            for line in repair::summary_lines(&stdout) {
                debug!(file = %path.display(), "{line}");
            }
            if let Err(e) = std::fs::remove_file(&raw) {
                warn!(file = %raw.display(), "cannot remove temporary file: {e}");
            }
            let bytes = std::fs::metadata(path)
                .map_err(|e| ConvertError::Io(KernelError::io(path, e)))?
                .len();
            Ok((bytes, true))
        }
        Err(e) => {
            warn!(file = %path.display(), "repair skipped: {e}");
            std::fs::rename(&raw, path).map_err(|e| ConvertError::Io(KernelError::io(path, e)))?;
            let bytes = std::fs::metadata(path)
                .map_err(|e| ConvertError::Io(KernelError::io(path, e)))?
                .len();
            Ok((bytes, false))
        }
    }
}

/// Sibling path for the unrepaired mesh: `x.stl` becomes `x.raw.stl`.
fn raw_path(path: &Path) -> PathBuf {
    path.with_extension("raw.stl")
}
