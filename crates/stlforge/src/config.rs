//! Conversion settings and the task table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stlforge_kernel::{Deflection, StlFormat};

use crate::error::ConfigError;
use crate::repair::RepairConfig;
use crate::selection::Rule;

/// What a batch does after a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Stop at the first failed task.
    #[default]
    Abort,
    /// Log the failure and run the remaining tasks.
    Continue,
}

/// One input file and how to split it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// STEP file, relative to the input directory.
    pub input: PathBuf,
    /// Output file stem; defaults to the input's file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
    /// Selection rule.
    pub rule: Rule,
    /// Required solid count, checked before selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_solids: Option<usize>,
    /// Per-task deflection override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deflection: Option<Deflection>,
}

impl Task {
    /// A task with no overrides.
    pub fn new(input: impl Into<PathBuf>, rule: Rule) -> Self {
        Self {
            input: input.into(),
            stem: None,
            rule,
            expected_solids: None,
            deflection: None,
        }
    }

    /// Set the output stem.
    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }

    /// Pin the number of solids the input must contain.
    pub fn with_expected_solids(mut self, count: usize) -> Self {
        self.expected_solids = Some(count);
        self
    }

    /// Output stem: the explicit one, or the input's file stem.
    pub fn stem(&self) -> String {
        match &self.stem {
            Some(stem) => stem.clone(),
            None => self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// STL file name for one output label: `<stem>_<label>.stl`, or
    /// `<stem>.stl` when the label is empty.
    pub fn output_name(&self, label: &str) -> String {
        let stem = self.stem();
        if label.is_empty() {
            format!("{stem}.stl")
        } else {
            format!("{stem}_{label}.stl")
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidTask {
            input: self.input.clone(),
            message,
        };

        if self.input.as_os_str().is_empty() {
            return Err(invalid("input path is empty".into()));
        }
        let stem = self.stem();
        if stem.is_empty() {
            return Err(invalid("output stem is empty".into()));
        }
        if stem.contains(['/', '\\']) || stem == ".." {
            return Err(invalid(format!("stem '{stem}' contains a path separator")));
        }
        if let Some(d) = &self.deflection {
            d.validate().map_err(|e| invalid(e.to_string()))?;
        }
        if self.expected_solids == Some(0) {
            return Err(invalid("expected_solids must be at least 1".into()));
        }

        let labels = self.rule.labels();
        if labels.is_empty() {
            return Err(invalid("rule produces no outputs".into()));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if labels.len() > 1 && label.is_empty() {
                return Err(invalid("empty label in a multi-output rule".into()));
            }
            if label.contains(['/', '\\']) {
                return Err(invalid(format!("label '{label}' contains a path separator")));
            }
            if !seen.insert(*label) {
                return Err(invalid(format!("duplicate label '{label}'")));
            }
        }
        Ok(())
    }
}

/// Top-level converter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Directory holding the STEP inputs.
    pub input_dir: PathBuf,
    /// Directory receiving the STL outputs; created if missing.
    pub output_dir: PathBuf,
    /// Default tessellation limits.
    pub deflection: Deflection,
    /// STL encoding.
    pub format: StlFormat,
    /// Batch failure policy.
    pub on_error: OnError,
    /// Optional external mesh repair.
    pub repair: RepairConfig,
    /// Conversion table, run in order.
    #[serde(rename = "task")]
    pub tasks: Vec<Task>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("assets/step"),
            output_dir: PathBuf::from("assets/stl"),
            deflection: Deflection::default(),
            format: StlFormat::default(),
            on_error: OnError::default(),
            repair: RepairConfig::default(),
            tasks: default_tasks(),
        }
    }
}

/// The built-in conversion table for the glasses parts.
pub fn default_tasks() -> Vec<Task> {
    vec![
        Task::new("镜腿外壳.step", Rule::left_right()),
        Task::new("镜腿内壳.step", Rule::left_right()),
        Task::new("眼镜-提取1.step", Rule::Whole { label: "内壳".into() }).with_stem("眼镜框"),
        Task::new("眼镜-提取2.step", Rule::Whole { label: "其余".into() }).with_stem("眼镜框"),
    ]
}

impl ConvertConfig {
    /// Parse a TOML config. Omitted keys keep their defaults.
    pub fn from_toml(text: &str, origin: impl AsRef<Path>) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.as_ref().to_path_buf(),
            source,
        })
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text, path)?;
        tracing::debug!(path = %path.display(), tasks = config.tasks.len(), "loaded config");
        Ok(config)
    }

    /// Check deflection, repair settings and the task table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.deflection
            .validate()
            .map_err(|e| ConfigError::InvalidDeflection(e.to_string()))?;
        self.repair.validate()?;

        if self.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        let mut outputs = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            for label in task.rule.labels() {
                let path = self.output_path(task, label);
                if !outputs.insert(path.clone()) {
                    return Err(ConfigError::DuplicateOutput(path));
                }
            }
        }
        Ok(())
    }

    /// Full path of a task's STEP input.
    pub fn input_path(&self, task: &Task) -> PathBuf {
        self.input_dir.join(&task.input)
    }

    /// Full path of one task output.
    pub fn output_path(&self, task: &Task, label: &str) -> PathBuf {
        self.output_dir.join(task.output_name(label))
    }

    /// Deflection used for `task`.
    pub fn deflection_for(&self, task: &Task) -> Deflection {
        task.deflection.unwrap_or(self.deflection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Axis;

    #[test]
    fn test_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.input_dir, PathBuf::from("assets/step"));
        assert_eq!(config.output_dir, PathBuf::from("assets/stl"));
        assert_eq!(config.deflection, Deflection::new(0.001, 0.05));
        assert_eq!(config.on_error, OnError::Abort);
        assert!(!config.repair.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_table_outputs() {
        let config = ConvertConfig::default();
        let names: Vec<String> = config
            .tasks
            .iter()
            .flat_map(|t| t.rule.labels().into_iter().map(|l| t.output_name(l)))
            .collect();
        assert_eq!(
            names,
            vec![
                "镜腿外壳_左.stl",
                "镜腿外壳_右.stl",
                "镜腿内壳_左.stl",
                "镜腿内壳_右.stl",
                "眼镜框_内壳.stl",
                "眼镜框_其余.stl",
            ]
        );
    }

    #[test]
    fn test_output_name() {
        let task = Task::new("parts/hinge.step", Rule::Whole { label: String::new() });
        assert_eq!(task.stem(), "hinge");
        assert_eq!(task.output_name(""), "hinge.stl");
        assert_eq!(task.output_name("左"), "hinge_左.stl");
        assert_eq!(task.with_stem("铰链").output_name("a"), "铰链_a.stl");
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            input_dir = "in"
            on_error = "continue"
            format = "ascii"

            [deflection]
            linear = 0.01

            [[task]]
            input = "眼镜框.step"
            expected_solids = 12
            rule = { kind = "index", index = 8, label = "内壳", rest = "其余" }

            [[task]]
            input = "镜腿外壳.step"
            rule = { kind = "split", axis = "y", labels = ["前", "后"] }
            deflection = { linear = 0.005, angular = 0.1 }
        "#;
        let config = ConvertConfig::from_toml(text, "test.toml").unwrap();
        assert_eq!(config.input_dir, PathBuf::from("in"));
        assert_eq!(config.output_dir, PathBuf::from("assets/stl"));
        assert_eq!(config.on_error, OnError::Continue);
        assert_eq!(config.format, StlFormat::Ascii);
        assert_eq!(config.deflection, Deflection::new(0.01, 0.05));
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].expected_solids, Some(12));
        assert_eq!(
            config.tasks[1].rule,
            Rule::Split {
                axis: Axis::Y,
                labels: ["前".into(), "后".into()]
            }
        );
        assert_eq!(
            config.deflection_for(&config.tasks[1]),
            Deflection::new(0.005, 0.1)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let text = include_str!("../../../stlforge.toml");
        let config = ConvertConfig::from_toml(text, "stlforge.toml").unwrap();
        assert_eq!(config, ConvertConfig::default());
    }

    #[test]
    fn test_missing_tasks_keep_builtin_table() {
        let config = ConvertConfig::from_toml("output_dir = \"out\"", "x.toml").unwrap();
        assert_eq!(config.tasks, default_tasks());
    }

    #[test]
    fn test_parse_error() {
        let err = ConvertConfig::from_toml("on_error = \"sometimes\"", "bad.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConvertConfig::load("/nonexistent/stlforge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_rejects_bad_deflection() {
        for (linear, angular) in [(0.0, 0.05), (-1.0, 0.05), (0.001, 0.0), (0.001, -0.5)] {
            let config = ConvertConfig {
                deflection: Deflection::new(linear, angular),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidDeflection(_))),
                "linear={linear} angular={angular}"
            );
        }

        let mut config = ConvertConfig::default();
        config.tasks[0].deflection = Some(Deflection::new(0.0, 0.05));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTask { .. })));
    }

    #[test]
    fn test_rejects_bad_tables() {
        let config = ConvertConfig {
            tasks: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoTasks)));

        let config = ConvertConfig {
            tasks: vec![
                Task::new("a.step", Rule::Whole { label: "x".into() }).with_stem("same"),
                Task::new("b.step", Rule::Whole { label: "x".into() }).with_stem("same"),
            ],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateOutput(_))));

        let config = ConvertConfig {
            tasks: vec![Task::new(
                "a.step",
                Rule::Index {
                    index: 0,
                    label: "x".into(),
                    rest: "x".into(),
                },
            )],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTask { .. })));

        let config = ConvertConfig {
            tasks: vec![Task::new("a.step", Rule::Whole { label: "../up".into() })],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTask { .. })));

        for stem in ["../x", "sub/x", "..\\x", ".."] {
            let config = ConvertConfig {
                tasks: vec![Task::new("a.step", Rule::left_right()).with_stem(stem)],
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTask { .. }), "{stem}: {err}");
        }

        let config = ConvertConfig {
            tasks: vec![Task::new("a.step", Rule::left_right()).with_expected_solids(0)],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTask { .. })));
    }
}
