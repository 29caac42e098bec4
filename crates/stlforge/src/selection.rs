//! Selection rules: which solids of a document go to which output.
//!
//! Every rule partitions the document. Outputs are returned in rule order and
//! each carries the solid indices in document order, so repeated runs produce
//! the same files.

use serde::{Deserialize, Serialize};
use stlforge_kernel::Solid;

use crate::error::SelectionError;

/// Default labels for a two-way split, low side first.
pub const SPLIT_LABELS: [&str; 2] = ["左", "右"];

/// World axis used by [`Rule::Split`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// X (left/right for the glasses frame).
    #[default]
    X,
    /// Y.
    Y,
    /// Z.
    Z,
}

impl Axis {
    fn component(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A named list of solid indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Output label.
    pub label: String,
    /// Solid indices in this output.
    pub indices: Vec<usize>,
}

/// How a document's solids map to output files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rule {
    /// Every solid in one output.
    Whole {
        /// Output label; empty means the bare stem.
        #[serde(default)]
        label: String,
    },
    /// Two outputs split at the midpoint of the solid centres along `axis`.
    Split {
        /// Split axis.
        #[serde(default)]
        axis: Axis,
        /// Labels for the low and high side.
        #[serde(default = "default_split_labels")]
        labels: [String; 2],
    },
    /// One solid by index, everything else in a second output.
    Index {
        /// Index of the singled-out solid.
        index: usize,
        /// Label of the singled-out solid.
        label: String,
        /// Label of the remaining solids.
        rest: String,
    },
    /// Explicit index lists, with an optional catch-all.
    Groups {
        /// Outputs in order.
        groups: Vec<Group>,
        /// Label for solids not listed in any group.
        #[serde(default)]
        rest: Option<String>,
    },
}

fn default_split_labels() -> [String; 2] {
    SPLIT_LABELS.map(String::from)
}

impl Rule {
    /// Split along X into the default left/right labels.
    pub fn left_right() -> Self {
        Rule::Split {
            axis: Axis::X,
            labels: default_split_labels(),
        }
    }

    /// Output labels this rule produces, in output order.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Rule::Whole { label } => vec![label.as_str()],
            Rule::Split { labels, .. } => labels.iter().map(String::as_str).collect(),
            Rule::Index { label, rest, .. } => vec![label.as_str(), rest.as_str()],
            Rule::Groups { groups, rest } => groups
                .iter()
                .map(|g| g.label.as_str())
                .chain(rest.as_deref())
                .collect(),
        }
    }

    /// Short human-readable form, e.g. `split x` or `index 8`.
    pub fn describe(&self) -> String {
        match self {
            Rule::Whole { .. } => "whole".to_string(),
            Rule::Split { axis, .. } => format!("split {}", format!("{axis:?}").to_lowercase()),
            Rule::Index { index, .. } => format!("index {index}"),
            Rule::Groups { groups, .. } => format!("{} group(s)", groups.len()),
        }
    }
}

/// One output of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Output label.
    pub label: String,
    /// Solid indices, ascending.
    pub indices: Vec<usize>,
}

impl Selection {
    fn new(label: &str, mut indices: Vec<usize>) -> Result<Self, SelectionError> {
        if indices.is_empty() {
            return Err(SelectionError::EmptyOutput {
                label: label.to_string(),
            });
        }
        indices.sort_unstable();
        Ok(Self {
            label: label.to_string(),
            indices,
        })
    }
}

/// Apply `rule` to a document's solids.
///
/// Fails instead of writing an empty or partial output.
pub fn select(solids: &[Solid], rule: &Rule) -> Result<Vec<Selection>, SelectionError> {
    if solids.is_empty() {
        return Err(SelectionError::EmptyDocument);
    }
    let count = solids.len();

    match rule {
        Rule::Whole { label } => Ok(vec![Selection::new(label, (0..count).collect())?]),

        Rule::Split { axis, labels } => {
            let c = axis.component();
            let centres: Vec<f64> = solids.iter().map(|s| s.bounds.center()[c]).collect();
            let lo = centres.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = centres.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mid = (lo + hi) / 2.0;

            let (low, high): (Vec<usize>, Vec<usize>) = (0..count).partition(|&i| centres[i] < mid);
            tracing::debug!(axis = ?axis, mid, low = low.len(), high = high.len(), "split");
            Ok(vec![
                Selection::new(&labels[0], low)?,
                Selection::new(&labels[1], high)?,
            ])
        }

        Rule::Index { index, label, rest } => {
            if *index >= count {
                return Err(SelectionError::IndexOutOfRange {
                    index: *index,
                    count,
                });
            }
            let others = (0..count).filter(|i| i != index).collect();
            Ok(vec![
                Selection::new(label, vec![*index])?,
                Selection::new(rest, others)?,
            ])
        }

        Rule::Groups { groups, rest } => {
            let mut assigned = vec![false; count];
            let mut out = Vec::with_capacity(groups.len() + 1);
            for group in groups {
                for &index in &group.indices {
                    let slot = assigned
                        .get_mut(index)
                        .ok_or(SelectionError::IndexOutOfRange { index, count })?;
                    if *slot {
                        return Err(SelectionError::DuplicateIndex(index));
                    }
                    *slot = true;
                }
                out.push(Selection::new(&group.label, group.indices.clone())?);
            }

            let unassigned: Vec<usize> = (0..count).filter(|&i| !assigned[i]).collect();
            match rest {
                Some(label) => out.push(Selection::new(label, unassigned)?),
                None if !unassigned.is_empty() => {
                    return Err(SelectionError::Unassigned(unassigned))
                }
                None => {}
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stlforge_kernel::Aabb;

    fn solid(index: usize, min: [f64; 3], max: [f64; 3]) -> Solid {
        Solid {
            index,
            entity_id: index as u64 + 1,
            voids: Vec::new(),
            bounds: Aabb::new(min, max),
        }
    }

    /// Unit cubes with their minimum corner at `x` along X.
    fn row(xs: &[f64]) -> Vec<Solid> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| solid(i, [x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]))
            .collect()
    }

    fn covers_all(selections: &[Selection], count: usize) -> bool {
        let mut all: Vec<usize> = selections.iter().flat_map(|s| s.indices.clone()).collect();
        all.sort_unstable();
        all == (0..count).collect::<Vec<_>>()
    }

    #[test]
    fn test_whole() {
        let solids = row(&[0.0, 5.0, 9.0]);
        let out = select(&solids, &Rule::Whole { label: "内壳".into() }).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "内壳");
        assert_eq!(out[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_split_mirrored_pair() {
        let solids = row(&[30.0, -31.0]);
        let out = select(&solids, &Rule::left_right()).unwrap();
        assert_eq!(out[0].label, "左");
        assert_eq!(out[0].indices, vec![1]);
        assert_eq!(out[1].label, "右");
        assert_eq!(out[1].indices, vec![0]);
    }

    #[test]
    fn test_split_uses_midpoint_of_centres() {
        // Centres at 0.5, 1.5, 2.5 and 10.5: midpoint 5.5, so three go low.
        let solids = row(&[0.0, 1.0, 2.0, 10.0]);
        let out = select(&solids, &Rule::left_right()).unwrap();
        assert_eq!(out[0].indices, vec![0, 1, 2]);
        assert_eq!(out[1].indices, vec![3]);
        assert!(covers_all(&out, 4));
    }

    #[test]
    fn test_split_other_axis() {
        let solids = vec![
            solid(0, [0.0, 0.0, 5.0], [1.0, 1.0, 6.0]),
            solid(1, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
        ];
        let rule = Rule::Split {
            axis: Axis::Z,
            labels: ["下".into(), "上".into()],
        };
        let out = select(&solids, &rule).unwrap();
        assert_eq!(out[0], Selection { label: "下".into(), indices: vec![1] });
        assert_eq!(out[1], Selection { label: "上".into(), indices: vec![0] });
    }

    #[test]
    fn test_split_single_solid_fails() {
        let err = select(&row(&[0.0]), &Rule::left_right()).unwrap_err();
        assert_eq!(err, SelectionError::EmptyOutput { label: "右".into() });
    }

    #[test]
    fn test_split_coincident_centres_fails() {
        let err = select(&row(&[2.0, 2.0]), &Rule::left_right()).unwrap_err();
        assert!(matches!(err, SelectionError::EmptyOutput { .. }));
    }

    #[test]
    fn test_index_rule() {
        let solids = row(&(0..12).map(f64::from).collect::<Vec<_>>());
        let rule = Rule::Index {
            index: 8,
            label: "内壳".into(),
            rest: "其余".into(),
        };
        let out = select(&solids, &rule).unwrap();
        assert_eq!(out[0].indices, vec![8]);
        assert_eq!(out[1].indices.len(), 11);
        assert!(!out[1].indices.contains(&8));
        assert!(covers_all(&out, 12));
    }

    #[test]
    fn test_index_out_of_range() {
        let rule = Rule::Index {
            index: 8,
            label: "a".into(),
            rest: "b".into(),
        };
        let err = select(&row(&[0.0, 1.0, 2.0]), &rule).unwrap_err();
        assert_eq!(err, SelectionError::IndexOutOfRange { index: 8, count: 3 });
    }

    #[test]
    fn test_index_without_rest_fails() {
        let rule = Rule::Index {
            index: 0,
            label: "a".into(),
            rest: "b".into(),
        };
        let err = select(&row(&[0.0]), &rule).unwrap_err();
        assert_eq!(err, SelectionError::EmptyOutput { label: "b".into() });
    }

    #[test]
    fn test_groups_with_rest() {
        let rule = Rule::Groups {
            groups: vec![
                Group { label: "a".into(), indices: vec![3, 1] },
                Group { label: "b".into(), indices: vec![0] },
            ],
            rest: Some("rest".into()),
        };
        let out = select(&row(&[0.0, 1.0, 2.0, 3.0, 4.0]), &rule).unwrap();
        assert_eq!(out[0].indices, vec![1, 3]);
        assert_eq!(out[1].indices, vec![0]);
        assert_eq!(out[2].indices, vec![2, 4]);
        assert!(covers_all(&out, 5));
    }

    #[test]
    fn test_groups_errors() {
        let solids = row(&[0.0, 1.0, 2.0]);
        let group = |label: &str, indices: Vec<usize>| Group { label: label.into(), indices };

        let dup = Rule::Groups {
            groups: vec![group("a", vec![0]), group("b", vec![0, 1, 2])],
            rest: None,
        };
        assert_eq!(select(&solids, &dup).unwrap_err(), SelectionError::DuplicateIndex(0));

        let missing = Rule::Groups {
            groups: vec![group("a", vec![0])],
            rest: None,
        };
        assert_eq!(
            select(&solids, &missing).unwrap_err(),
            SelectionError::Unassigned(vec![1, 2])
        );

        let range = Rule::Groups {
            groups: vec![group("a", vec![7])],
            rest: None,
        };
        assert!(matches!(
            select(&solids, &range).unwrap_err(),
            SelectionError::IndexOutOfRange { index: 7, .. }
        ));

        let empty_rest = Rule::Groups {
            groups: vec![group("a", vec![0, 1, 2])],
            rest: Some("rest".into()),
        };
        assert!(matches!(
            select(&solids, &empty_rest).unwrap_err(),
            SelectionError::EmptyOutput { .. }
        ));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(
            select(&[], &Rule::Whole { label: String::new() }).unwrap_err(),
            SelectionError::EmptyDocument
        );
    }

    #[test]
    fn test_rule_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rule: Rule,
        }
        let w: Wrapper = toml::from_str("rule = { kind = \"split\" }").unwrap();
        assert_eq!(w.rule, Rule::left_right());

        let w: Wrapper =
            toml::from_str("rule = { kind = \"index\", index = 8, label = \"内壳\", rest = \"其余\" }")
                .unwrap();
        assert_eq!(w.rule.labels(), vec!["内壳", "其余"]);
        assert_eq!(w.rule.describe(), "index 8");
    }
}
