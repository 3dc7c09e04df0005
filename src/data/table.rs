//! Canonical tables: the raw measurement table, the metadata table and the aligned
//! `SampleTable` that every statistical stage reads from.

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};

/// Normalise a header or identifier before it takes part in a join:
/// surrounding whitespace is trimmed, inner whitespace runs become `_`, and the
/// result is lower-cased.
pub fn sanitize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// A measured quantity (metabolite / feature), optionally grouped into a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub family: Option<String>,
}

impl Variable {
    pub fn new(name: &str) -> Self {
        Variable {
            name: sanitize_name(name),
            family: None,
        }
    }

    pub fn with_family(name: &str, family: &str) -> Self {
        let family = family.trim();
        Variable {
            name: sanitize_name(name),
            family: if family.is_empty() {
                None
            } else {
                Some(family.to_string())
            },
        }
    }
}

/// How a group's measurement vector treats missing (`NaN`) entries.
///
/// The two-group comparison drops them, the multi-group comparison replaces them
/// with zero so that every group keeps all of its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValuePolicy {
    Drop,
    ZeroFill,
}

impl MissingValuePolicy {
    pub fn apply(self, values: impl Iterator<Item = f64>) -> Vec<f64> {
        match self {
            MissingValuePolicy::Drop => values.filter(|v| !v.is_nan()).collect(),
            MissingValuePolicy::ZeroFill => values
                .map(|v| if v.is_nan() { 0.0 } else { v })
                .collect(),
        }
    }
}

fn check_unique(names: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(StatError::Schema(format!(
                "duplicate {} '{}' after name sanitization",
                what, name
            )));
        }
    }
    Ok(())
}

/// Wide measurement table: one row per sample, one column per variable.
/// Missing or non-numeric cells are stored as `NaN`.
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    sample_ids: Vec<String>,
    variables: Vec<Variable>,
    values: Array2<f64>,
}

impl MeasurementTable {
    pub fn new(sample_ids: Vec<String>, variables: Vec<Variable>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != sample_ids.len() || values.ncols() != variables.len() {
            return Err(StatError::Schema(format!(
                "measurement matrix is {}x{} but {} samples and {} variables were given",
                values.nrows(),
                values.ncols(),
                sample_ids.len(),
                variables.len()
            )));
        }

        let sample_ids: Vec<String> = sample_ids.iter().map(|s| sanitize_name(s)).collect();
        check_unique(&sample_ids, "sample id")?;
        let names: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();
        check_unique(&names, "variable name")?;

        Ok(MeasurementTable {
            sample_ids,
            variables,
            values,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }
}

/// Sample metadata: sample identifier → one or more categorical columns.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    sample_ids: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<String>,
    data: Vec<Vec<Option<String>>>,
}

impl Metadata {
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let sample_ids: Vec<String> = sample_ids.iter().map(|s| sanitize_name(s)).collect();
        check_unique(&sample_ids, "metadata sample id")?;
        let index = sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Ok(Metadata {
            sample_ids,
            index,
            columns: Vec::new(),
            data: Vec::new(),
        })
    }

    /// Add a categorical column. Empty strings are stored as missing.
    pub fn add_column(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(StatError::Schema(format!(
                "metadata column '{}' has {} values, expected {}",
                name,
                values.len(),
                self.sample_ids.len()
            )));
        }
        let name = sanitize_name(name);
        if self.columns.contains(&name) {
            return Err(StatError::Schema(format!(
                "duplicate metadata column '{}'",
                name
            )));
        }
        let values = values
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
            .collect();
        self.columns.push(name);
        self.data.push(values);
        Ok(())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == &sanitize_name(name))
    }

    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        let name = sanitize_name(name);
        self.columns
            .iter()
            .position(|c| c == &name)
            .map(|i| self.data[i].as_slice())
    }

    /// Label of `sample_id` in `column`, `None` if either is unknown or the cell is empty.
    pub fn value(&self, sample_id: &str, column: &str) -> Option<&str> {
        let row = *self.index.get(sample_id)?;
        self.column(column)?.get(row)?.as_deref()
    }

    /// Distinct non-missing values of a column in order of first appearance.
    pub fn distinct_values(&self, column: &str) -> Option<Vec<String>> {
        let values = self.column(column)?;
        let mut seen = HashSet::new();
        Some(
            values
                .iter()
                .flatten()
                .filter(|v| seen.insert(v.as_str()))
                .cloned()
                .collect(),
        )
    }
}

/// Aligned sample × variable × condition data. Built once per run by
/// [`crate::data::align`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct SampleTable {
    sample_ids: Vec<String>,
    variables: Vec<Variable>,
    values: Array2<f64>,
    labels: Vec<String>,
    conditions: Vec<String>,
}

impl SampleTable {
    /// Assemble a table from already aligned parts. `conditions` lists the accepted
    /// condition labels in reporting order; every label in `labels` must be one of them.
    pub fn new(
        sample_ids: Vec<String>,
        variables: Vec<Variable>,
        values: Array2<f64>,
        labels: Vec<String>,
        conditions: Vec<String>,
    ) -> Result<Self> {
        if values.nrows() != sample_ids.len()
            || labels.len() != sample_ids.len()
            || values.ncols() != variables.len()
        {
            return Err(StatError::Schema(format!(
                "inconsistent sample table: {} ids, {} labels, {}x{} values, {} variables",
                sample_ids.len(),
                labels.len(),
                values.nrows(),
                values.ncols(),
                variables.len()
            )));
        }
        if let Some(label) = labels.iter().find(|l| !conditions.contains(l)) {
            return Err(StatError::Schema(format!(
                "sample label '{}' is not an accepted condition",
                label
            )));
        }
        Ok(SampleTable {
            sample_ids,
            variables,
            values,
            labels,
            conditions,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Accepted conditions that have at least one sample, in reporting order.
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn column(&self, var_idx: usize) -> ArrayView1<'_, f64> {
        self.values.column(var_idx)
    }

    /// Row indices of each condition's samples, in condition order.
    pub fn group_indices(&self) -> Vec<(String, Vec<usize>)> {
        self.conditions
            .iter()
            .map(|cond| {
                let idx = self
                    .labels
                    .iter()
                    .enumerate()
                    .filter_map(|(i, l)| if l == cond { Some(i) } else { None })
                    .collect();
                (cond.clone(), idx)
            })
            .collect()
    }

    /// Per-condition measurement vectors of one variable under `policy`.
    pub fn group_values(&self, var_idx: usize, policy: MissingValuePolicy) -> Vec<(String, Vec<f64>)> {
        let column = self.column(var_idx);
        self.group_indices()
            .into_iter()
            .map(|(cond, idx)| {
                let values = policy.apply(idx.iter().map(|&i| column[i]));
                (cond, values)
            })
            .collect()
    }

    /// Collapse variables into their families by summing, per sample, the observed
    /// values of each family's members. Variables without a family are left out.
    /// A sample with no observed member keeps a missing (`NaN`) family value.
    pub fn aggregate_families(&self) -> Result<SampleTable> {
        let mut families: Vec<String> = Vec::new();
        for family in self.variables.iter().filter_map(|v| v.family.as_ref()) {
            if !families.contains(family) {
                families.push(family.clone());
            }
        }
        if families.is_empty() {
            return Err(StatError::EmptyResult(
                "no variable carries a family annotation".to_string(),
            ));
        }

        let mut values = Array2::from_elem((self.n_samples(), families.len()), f64::NAN);
        for (j, family) in families.iter().enumerate() {
            let members: Vec<usize> = self
                .variables
                .iter()
                .enumerate()
                .filter_map(|(i, v)| (v.family.as_ref() == Some(family)).then_some(i))
                .collect();
            for (row, sample) in self.values.axis_iter(Axis(0)).enumerate() {
                let observed: Vec<f64> = members
                    .iter()
                    .map(|&m| sample[m])
                    .filter(|v| !v.is_nan())
                    .collect();
                if !observed.is_empty() {
                    values[[row, j]] = observed.iter().sum();
                }
            }
        }

        let variables = families
            .iter()
            .map(|f| Variable::with_family(&format!("sum_{}", f), f))
            .collect();
        SampleTable::new(
            self.sample_ids.clone(),
            variables,
            values,
            self.labels.clone(),
            self.conditions.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Glucose 6 Phosphate "), "glucose_6_phosphate");
        assert_eq!(sanitize_name("Sample\tID"), "sample_id");
        assert_eq!(sanitize_name("already_clean"), "already_clean");
    }

    #[test]
    fn test_duplicate_variable_after_sanitization() {
        let result = MeasurementTable::new(
            vec!["s1".into()],
            vec![Variable::new("Alanine A"), Variable::new("alanine_a")],
            array![[1.0, 2.0]],
        );
        assert!(matches!(result, Err(StatError::Schema(_))));
    }

    #[test]
    fn test_missing_value_policies() {
        let raw = vec![1.0, f64::NAN, 3.0];
        assert_eq!(MissingValuePolicy::Drop.apply(raw.iter().copied()), vec![1.0, 3.0]);
        assert_eq!(
            MissingValuePolicy::ZeroFill.apply(raw.iter().copied()),
            vec![1.0, 0.0, 3.0]
        );
    }

    #[test]
    fn test_infinite_value_is_not_missing() {
        let raw = vec![f64::INFINITY, f64::NAN, 2.0];
        let kept = MissingValuePolicy::Drop.apply(raw.iter().copied());
        assert_eq!(kept.len(), 2);
        assert!(kept[0].is_infinite());
        let filled = MissingValuePolicy::ZeroFill.apply(raw.iter().copied());
        assert_eq!(filled[1], 0.0);
        assert!(filled[0].is_infinite());
    }

    #[test]
    fn test_metadata_distinct_values_keep_first_seen_order() {
        let mut meta = Metadata::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]).unwrap();
        meta.add_column(
            "Group",
            vec![Some("drug".into()), Some("ctrl".into()), None, Some("drug".into())],
        )
        .unwrap();
        assert!(meta.has_column("group"));
        assert_eq!(meta.distinct_values("group").unwrap(), vec!["drug", "ctrl"]);
        assert_eq!(meta.value("b", "group"), Some("ctrl"));
        assert_eq!(meta.value("c", "group"), None);
    }

    #[test]
    fn test_group_values_follow_condition_order() {
        let table = SampleTable::new(
            vec!["s1".into(), "s2".into(), "s3".into()],
            vec![Variable::new("m1")],
            array![[1.0], [f64::NAN], [3.0]],
            vec!["b".into(), "a".into(), "b".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();

        let dropped = table.group_values(0, MissingValuePolicy::Drop);
        assert_eq!(dropped[0], ("a".to_string(), vec![]));
        assert_eq!(dropped[1], ("b".to_string(), vec![1.0, 3.0]));

        let filled = table.group_values(0, MissingValuePolicy::ZeroFill);
        assert_eq!(filled[0], ("a".to_string(), vec![0.0]));
    }

    #[test]
    fn test_aggregate_families() {
        let table = SampleTable::new(
            vec!["s1".into(), "s2".into()],
            vec![
                Variable::with_family("pc 34:1", "PC"),
                Variable::with_family("pc 36:2", "PC"),
                Variable::with_family("tg 52:3", "TG"),
                Variable::new("unassigned"),
            ],
            array![[1.0, 2.0, 5.0, 9.0], [f64::NAN, 4.0, f64::NAN, 9.0]],
            vec!["a".into(), "b".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();

        let families = table.aggregate_families().unwrap();
        assert_eq!(families.n_variables(), 2);
        assert_eq!(families.variables()[0].name, "sum_pc");
        assert_eq!(families.values()[[0, 0]], 3.0);
        assert_eq!(families.values()[[1, 0]], 4.0);
        assert!(families.values()[[1, 1]].is_nan());
    }
}
