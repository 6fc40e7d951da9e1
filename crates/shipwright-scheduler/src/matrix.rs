//! Matrix expansion for parallel instance generation.

use shipwright_core::pipeline::JobDefinition;
use std::collections::BTreeMap;

/// One concrete axis combination for a job.
#[derive(Debug, Clone)]
pub struct MatrixCombination {
    pub index: usize,
    pub values: BTreeMap<String, String>,
    pub display_name: String,
}

/// Expander for matrix configurations.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a job into one combination per matrix entry.
    ///
    /// Unmatrixed jobs expand to a single combination with no axis
    /// values. Combinations are independent; their count for a single
    /// axis equals the axis length.
    pub fn expand(&self, job: &JobDefinition) -> Vec<MatrixCombination> {
        let Some(matrix) = &job.matrix else {
            return vec![MatrixCombination {
                index: 0,
                values: BTreeMap::new(),
                display_name: job.name.clone(),
            }];
        };

        let mut combinations = self.generate_combinations(&matrix.axes);

        // Apply includes
        for include in &matrix.include {
            if !combinations.contains(include) {
                combinations.push(include.clone());
            }
        }

        // Apply excludes
        combinations.retain(|combo| {
            !matrix
                .exclude
                .iter()
                .any(|exclude| matches_exclude(combo, exclude))
        });

        combinations
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                let display_name = format_display_name(&job.name, &values);
                MatrixCombination {
                    index,
                    values,
                    display_name,
                }
            })
            .collect()
    }

    fn generate_combinations(
        &self,
        axes: &BTreeMap<String, Vec<String>>,
    ) -> Vec<BTreeMap<String, String>> {
        if axes.is_empty() {
            return vec![BTreeMap::new()];
        }

        let mut result = vec![BTreeMap::new()];

        for (key, values) in axes {
            let mut new_result = Vec::new();

            for combo in result {
                for value in values {
                    let mut new_combo = combo.clone();
                    new_combo.insert(key.clone(), value.clone());
                    new_result.push(new_combo);
                }
            }

            result = new_result;
        }

        result
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_exclude(combo: &BTreeMap<String, String>, exclude: &BTreeMap<String, String>) -> bool {
    exclude
        .iter()
        .all(|(key, value)| combo.get(key) == Some(value))
}

fn format_display_name(job_name: &str, values: &BTreeMap<String, String>) -> String {
    if values.is_empty() {
        return job_name.to_string();
    }

    let parts: Vec<String> = values
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    format!("{} ({})", job_name, parts.join(", "))
}
