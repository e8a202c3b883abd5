//! Post-processors derive the final result features from the concatenated
//! aggregator outputs of a temporal bin.

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};

/// Turns an output vector into a result vector.
pub trait PostProcessor: Send + Sync + std::fmt::Debug {
    fn result_feature_names(&self) -> &[String];

    fn process(&self, output: &[f32], result: &mut [f32]);
}

/// Post-processor configuration, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostProcessorConfig {
    /// Keep only some output features. An entry `new=old` renames.
    Selection { var_names: Vec<String> },
    /// `numerator / denominator`, emitted as a single feature.
    Ratio {
        numerator: String,
        denominator: String,
        output_name: String,
    },
}

impl PostProcessorConfig {
    /// Bind to the output feature names of a bin manager.
    pub fn create(&self, output_names: &[String]) -> Result<Box<dyn PostProcessor>> {
        let index = |name: &str| {
            output_names.iter().position(|n| n == name).ok_or_else(|| {
                BinningError::configuration(format!(
                    "post-processor references unknown output feature '{}'",
                    name
                ))
            })
        };

        Ok(match self {
            Self::Selection { var_names } => {
                if var_names.is_empty() {
                    return Err(BinningError::configuration(
                        "selection post-processor needs at least one feature",
                    ));
                }
                let mut names = Vec::with_capacity(var_names.len());
                let mut indices = Vec::with_capacity(var_names.len());
                for entry in var_names {
                    let (new, old) = match entry.split_once('=') {
                        Some((new, old)) => (new.trim(), old.trim()),
                        None => (entry.trim(), entry.trim()),
                    };
                    names.push(new.to_string());
                    indices.push(index(old)?);
                }
                Box::new(Selection { names, indices })
            }
            Self::Ratio {
                numerator,
                denominator,
                output_name,
            } => Box::new(Ratio {
                numerator: index(numerator)?,
                denominator: index(denominator)?,
                names: vec![output_name.clone()],
            }),
        })
    }
}

#[derive(Debug)]
struct Selection {
    names: Vec<String>,
    indices: Vec<usize>,
}

impl PostProcessor for Selection {
    fn result_feature_names(&self) -> &[String] {
        &self.names
    }

    fn process(&self, output: &[f32], result: &mut [f32]) {
        for (slot, &i) in result.iter_mut().zip(&self.indices) {
            *slot = output[i];
        }
    }
}

#[derive(Debug)]
struct Ratio {
    numerator: usize,
    denominator: usize,
    names: Vec<String>,
}

impl PostProcessor for Ratio {
    fn result_feature_names(&self) -> &[String] {
        &self.names
    }

    fn process(&self, output: &[f32], result: &mut [f32]) {
        let d = output[self.denominator];
        result[0] = if d == 0.0 {
            f32::NAN
        } else {
            output[self.numerator] / d
        };
    }
}
