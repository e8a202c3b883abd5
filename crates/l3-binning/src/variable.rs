//! Input variables and the validity mask.
//!
//! A [`VariableContext`] fixes the order of the per-pixel value vector that
//! aggregators index into. Raw variables are read from the product band of
//! the same name; derived variables are computed from an expression over
//! raw variables and earlier derived ones.

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};
use crate::expr::{CompiledExpr, ParsedExpr};
use crate::product::{Product, TileRect};

/// Declaration of one input variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Variable name, referenced by aggregators and expressions.
    pub name: String,
    /// Expression for a derived variable; `None` reads the band `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
}

impl VariableConfig {
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: None,
        }
    }

    pub fn derived(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: Some(expr.into()),
        }
    }
}

#[derive(Debug, Clone)]
enum VariableKind {
    Raw,
    Derived(CompiledExpr),
}

/// Ordered variables plus the optional mask expression.
#[derive(Debug, Clone)]
pub struct VariableContext {
    names: Vec<String>,
    kinds: Vec<VariableKind>,
    mask: Option<CompiledExpr>,
    mask_source: Option<String>,
}

/// Raw band data of one tile, in variable order.
#[derive(Debug)]
pub struct TileSamples {
    pub rect: TileRect,
    raw: Vec<Option<Vec<f32>>>,
}

impl VariableContext {
    /// Build a context.
    ///
    /// Names referenced by the mask, by derived expressions, or listed in
    /// `required` that are not declared become raw variables appended after
    /// the declared ones.
    pub fn new(
        configs: &[VariableConfig],
        mask_expr: Option<&str>,
        required: &[String],
    ) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut parsed: Vec<Option<ParsedExpr>> = Vec::new();

        for config in configs {
            if names.contains(&config.name) {
                return Err(BinningError::configuration(format!(
                    "variable '{}' declared twice",
                    config.name
                )));
            }
            names.push(config.name.clone());
            parsed.push(match &config.expr {
                Some(src) => Some(ParsedExpr::parse(src)?),
                None => None,
            });
        }

        let mask = match mask_expr.map(str::trim).filter(|s| !s.is_empty()) {
            Some(src) => Some((src.to_string(), ParsedExpr::parse(src)?)),
            None => None,
        };

        // Implicit raw variables.
        let mut referenced: Vec<String> = parsed
            .iter()
            .flatten()
            .flat_map(ParsedExpr::variable_names)
            .collect();
        if let Some((_, expr)) = &mask {
            referenced.extend(expr.variable_names());
        }
        referenced.extend(required.iter().cloned());
        for name in referenced {
            if !names.contains(&name) {
                names.push(name);
                parsed.push(None);
            }
        }

        let lookup = |n: &str| names.iter().position(|x| x == n);
        let mut kinds = Vec::with_capacity(names.len());
        for (index, expr) in parsed.iter().enumerate() {
            match expr {
                None => kinds.push(VariableKind::Raw),
                Some(expr) => {
                    let compiled = expr.bind(&lookup).map_err(|msg| {
                        BinningError::expression(configs[index].expr.clone().unwrap_or_default(), msg)
                    })?;
                    // Derived values are computed in index order.
                    for name in expr.variable_names() {
                        let dep = lookup(&name).unwrap_or(usize::MAX);
                        if dep >= index && parsed.get(dep).map_or(false, Option::is_some) {
                            return Err(BinningError::configuration(format!(
                                "derived variable '{}' references '{}' which is not defined before it",
                                names[index], name
                            )));
                        }
                    }
                    kinds.push(VariableKind::Derived(compiled));
                }
            }
        }

        let (mask_source, mask) = match mask {
            Some((src, expr)) => {
                let compiled = expr
                    .bind(&lookup)
                    .map_err(|msg| BinningError::expression(src.clone(), msg))?;
                (Some(src), Some(compiled))
            }
            None => (None, None),
        };

        Ok(Self {
            names,
            kinds,
            mask,
            mask_source,
        })
    }

    /// Number of variables, i.e. the length of a pixel value vector.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn mask_expr(&self) -> Option<&str> {
        self.mask_source.as_deref()
    }

    /// Names of the bands that must be read from a product.
    pub fn raw_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .zip(&self.kinds)
            .filter(|(_, k)| matches!(k, VariableKind::Raw))
            .map(|(n, _)| n.as_str())
    }

    /// Read the raw bands of one tile.
    pub fn read_tile(&self, product: &dyn Product, rect: TileRect) -> Result<TileSamples> {
        let expected = rect.width * rect.height;
        let mut raw = Vec::with_capacity(self.names.len());
        for (name, kind) in self.names.iter().zip(&self.kinds) {
            match kind {
                VariableKind::Raw => {
                    let data = product.read_band(name, rect)?;
                    if data.len() != expected {
                        return Err(BinningError::product(format!(
                            "band '{}' of '{}' returned {} values for a {}x{} tile",
                            name,
                            product.name(),
                            data.len(),
                            rect.width,
                            rect.height
                        )));
                    }
                    raw.push(Some(data));
                }
                VariableKind::Derived(_) => raw.push(None),
            }
        }
        Ok(TileSamples { rect, raw })
    }

    /// Fill `values` with all variables of the pixel at `index` within the tile.
    pub fn pixel_values(&self, tile: &TileSamples, index: usize, values: &mut [f32]) {
        for (i, data) in tile.raw.iter().enumerate() {
            if let Some(data) = data {
                values[i] = data[index];
            }
        }
        for (i, kind) in self.kinds.iter().enumerate() {
            if let VariableKind::Derived(expr) = kind {
                values[i] = expr.eval(values) as f32;
            }
        }
    }

    /// Evaluate the mask; without a mask every pixel is valid.
    pub fn is_valid(&self, values: &[f32]) -> bool {
        self.mask.as_ref().map_or(true, |m| m.eval_bool(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_raw_variables() {
        let ctx = VariableContext::new(
            &[VariableConfig::derived("ndvi", "(nir - red) / (nir + red)")],
            Some("flags == 0"),
            &["chl".to_string()],
        )
        .unwrap();
        assert_eq!(ctx.names(), &["ndvi", "nir", "red", "flags", "chl"]);
        assert_eq!(
            ctx.raw_names().collect::<Vec<_>>(),
            vec!["nir", "red", "flags", "chl"]
        );
        assert_eq!(ctx.mask_expr(), Some("flags == 0"));
    }

    #[test]
    fn test_derived_and_mask_evaluation() {
        let ctx = VariableContext::new(
            &[
                VariableConfig::raw("a"),
                VariableConfig::derived("twice", "2 * a"),
                VariableConfig::derived("plus", "twice + 1"),
            ],
            Some("plus > 4"),
            &[],
        )
        .unwrap();
        let tile = TileSamples {
            rect: TileRect::new(0, 0, 2, 1),
            raw: vec![Some(vec![1.0, 3.0]), None, None],
        };
        let mut values = vec![0.0; 3];
        ctx.pixel_values(&tile, 0, &mut values);
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(!ctx.is_valid(&values));
        ctx.pixel_values(&tile, 1, &mut values);
        assert_eq!(values, vec![3.0, 6.0, 7.0]);
        assert!(ctx.is_valid(&values));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let result = VariableContext::new(
            &[
                VariableConfig::derived("x", "y + 1"),
                VariableConfig::derived("y", "a * 2"),
            ],
            None,
            &[],
        );
        assert!(matches!(result, Err(BinningError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = VariableContext::new(
            &[VariableConfig::raw("a"), VariableConfig::raw("a")],
            None,
            &[],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_mask_means_all_valid() {
        let ctx = VariableContext::new(&[VariableConfig::raw("a")], Some("  "), &[]).unwrap();
        assert!(ctx.mask_expr().is_none());
        assert!(ctx.is_valid(&[f32::NAN]));
    }
}
