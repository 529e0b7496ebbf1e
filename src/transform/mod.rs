//! Value transform pipeline
//!
//! Applies each output's optional transform expression and format
//! pattern to resolved samples. Compilation happens once per output
//! when a profile loads; per-tick application is lookup plus eval.
//!
//! The pipeline soft-fails everywhere: a transform that fails to
//! compile is deactivated with a warning, an evaluation that produces
//! a non-finite number falls back to the untransformed value, and a
//! value that failed to resolve coerces to zero. Polling never stops
//! because of a bad transform.

pub mod expr;
pub mod format;

pub use expr::{CompiledExpr, ExprError};
pub use format::{FormatError, FormatSpec};

use crate::types::{OutputDescriptor, ResolvedSample, TransformedValue, Value};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Compiled transform and format stages for one output
#[derive(Debug, Clone, Default)]
struct CompiledOutput {
    transform: Option<CompiledExpr>,
    format: Option<FormatSpec>,
}

/// Engine applying per-output transforms to resolved samples
#[derive(Debug, Default)]
pub struct TransformPipeline {
    /// Compiled stages per output label
    compiled: HashMap<String, CompiledOutput>,
}

impl TransformPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            compiled: HashMap::new(),
        }
    }

    /// Compile all outputs of a profile, replacing previous state
    ///
    /// Stages that fail to compile are deactivated with a warning; the
    /// raw value passes through for those outputs.
    pub fn load_outputs(&mut self, descriptors: &[OutputDescriptor]) {
        self.compiled.clear();
        for descriptor in descriptors {
            self.update_output(descriptor);
        }
    }

    /// Compile (or recompile) the stages for one output
    pub fn update_output(&mut self, descriptor: &OutputDescriptor) {
        let mut entry = CompiledOutput::default();

        if let Some(ref source) = descriptor.transform {
            match CompiledExpr::compile(source) {
                Ok(compiled) => entry.transform = Some(compiled),
                Err(e) => {
                    warn!(
                        "Failed to compile transform for '{}': {}",
                        descriptor.label, e
                    );
                }
            }
        }

        if let Some(ref pattern) = descriptor.format {
            match FormatSpec::compile(pattern) {
                Ok(compiled) => entry.format = Some(compiled),
                Err(e) => {
                    warn!(
                        "Failed to compile format for '{}': {}",
                        descriptor.label, e
                    );
                }
            }
        }

        self.compiled.insert(descriptor.label.clone(), entry);
    }

    /// Drop the compiled stages for one output
    pub fn remove_output(&mut self, label: &str) {
        self.compiled.remove(label);
    }

    /// Drop all compiled stages
    pub fn clear(&mut self) {
        self.compiled.clear();
    }

    /// Number of outputs with an active transform expression
    pub fn transform_count(&self) -> usize {
        self.compiled
            .values()
            .filter(|c| c.transform.is_some())
            .count()
    }

    /// Apply the output's transform and format to a resolved sample
    ///
    /// A sample that failed to resolve enters the pipeline as zero, so
    /// downstream devices always receive something dispatchable.
    pub fn apply(
        &self,
        descriptor: &OutputDescriptor,
        sample: &ResolvedSample,
    ) -> TransformedValue {
        let raw = sample
            .value
            .clone()
            .unwrap_or(Value::Number(0.0));

        let stages = self.compiled.get(&descriptor.label);

        let dispatch = match stages.and_then(|s| s.transform.as_ref()) {
            Some(expr) => {
                let out = expr.eval(raw.as_number());
                if out.is_finite() {
                    Value::Number(out)
                } else {
                    trace!(
                        "Transform for '{}' produced non-finite value, using raw",
                        descriptor.label
                    );
                    raw
                }
            }
            None => raw,
        };

        let display = match stages.and_then(|s| s.format.as_ref()) {
            Some(spec) => spec.format(&dispatch),
            None => dispatch.to_string(),
        };

        TransformedValue {
            label: descriptor.label.clone(),
            display,
            dispatch,
            targets: descriptor.targets.clone(),
        }
    }
}
