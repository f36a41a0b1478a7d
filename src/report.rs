//! Run reports: cluster contents, prototypes and prefetch results.

use std::fmt::Write;

use serde::Serialize;

use crate::clustering::{Clusterer, TrainSummary};
use crate::evaluation::Evaluation;

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub label: String,
    pub members: Vec<usize>,
    pub prototype: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub algorithm: &'static str,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_learning_rate: Option<f64>,
    pub summary: TrainSummary,
    pub units: Vec<UnitReport>,
    pub evaluation: Evaluation,
}

impl RunReport {
    pub fn collect<C>(
        algorithm: &'static str,
        seed: u64,
        clusterer: &C,
        summary: TrainSummary,
        evaluation: Evaluation,
    ) -> Self
    where
        C: Clusterer + ?Sized,
    {
        let units = (0..clusterer.unit_count())
            .map(|unit| UnitReport {
                label: clusterer.unit_label(unit),
                members: clusterer.members(unit).iter().copied().collect(),
                prototype: clusterer.prototype(unit).to_vec(),
            })
            .collect();

        Self {
            algorithm,
            seed,
            initial_learning_rate: None,
            summary,
            units,
            evaluation,
        }
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.initial_learning_rate = Some(rate);
        self
    }

    /// Plain-text rendering: members, prototypes, then the evaluation block
    pub fn render_text(&self, show_members: bool, show_prototypes: bool) -> String {
        let mut out = String::new();

        let status = if self.summary.converged {
            "converged"
        } else {
            "iteration cap reached"
        };
        let _ = writeln!(
            out,
            "{} (seed {}): {} iterations, {status}",
            self.algorithm, self.seed, self.summary.iterations
        );
        if !self.summary.starved.is_empty() {
            let _ = writeln!(out, "Starved clusters: {:?}", self.summary.starved);
        }

        if show_members {
            for unit in &self.units {
                let _ = writeln!(out, "\nMembers cluster{} :{:?}", unit.label, unit.members);
            }
        }

        if show_prototypes {
            for unit in &self.units {
                let values: Vec<String> = unit.prototype.iter().map(|v| v.to_string()).collect();
                let _ = writeln!(out, "\nPrototype cluster{} : {}", unit.label, values.join(" "));
            }
        }

        out.push('\n');
        if let Some(rate) = self.initial_learning_rate {
            let _ = writeln!(out, "Initial learning Rate={rate}");
        }
        let _ = writeln!(out, "{}", self.evaluation);
        out
    }
}
