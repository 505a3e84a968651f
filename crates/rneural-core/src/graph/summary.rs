//! モデルの概要（CLI 表示・JSON 出力用）

use super::{Edge, NeuralNet, NodeRef, Variable};
use crate::layers::LayerKind;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub node: NodeRef,
    pub name: String,
    pub input_len: usize,
    pub output_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub inputs: usize,
    pub generation: i32,
    pub fitness: f64,
    pub comment: String,
    /// 種類ごとの層数（シリアライズ順）
    pub layer_counts: Vec<(LayerKind, usize)>,
    pub layers: Vec<LayerSummary>,
    pub edges: Vec<Edge>,
    pub variables: Vec<Variable>,
}

impl NeuralNet {
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            inputs: self.inputs(),
            generation: self.generation(),
            fitness: self.fitness(),
            comment: self.comment().to_string(),
            layer_counts: LayerKind::REGISTRY_ORDER.iter().map(|&k| (k, self.layer_count(k))).collect(),
            layers: self
                .layers()
                .map(|(node, l)| LayerSummary {
                    node,
                    name: l.name().to_string(),
                    input_len: l.input_len(),
                    output_len: l.output_len(),
                })
                .collect(),
            edges: self.edges().to_vec(),
            variables: self.variables().to_vec(),
        }
    }
}

impl std::fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "inputs:     {}", self.inputs)?;
        writeln!(f, "generation: {}", self.generation)?;
        writeln!(f, "fitness:    {}", self.fitness)?;
        if !self.comment.is_empty() {
            writeln!(f, "comment:    {}", self.comment)?;
        }

        writeln!(f, "layers:")?;
        for l in &self.layers {
            writeln!(f, "  {:<16} {:<32} {} -> {}", l.node.to_string(), l.name, l.input_len, l.output_len)?;
        }

        writeln!(f, "edges ({}):", self.edges.len())?;
        for e in &self.edges {
            writeln!(f, "  {e}")?;
        }

        if !self.variables.is_empty() {
            writeln!(f, "variables:")?;
            for v in &self.variables {
                writeln!(f, "  {:<16} {}", v.key, v.value)?;
            }
        }
        Ok(())
    }
}
