//! 順伝播の実行

use super::{Edge, NeuralNet, NodeRef};
use crate::error::RunError;
use crate::layers::LayerKind;
use std::collections::HashSet;

impl NeuralNet {
    /// ソート済みのエッジ列に沿って 1 ステップ実行し、最後に実行した層の出力を返す
    ///
    /// 出力先ごとの連続したエッジから入力元の出力スライスを連結して入力ベクトルを組み立て、
    /// 出力先の層を実行する。再帰層は入力元として最新の隠れ状態を提供する。
    /// Accumulator の入力は容量に満たない分を 0 で埋める。
    pub fn run(&mut self, input: &[f64]) -> Result<Vec<f64>, RunError> {
        if input.len() != self.inputs() {
            return Err(RunError::InputLength { expected: self.inputs(), actual: input.len() });
        }
        if self.edges.is_empty() {
            return Err(RunError::NoEdges);
        }
        self.input_buf.clear();
        self.input_buf.extend_from_slice(input);

        // 入力を持つ層は、読まれる前に実行済みでなければならない
        let fed: HashSet<NodeRef> = self.edges.iter().map(|e| e.dst).collect();
        let mut executed: HashSet<NodeRef> = HashSet::new();
        let mut assembled: Vec<f64> = Vec::new();
        let mut last = None;

        let mut i = 0;
        while i < self.edges.len() {
            let dst = self.edges[i].dst;
            if executed.contains(&dst) {
                return Err(RunError::NotSorted(self.edges[i]));
            }

            assembled.clear();
            let mut j = i;
            while j < self.edges.len() && self.edges[j].dst == dst {
                let edge = self.edges[j];
                if fed.contains(&edge.src) && !executed.contains(&edge.src) {
                    return Err(RunError::NotSorted(edge));
                }
                let slice = self.select(&edge)?;
                assembled.extend_from_slice(slice);
                j += 1;
            }

            let layer = self.registry.get_mut(dst).ok_or(RunError::NotSorted(self.edges[i]))?;
            // 配線後に出力先の入力長が変わっていないか
            let capacity = layer.input_len();
            if dst.kind == LayerKind::Accumulator {
                if assembled.len() > capacity {
                    return Err(RunError::ShapeChanged(self.edges[i]));
                }
                assembled.resize(capacity, 0.0);
            } else if assembled.len() != capacity {
                return Err(RunError::ShapeChanged(self.edges[i]));
            }
            #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))]
            let out_len = layer.run(&assembled).len();

            #[cfg(feature = "diagnostics")]
            log::info!(
                "[run] {dst} <- {} edges, input {} -> output {out_len}",
                j - i,
                assembled.len()
            );

            executed.insert(dst);
            last = Some(dst);
            i = j;
        }

        let out = last.and_then(|node| self.output_of(node)).ok_or(RunError::NoEdges)?;
        Ok(out.to_vec())
    }

    fn select(&self, edge: &Edge) -> Result<&[f64], RunError> {
        self.output_of(edge.src)
            .and_then(|out| out.get(edge.start..edge.end))
            .ok_or(RunError::ShapeChanged(*edge))
    }
}
