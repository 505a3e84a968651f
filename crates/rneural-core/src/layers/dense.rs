//! 全結合層
//!
//! `out[k] = f_k(Σ_j w[k][j] * x[j] + b[k])`
//!
//! 重みはノード単位に `inputs + 1` 個ずつ並び、各ノードの末尾がバイアス。

use super::activation::{softmax_in_place, Activation};
use super::{layer_name, read_dim, read_layer_name, uniform_weights, write_layer_name, xavier_limit};
use super::{Layer, LayerKind};
use crate::codec::{write_count, write_f64_slice, write_u8, ModelReader};
use crate::error::{ModelError, ModelResult};
use rand::Rng;
use std::io::{self, Write};

/// 全結合層
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    name: String,
    inputs: usize,
    nodes: usize,
    /// `nodes × (inputs + 1)`（ノード優先、各ノード末尾がバイアス）
    weights: Vec<f64>,
    activations: Vec<Activation>,
    alphas: Vec<f64>,
    out: Vec<f64>,
}

impl Dense {
    /// 重みゼロ・活性化 Sigmoid で作成
    pub fn new(name: &str, inputs: usize, nodes: usize) -> Self {
        Self {
            name: layer_name(name),
            inputs,
            nodes,
            weights: vec![0.0; nodes * (inputs + 1)],
            activations: vec![Activation::default(); nodes],
            alphas: vec![1.0; nodes],
            out: vec![0.0; nodes],
        }
    }

    /// Xavier 一様分布で重みを初期化して作成（バイアスは 0）
    pub fn with_rng<R: Rng>(name: &str, inputs: usize, nodes: usize, rng: &mut R) -> Self {
        let mut layer = Self::new(name, inputs, nodes);
        let limit = xavier_limit(inputs, nodes);
        let stride = inputs + 1;
        let init = uniform_weights(rng, nodes * inputs, limit);
        for k in 0..nodes {
            layer.weights[k * stride..k * stride + inputs]
                .copy_from_slice(&init[k * inputs..(k + 1) * inputs]);
        }
        layer
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn activation(&self, node: usize) -> Option<Activation> {
        self.activations.get(node).copied()
    }

    pub fn alpha(&self, node: usize) -> Option<f64> {
        self.alphas.get(node).copied()
    }

    /// 入力 `input` → ノード `node` の重みを設定（範囲外は無視）
    pub fn set_weight(&mut self, input: usize, node: usize, w: f64) {
        if input < self.inputs && node < self.nodes {
            self.weights[node * (self.inputs + 1) + input] = w;
        }
    }

    /// ノード `node` のバイアスを設定（範囲外は無視）
    pub fn set_bias(&mut self, node: usize, b: f64) {
        if node < self.nodes {
            self.weights[node * (self.inputs + 1) + self.inputs] = b;
        }
    }

    /// ノード 1 つ分の重み＋バイアス（`inputs + 1` 個）を設定（長さ不一致は無視）
    pub fn set_node_weights(&mut self, node: usize, weights: &[f64]) {
        let stride = self.inputs + 1;
        if node < self.nodes && weights.len() == stride {
            self.weights[node * stride..(node + 1) * stride].copy_from_slice(weights);
        }
    }

    /// 全重みを一括設定（長さ不一致は無視）
    pub fn set_weights(&mut self, weights: &[f64]) {
        if weights.len() == self.weights.len() {
            self.weights.copy_from_slice(weights);
        }
    }

    pub fn set_activation(&mut self, node: usize, f: Activation) {
        if let Some(a) = self.activations.get_mut(node) {
            *a = f;
        }
    }

    pub fn set_activation_all(&mut self, f: Activation) {
        self.activations.fill(f);
    }

    pub fn set_alpha(&mut self, node: usize, alpha: f64) {
        if let Some(a) = self.alphas.get_mut(node) {
            *a = alpha;
        }
    }

    pub fn set_alpha_all(&mut self, alpha: f64) {
        self.alphas.fill(alpha);
    }
}

impl Layer for Dense {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = layer_name(name);
    }

    fn input_len(&self) -> usize {
        self.inputs
    }

    fn output_len(&self) -> usize {
        self.nodes
    }

    fn run(&mut self, input: &[f64]) -> &[f64] {
        let stride = self.inputs + 1;
        for k in 0..self.nodes {
            let row = &self.weights[k * stride..(k + 1) * stride];
            let sum: f64 = row[..self.inputs]
                .iter()
                .zip(input)
                .map(|(w, x)| w * x)
                .sum::<f64>()
                + row[self.inputs];
            self.out[k] = self.activations[k].apply(sum, self.alphas[k]);
        }

        if self.activations.contains(&Activation::Softmax) {
            let acts = &self.activations;
            softmax_in_place(&mut self.out, |k| acts[k] == Activation::Softmax);
        }

        &self.out
    }

    fn output(&self) -> &[f64] {
        &self.out
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "dense";
        let inputs = read_dim(reader, SECTION)?;
        let nodes = read_dim(reader, SECTION)?;
        let name = read_layer_name(reader)?;

        let weights = reader.read_f64_vec(nodes * (inputs + 1), SECTION)?;

        reader.ensure(nodes, 1, SECTION)?;
        let mut activations = Vec::with_capacity(nodes);
        for _ in 0..nodes {
            let code = reader.read_u8(SECTION)?;
            let f = Activation::from_code(code)
                .ok_or_else(|| ModelError::corrupt(SECTION, format!("unknown activation {code}")))?;
            activations.push(f);
        }
        let alphas = reader.read_f64_vec(nodes, SECTION)?;

        Ok(Self {
            name,
            inputs,
            nodes,
            weights,
            activations,
            alphas,
            out: vec![0.0; nodes],
        })
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.inputs)?;
        write_count(w, self.nodes)?;
        write_layer_name(w, &self.name)?;
        write_f64_slice(w, &self.weights)?;
        for f in &self.activations {
            write_u8(w, f.code())?;
        }
        write_f64_slice(w, &self.alphas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_dense_linear_output() {
        let mut d = Dense::new("d", 2, 1);
        d.set_activation_all(Activation::Linear);
        d.set_weight(0, 0, 2.0);
        d.set_weight(1, 0, -1.0);
        d.set_bias(0, 0.5);

        let out = d.run(&[3.0, 4.0]);
        assert_eq!(out, &[2.5]);
        assert_eq!(d.output(), &[2.5]);
    }

    #[test]
    fn test_out_of_range_setters_are_noop() {
        let mut d = Dense::new("d", 2, 2);
        let before = d.clone();
        d.set_weight(2, 0, 1.0);
        d.set_weight(0, 2, 1.0);
        d.set_bias(5, 1.0);
        d.set_activation(9, Activation::Relu);
        d.set_alpha(9, 3.0);
        d.set_weights(&[1.0; 3]);
        d.set_node_weights(0, &[1.0; 2]);
        assert_eq!(d, before);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut d = Dense::new("sm", 1, 3);
        d.set_activation_all(Activation::Softmax);
        d.set_weights(&[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);

        let out = d.run(&[1.0]).to_vec();
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_rng_init_keeps_bias_zero_and_is_seeded() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let a = Dense::with_rng("a", 3, 2, &mut rng);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let b = Dense::with_rng("b", 3, 2, &mut rng);

        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.weights()[3], 0.0);
        assert_eq!(a.weights()[7], 0.0);
        let limit = xavier_limit(3, 2);
        assert!(a.weights().iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut d = Dense::new("hidden", 2, 2);
        d.set_weights(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        d.set_activation(1, Activation::LeakyRelu);
        d.set_alpha(1, 0.01);

        let mut buf = Vec::new();
        d.write(&mut buf).unwrap();
        let mut r = ModelReader::new(&buf);
        let back = Dense::read(&mut r).unwrap();
        assert_eq!(back, d);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_rejects_unknown_activation() {
        let d = Dense::new("x", 1, 1);
        let mut buf = Vec::new();
        d.write(&mut buf).unwrap();
        // activation バイトは重み 2 個の直後
        let pos = 4 + 4 + crate::constants::LAYER_NAME_LEN + 16;
        buf[pos] = 99;
        let err = Dense::read(&mut ModelReader::new(&buf)).unwrap_err();
        assert!(matches!(err, ModelError::Corrupt { .. }));
    }
}
