//! 正規化層
//!
//! `out = g * (x - m) / sqrt(s^2 + ε) + b`（全要素で共通のパラメータ）

use super::{layer_name, read_dim, read_layer_name, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, write_f64, ModelReader};
use crate::error::ModelResult;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    name: String,
    size: usize,
    /// 平均
    m: f64,
    /// 標準偏差
    s: f64,
    /// スケール（gamma）
    g: f64,
    /// シフト（beta）
    b: f64,
    epsilon: f64,
    out: Vec<f64>,
}

impl Normalize {
    /// 恒等変換に近い初期値で作成
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: layer_name(name),
            size,
            m: 0.0,
            s: 1.0,
            g: 1.0,
            b: 0.0,
            epsilon: 0.0,
            out: vec![0.0; size],
        }
    }

    pub fn set_mean(&mut self, m: f64) {
        self.m = m;
    }

    pub fn set_stddev(&mut self, s: f64) {
        self.s = s;
    }

    pub fn set_gamma(&mut self, g: f64) {
        self.g = g;
    }

    pub fn set_beta(&mut self, b: f64) {
        self.b = b;
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    /// (m, s, g, b, ε)
    pub fn params(&self) -> (f64, f64, f64, f64, f64) {
        (self.m, self.s, self.g, self.b, self.epsilon)
    }
}

impl Layer for Normalize {
    fn kind(&self) -> LayerKind {
        LayerKind::Normalize
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = layer_name(name);
    }

    fn input_len(&self) -> usize {
        self.size
    }

    fn output_len(&self) -> usize {
        self.size
    }

    fn run(&mut self, input: &[f64]) -> &[f64] {
        let denom = (self.s * self.s + self.epsilon).sqrt();
        for (o, &x) in self.out.iter_mut().zip(input) {
            *o = self.g * (x - self.m) / denom + self.b;
        }
        &self.out
    }

    fn output(&self) -> &[f64] {
        &self.out
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "normalize";
        let size = read_dim(reader, SECTION)?;
        let name = read_layer_name(reader)?;
        reader.reserve_buffers(size, SECTION)?;
        Ok(Self {
            name,
            size,
            m: reader.read_f64(SECTION)?,
            s: reader.read_f64(SECTION)?,
            g: reader.read_f64(SECTION)?,
            b: reader.read_f64(SECTION)?,
            epsilon: reader.read_f64(SECTION)?,
            out: vec![0.0; size],
        })
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.size)?;
        write_layer_name(w, &self.name)?;
        for v in [self.m, self.s, self.g, self.b, self.epsilon] {
            write_f64(w, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let mut n = Normalize::new("n", 3);
        assert_eq!(n.run(&[1.0, -2.0, 0.5]), &[1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_affine_normalization() {
        let mut n = Normalize::new("n", 2);
        n.set_mean(1.0);
        n.set_stddev(2.0);
        n.set_gamma(3.0);
        n.set_beta(0.5);
        // 3 * (5 - 1) / 2 + 0.5
        assert_eq!(n.run(&[5.0, 1.0]), &[6.5, 0.5]);
    }
}
