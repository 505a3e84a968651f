//! Accumulator 層
//!
//! 複数エッジのスライスを連結して固定長バッファに集める。数値変換は行わない。

use super::{layer_name, read_dim, read_layer_name, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, ModelReader};
use crate::error::ModelResult;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    name: String,
    size: usize,
    out: Vec<f64>,
}

impl Accumulator {
    pub fn new(name: &str, size: usize) -> Self {
        Self { name: layer_name(name), size, out: vec![0.0; size] }
    }
}

impl Layer for Accumulator {
    fn kind(&self) -> LayerKind {
        LayerKind::Accumulator
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

    /// 入力を先頭から代入し、残りを 0 で埋める（容量を超えた分は捨てる）
    fn run(&mut self, input: &[f64]) -> &[f64] {
        let n = input.len().min(self.size);
        self.out[..n].copy_from_slice(&input[..n]);
        self.out[n..].fill(0.0);
        &self.out
    }

    fn output(&self) -> &[f64] {
        &self.out
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        let size = read_dim(reader, "accumulator")?;
        let name = read_layer_name(reader)?;
        reader.reserve_buffers(size, "accumulator")?;
        Ok(Self { name, size, out: vec![0.0; size] })
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.size)?;
        write_layer_name(w, &self.name)
    }
}
