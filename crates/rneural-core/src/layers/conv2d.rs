//! 2 次元畳み込み層
//!
//! 入力は W×H の 1 チャンネル画像（行優先）。フィルタごとに特徴マップを計算し、
//! フィルタ順に連結したものを出力とする。パディングは 0 埋め。

use super::activation::{softmax_in_place, Activation};
use super::window::{checked_area, padded_at, sliding_extent, Padding};
use super::{layer_name, read_dim, read_layer_name, uniform_weights, write_layer_name, xavier_limit};
use super::{Layer, LayerKind};
use crate::codec::{write_count, write_f64, write_f64_slice, write_u8, ModelReader};
use crate::constants::MAX_VECTOR_LEN;
use crate::error::{ModelError, ModelResult};
use rand::Rng;
use serde::Serialize;
use std::io::{self, Write};

/// 畳み込みフィルタ
///
/// 窓サイズと重みは作成時に固定され、`weights.len() == w × h` が常に成り立つ。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter2D {
    w: usize,
    h: usize,
    pub stride_h: usize,
    pub stride_v: usize,
    pub padding: Padding,
    pub activation: Activation,
    pub alpha: f64,
    /// `w × h`（行優先）
    weights: Vec<f64>,
    pub bias: f64,
}

impl Filter2D {
    /// 重みゼロ・ストライド 1・パディングなし・ReLU
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride_h: 1,
            stride_v: 1,
            padding: Padding::NONE,
            activation: Activation::Relu,
            alpha: 1.0,
            weights: vec![0.0; w * h],
            bias: 0.0,
        }
    }

    pub fn w(&self) -> usize {
        self.w
    }

    pub fn h(&self) -> usize {
        self.h
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// 重み（`w × h` 個、行優先）を設定する。長さが合わなければ `false` を返して何もしない
    pub fn set_weights(&mut self, weights: &[f64]) -> bool {
        if weights.len() != self.weights.len() {
            return false;
        }
        self.weights.copy_from_slice(weights);
        true
    }

    pub fn with_stride(mut self, stride_h: usize, stride_v: usize) -> Self {
        self.stride_h = stride_h;
        self.stride_v = stride_v;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_activation(mut self, activation: Activation, alpha: f64) -> Self {
        self.activation = activation;
        self.alpha = alpha;
        self
    }

    /// Xavier 一様分布で重みを初期化する
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        let fan = self.w * self.h;
        self.weights = uniform_weights(rng, fan, xavier_limit(fan, 1));
    }

    /// 入力 W×H に対する出力マップの (幅, 高さ)
    pub fn output_shape(&self, width: usize, height: usize) -> (usize, usize) {
        (
            sliding_extent(width, self.padding.left, self.padding.right, self.w, self.stride_h),
            sliding_extent(height, self.padding.top, self.padding.bottom, self.h, self.stride_v),
        )
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "conv2d filter";
        let w = read_dim(reader, SECTION)?;
        let h = read_dim(reader, SECTION)?;
        let stride_h = read_dim(reader, SECTION)?;
        let stride_v = read_dim(reader, SECTION)?;
        let padding = Padding::read(reader, SECTION)?;
        let code = reader.read_u8(SECTION)?;
        let activation = Activation::from_code(code)
            .ok_or_else(|| ModelError::corrupt(SECTION, format!("unknown activation {code}")))?;
        let alpha = reader.read_f64(SECTION)?;
        let n = checked_area(w, h, SECTION)?;
        let weights = reader.read_f64_vec(n, SECTION)?;
        let bias = reader.read_f64(SECTION)?;
        Ok(Self { w, h, stride_h, stride_v, padding, activation, alpha, weights, bias })
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.w)?;
        write_count(w, self.h)?;
        write_count(w, self.stride_h)?;
        write_count(w, self.stride_v)?;
        self.padding.write(w)?;
        write_u8(w, self.activation.code())?;
        write_f64(w, self.alpha)?;
        write_f64_slice(w, &self.weights)?;
        write_f64(w, self.bias)
    }
}

/// フィルタ 1 つ分のシリアライズ済み最小バイト数（重みを除く）
const FILTER_HEADER_BYTES: usize = 8 * 4 + 1 + 8 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Conv2D {
    name: String,
    width: usize,
    height: usize,
    filters: Vec<Filter2D>,
    out: Vec<f64>,
}

impl Conv2D {
    pub fn new(name: &str, width: usize, height: usize) -> Self {
        Self { name: layer_name(name), width, height, filters: Vec::new(), out: Vec::new() }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn filters(&self) -> &[Filter2D] {
        &self.filters
    }

    /// フィルタを追加し、フィルタ数を返す
    pub fn add_filter(&mut self, filter: Filter2D) -> usize {
        self.filters.push(filter);
        self.resize_output();
        self.filters.len()
    }

    /// フィルタ `i` の重み（`w × h` 個）を設定（範囲外・長さ不一致は無視）
    pub fn set_filter_weights(&mut self, i: usize, weights: &[f64]) {
        if let Some(f) = self.filters.get_mut(i) {
            f.set_weights(weights);
        }
    }

    pub fn set_filter_bias(&mut self, i: usize, bias: f64) {
        if let Some(f) = self.filters.get_mut(i) {
            f.bias = bias;
        }
    }

    pub fn set_filter_activation(&mut self, i: usize, activation: Activation, alpha: f64) {
        if let Some(f) = self.filters.get_mut(i) {
            f.activation = activation;
            f.alpha = alpha;
        }
    }

    fn total_output_len(&self) -> usize {
        self.filters
            .iter()
            .map(|f| {
                let (w, h) = f.output_shape(self.width, self.height);
                w.saturating_mul(h)
            })
            .fold(0usize, usize::saturating_add)
    }

    fn resize_output(&mut self) {
        self.out = vec![0.0; self.total_output_len()];
    }
}

impl Layer for Conv2D {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2D
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = layer_name(name);
    }

    fn input_len(&self) -> usize {
        self.width * self.height
    }

    fn output_len(&self) -> usize {
        self.out.len()
    }

    fn run(&mut self, input: &[f64]) -> &[f64] {
        let mut o = 0;
        for f in &self.filters {
            let (ow, oh) = f.output_shape(self.width, self.height);
            let start = o;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut sum = f.bias;
                    for fy in 0..f.h {
                        for fx in 0..f.w {
                            let x = ox * f.stride_h + fx;
                            let y = oy * f.stride_v + fy;
                            if let Some(v) = padded_at(input, self.width, self.height, &f.padding, x, y) {
                                sum += f.weights[fy * f.w + fx] * v;
                            }
                        }
                    }
                    self.out[o] = f.activation.apply(sum, f.alpha);
                    o += 1;
                }
            }
            if f.activation == Activation::Softmax {
                softmax_in_place(&mut self.out[start..o], |_| true);
            }
        }
        &self.out
    }

    fn output(&self) -> &[f64] {
        &self.out
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "conv2d";
        let width = read_dim(reader, SECTION)?;
        let height = read_dim(reader, SECTION)?;
        checked_area(width, height, SECTION)?;
        let count = read_dim(reader, SECTION)?;
        let name = read_layer_name(reader)?;

        reader.ensure(count, FILTER_HEADER_BYTES, SECTION)?;
        let mut layer = Self::new(&name, width, height);
        for _ in 0..count {
            layer.filters.push(Filter2D::read(reader)?);
        }
        let total = layer.total_output_len();
        if total > MAX_VECTOR_LEN {
            return Err(ModelError::corrupt(SECTION, format!("output length {total} exceeds {MAX_VECTOR_LEN}")));
        }
        reader.reserve_buffers(total, SECTION)?;
        layer.resize_output();
        Ok(layer)
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.width)?;
        write_count(w, self.height)?;
        write_count(w, self.filters.len())?;
        write_layer_name(w, &self.name)?;
        for f in &self.filters {
            f.write(w)?;
        }
        Ok(())
    }
}
