//! アップサンプリング層
//!
//! 各アップサンプラーが入力 W×H を (W·sh + pl + pr) × (H·sv + pt + pb) に拡大する。
//! ストライドは拡大倍率、パディング部分は 0。

use super::window::{checked_area, Padding};
use super::{layer_name, read_dim, read_layer_name, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, write_u8, ModelReader};
use crate::constants::MAX_VECTOR_LEN;
use crate::error::{ModelError, ModelResult};
use serde::Serialize;
use std::io::{self, Write};

/// 補間方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UpresFunction {
    #[default]
    Nearest,
    Bilinear,
}

impl UpresFunction {
    pub fn code(self) -> u8 {
        match self {
            Self::Nearest => 0,
            Self::Bilinear => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Nearest),
            1 => Some(Self::Bilinear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpSampler {
    pub stride_h: usize,
    pub stride_v: usize,
    pub padding: Padding,
    pub function: UpresFunction,
}

impl UpSampler {
    pub fn new(stride_h: usize, stride_v: usize, function: UpresFunction) -> Self {
        Self { stride_h, stride_v, padding: Padding::NONE, function }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn output_shape(&self, width: usize, height: usize) -> (usize, usize) {
        (
            width
                .saturating_mul(self.stride_h)
                .saturating_add(self.padding.left)
                .saturating_add(self.padding.right),
            height
                .saturating_mul(self.stride_v)
                .saturating_add(self.padding.top)
                .saturating_add(self.padding.bottom),
        )
    }

    /// 拡大後の内部座標 (ux, uy) の値
    fn sample(&self, input: &[f64], width: usize, height: usize, ux: usize, uy: usize) -> f64 {
        match self.function {
            UpresFunction::Nearest => {
                let ix = ux / self.stride_h;
                let iy = uy / self.stride_v;
                input[iy * width + ix]
            }
            UpresFunction::Bilinear => {
                let sx = source_coord(ux, self.stride_h, width);
                let sy = source_coord(uy, self.stride_v, height);
                let x0 = sx.floor() as usize;
                let y0 = sy.floor() as usize;
                let x1 = (x0 + 1).min(width - 1);
                let y1 = (y0 + 1).min(height - 1);
                let fx = sx - x0 as f64;
                let fy = sy - y0 as f64;

                let top = input[y0 * width + x0] * (1.0 - fx) + input[y0 * width + x1] * fx;
                let bottom = input[y1 * width + x0] * (1.0 - fx) + input[y1 * width + x1] * fx;
                top * (1.0 - fy) + bottom * fy
            }
        }
    }
}

/// 画素中心を揃えた元座標（[0, len-1] にクランプ）
fn source_coord(u: usize, scale: usize, len: usize) -> f64 {
    let s = (u as f64 + 0.5) / scale as f64 - 0.5;
    s.clamp(0.0, (len - 1) as f64)
}

const SAMPLER_BYTES: usize = 6 * 4 + 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Upres {
    name: String,
    width: usize,
    height: usize,
    samplers: Vec<UpSampler>,
    out: Vec<f64>,
}

impl Upres {
    pub fn new(name: &str, width: usize, height: usize) -> Self {
        Self { name: layer_name(name), width, height, samplers: Vec::new(), out: Vec::new() }
    }

    pub fn samplers(&self) -> &[UpSampler] {
        &self.samplers
    }

    /// アップサンプラーを追加し、その数を返す
    pub fn add_sampler(&mut self, sampler: UpSampler) -> usize {
        self.samplers.push(sampler);
        self.out = vec![0.0; self.total_output_len()];
        self.samplers.len()
    }

    pub fn set_function(&mut self, i: usize, function: UpresFunction) {
        if let Some(s) = self.samplers.get_mut(i) {
            s.function = function;
        }
    }

    fn total_output_len(&self) -> usize {
        self.samplers
            .iter()
            .map(|s| {
                let (w, h) = s.output_shape(self.width, self.height);
                w.saturating_mul(h)
            })
            .fold(0usize, usize::saturating_add)
    }
}

impl Layer for Upres {
    fn kind(&self) -> LayerKind {
        LayerKind::Upres
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
        for s in &self.samplers {
            let (ow, oh) = s.output_shape(self.width, self.height);
            let inner_w = self.width * s.stride_h;
            let inner_h = self.height * s.stride_v;
            for y in 0..oh {
                for x in 0..ow {
                    let ux = x.checked_sub(s.padding.left).filter(|&u| u < inner_w);
                    let uy = y.checked_sub(s.padding.top).filter(|&u| u < inner_h);
                    self.out[o] = match (ux, uy) {
                        (Some(ux), Some(uy)) => s.sample(input, self.width, self.height, ux, uy),
                        _ => 0.0,
                    };
                    o += 1;
                }
            }
        }
        &self.out
    }

    fn output(&self) -> &[f64] {
        &self.out
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "upres";
        let width = read_dim(reader, SECTION)?;
        let height = read_dim(reader, SECTION)?;
        checked_area(width, height, SECTION)?;
        let count = read_dim(reader, SECTION)?;
        let name = read_layer_name(reader)?;

        reader.ensure(count, SAMPLER_BYTES, SECTION)?;
        let mut layer = Self::new(&name, width, height);
        for _ in 0..count {
            let stride_h = read_dim(reader, SECTION)?;
            let stride_v = read_dim(reader, SECTION)?;
            let padding = Padding::read(reader, SECTION)?;
            let code = reader.read_u8(SECTION)?;
            let function = UpresFunction::from_code(code)
                .ok_or_else(|| ModelError::corrupt(SECTION, format!("unknown upres function {code}")))?;
            layer.samplers.push(UpSampler { stride_h, stride_v, padding, function });
        }

        let total = layer.total_output_len();
        if total > MAX_VECTOR_LEN {
            return Err(ModelError::corrupt(SECTION, format!("output length {total} exceeds {MAX_VECTOR_LEN}")));
        }
        reader.reserve_buffers(total, SECTION)?;
        layer.out = vec![0.0; total];
        Ok(layer)
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.width)?;
        write_count(w, self.height)?;
        write_count(w, self.samplers.len())?;
        write_layer_name(w, &self.name)?;
        for s in &self.samplers {
            write_count(w, s.stride_h)?;
            write_count(w, s.stride_v)?;
            s.padding.write(w)?;
            write_u8(w, s.function.code())?;
        }
        Ok(())
    }
}
