//! 2 次元プーリング層
//!
//! 窓ごとに統計量（最大・最小・平均・中央値）を取る。パディング領域は統計に含めない。

use super::window::{checked_area, padded_at, sliding_extent, Padding};
use super::{layer_name, read_dim, read_layer_name, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, write_u8, ModelReader};
use crate::constants::MAX_VECTOR_LEN;
use crate::error::{ModelError, ModelResult};
use serde::Serialize;
use std::io::{self, Write};

/// プーリング関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PoolFunction {
    #[default]
    Max,
    Min,
    Average,
    Median,
}

impl PoolFunction {
    pub fn code(self) -> u8 {
        match self {
            Self::Max => 0,
            Self::Min => 1,
            Self::Average => 2,
            Self::Median => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Max,
            1 => Self::Min,
            2 => Self::Average,
            3 => Self::Median,
            _ => return None,
        })
    }

    /// 窓内の値から統計量を計算する（空なら 0）
    fn reduce(self, values: &mut [f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Median => {
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
        }
    }
}

/// プーリング窓
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolWindow {
    pub w: usize,
    pub h: usize,
    pub stride_h: usize,
    pub stride_v: usize,
    pub padding: Padding,
    pub function: PoolFunction,
}

impl PoolWindow {
    /// ストライド = 窓サイズ（重なりなし）で作成
    pub fn new(w: usize, h: usize, function: PoolFunction) -> Self {
        Self { w, h, stride_h: w, stride_v: h, padding: Padding::NONE, function }
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

    pub fn output_shape(&self, width: usize, height: usize) -> (usize, usize) {
        (
            sliding_extent(width, self.padding.left, self.padding.right, self.w, self.stride_h),
            sliding_extent(height, self.padding.top, self.padding.bottom, self.h, self.stride_v),
        )
    }
}

/// 窓 1 つ分のシリアライズ済みバイト数
const WINDOW_BYTES: usize = 8 * 4 + 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Pool2D {
    name: String,
    width: usize,
    height: usize,
    pools: Vec<PoolWindow>,
    out: Vec<f64>,
    /// 窓内の値を集める作業領域
    scratch: Vec<f64>,
}

impl Pool2D {
    pub fn new(name: &str, width: usize, height: usize) -> Self {
        Self {
            name: layer_name(name),
            width,
            height,
            pools: Vec::new(),
            out: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn pools(&self) -> &[PoolWindow] {
        &self.pools
    }

    /// 窓を追加し、窓の数を返す
    pub fn add_pool(&mut self, pool: PoolWindow) -> usize {
        self.pools.push(pool);
        self.out = vec![0.0; self.total_output_len()];
        self.pools.len()
    }

    pub fn set_function(&mut self, i: usize, function: PoolFunction) {
        if let Some(p) = self.pools.get_mut(i) {
            p.function = function;
        }
    }

    fn total_output_len(&self) -> usize {
        self.pools
            .iter()
            .map(|p| {
                let (w, h) = p.output_shape(self.width, self.height);
                w.saturating_mul(h)
            })
            .fold(0usize, usize::saturating_add)
    }
}

impl Layer for Pool2D {
    fn kind(&self) -> LayerKind {
        LayerKind::Pool2D
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
        for p in &self.pools {
            let (ow, oh) = p.output_shape(self.width, self.height);
            for oy in 0..oh {
                for ox in 0..ow {
                    self.scratch.clear();
                    for py in 0..p.h {
                        for px in 0..p.w {
                            let x = ox * p.stride_h + px;
                            let y = oy * p.stride_v + py;
                            if let Some(v) = padded_at(input, self.width, self.height, &p.padding, x, y) {
                                self.scratch.push(v);
                            }
                        }
                    }
                    self.out[o] = p.function.reduce(&mut self.scratch);
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
        const SECTION: &str = "pool2d";
        let width = read_dim(reader, SECTION)?;
        let height = read_dim(reader, SECTION)?;
        checked_area(width, height, SECTION)?;
        let count = read_dim(reader, SECTION)?;
        let name = read_layer_name(reader)?;

        reader.ensure(count, WINDOW_BYTES, SECTION)?;
        let mut layer = Self::new(&name, width, height);
        for _ in 0..count {
            let w = read_dim(reader, SECTION)?;
            let h = read_dim(reader, SECTION)?;
            checked_area(w, h, SECTION)?;
            let stride_h = read_dim(reader, SECTION)?;
            let stride_v = read_dim(reader, SECTION)?;
            let padding = Padding::read(reader, SECTION)?;
            let code = reader.read_u8(SECTION)?;
            let function = PoolFunction::from_code(code)
                .ok_or_else(|| ModelError::corrupt(SECTION, format!("unknown pool function {code}")))?;
            layer.pools.push(PoolWindow { w, h, stride_h, stride_v, padding, function });
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
        write_count(w, self.pools.len())?;
        write_layer_name(w, &self.name)?;
        for p in &self.pools {
            write_count(w, p.w)?;
            write_count(w, p.h)?;
            write_count(w, p.stride_h)?;
            write_count(w, p.stride_v)?;
            p.padding.write(w)?;
            write_u8(w, p.function.code())?;
        }
        Ok(())
    }
}
