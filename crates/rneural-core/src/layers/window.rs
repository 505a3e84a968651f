//! 2 次元層（Conv2D / Pool2D / Upres）で共有する窓・パディング計算

use crate::codec::{write_count, ModelReader};
use crate::constants::MAX_VECTOR_LEN;
use crate::error::{ModelError, ModelResult};
use serde::Serialize;
use std::io::{self, Write};

/// ゼロパディング量（左・右・上・下）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Padding {
    pub const NONE: Padding = Padding { left: 0, right: 0, top: 0, bottom: 0 };

    pub fn uniform(p: usize) -> Self {
        Self { left: p, right: p, top: p, bottom: p }
    }

    pub(crate) fn read(reader: &mut ModelReader<'_>, section: &'static str) -> ModelResult<Self> {
        Ok(Self {
            left: super::read_dim(reader, section)?,
            right: super::read_dim(reader, section)?,
            top: super::read_dim(reader, section)?,
            bottom: super::read_dim(reader, section)?,
        })
    }

    pub(crate) fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.left)?;
        write_count(w, self.right)?;
        write_count(w, self.top)?;
        write_count(w, self.bottom)
    }
}

/// 窓を `stride` ずつずらしたときの出力幅
///
/// パディング込みの入力より窓が大きい、またはストライドが 0 の場合は 0。
pub(crate) fn sliding_extent(input: usize, pad_a: usize, pad_b: usize, window: usize, stride: usize) -> usize {
    let padded = input + pad_a + pad_b;
    if stride == 0 || window == 0 || window > padded {
        return 0;
    }
    (padded - window) / stride + 1
}

/// 幅×高さが上限以内であることを確認する
pub(crate) fn checked_area(w: usize, h: usize, section: &'static str) -> ModelResult<usize> {
    w.checked_mul(h)
        .filter(|&a| a <= MAX_VECTOR_LEN)
        .ok_or_else(|| ModelError::corrupt(section, format!("area {w} x {h} exceeds {MAX_VECTOR_LEN}")))
}

/// パディング座標系の (x, y) に対応する入力値（範囲外は `None`）
#[inline]
pub(crate) fn padded_at(
    input: &[f64],
    width: usize,
    height: usize,
    pad: &Padding,
    x: usize,
    y: usize,
) -> Option<f64> {
    let ix = x.checked_sub(pad.left)?;
    let iy = y.checked_sub(pad.top)?;
    if ix >= width || iy >= height {
        return None;
    }
    input.get(iy * width + ix).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_extent() {
        assert_eq!(sliding_extent(5, 0, 0, 3, 1), 3);
        assert_eq!(sliding_extent(5, 1, 1, 3, 1), 5);
        assert_eq!(sliding_extent(6, 0, 0, 2, 2), 3);
        assert_eq!(sliding_extent(2, 0, 0, 3, 1), 0);
        assert_eq!(sliding_extent(4, 0, 0, 2, 0), 0);
    }

    #[test]
    fn test_padded_at() {
        let input = [1.0, 2.0, 3.0, 4.0];
        let pad = Padding::uniform(1);
        assert_eq!(padded_at(&input, 2, 2, &pad, 0, 0), None);
        assert_eq!(padded_at(&input, 2, 2, &pad, 1, 1), Some(1.0));
        assert_eq!(padded_at(&input, 2, 2, &pad, 2, 2), Some(4.0));
        assert_eq!(padded_at(&input, 2, 2, &pad, 3, 2), None);
    }
}
