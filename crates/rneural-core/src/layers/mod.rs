//! 層の実装
//!
//! グラフエンジンからは [`Layer`] トレイト越しにのみ扱われる。
//! 層はエッジの存在を知らず、与えられた入力ベクトルから自身の出力バッファを更新するだけ。
//!
//! | 種類 | 入力長 | 出力長 |
//! |------|--------|--------|
//! | Dense | inputs | nodes |
//! | Conv2D | W×H | Σ フィルタ出力 |
//! | Accumulator | size | size |
//! | LSTM / GRU | d | h |
//! | Pool2D | W×H | Σ プール出力 |
//! | Upres | W×H | Σ アップサンプル出力 |
//! | Normalize | size | size |

mod accum;
mod activation;
mod conv2d;
mod dense;
mod gru;
mod lstm;
mod normal;
mod pool2d;
mod upres;
mod window;

pub use accum::Accumulator;
pub use activation::{sigmoid, softmax_in_place, Activation};
pub use conv2d::{Conv2D, Filter2D};
pub use dense::Dense;
pub use gru::{Gru, GruGate};
pub use lstm::{Lstm, LstmGate};
pub use normal::Normalize;
pub use pool2d::{Pool2D, PoolFunction, PoolWindow};
pub use upres::{Upres, UpresFunction, UpSampler};
pub use window::Padding;

use crate::codec::{fixed_field, write_fixed_str, ModelReader};
use crate::constants::{LAYER_NAME_LEN, MAX_VECTOR_LEN};
use crate::error::{ModelError, ModelResult};
use rand::Rng;
use serde::Serialize;
use std::io::{self, Write};

/// 層の種類（INPUT 擬似ノードを含む）
///
/// ファイル上は u8 のコードで保存する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LayerKind {
    /// ネットワーク入力（層オブジェクトを持たない擬似ノード）
    Input,
    Dense,
    Conv2D,
    Accumulator,
    Lstm,
    Gru,
    Pool2D,
    Upres,
    Normalize,
}

impl LayerKind {
    /// レジストリを持つ層種別（シリアライズ順）
    pub const REGISTRY_ORDER: [LayerKind; 8] = [
        LayerKind::Dense,
        LayerKind::Conv2D,
        LayerKind::Accumulator,
        LayerKind::Lstm,
        LayerKind::Gru,
        LayerKind::Pool2D,
        LayerKind::Upres,
        LayerKind::Normalize,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Dense => 1,
            Self::Conv2D => 2,
            Self::Accumulator => 3,
            Self::Lstm => 4,
            Self::Gru => 5,
            Self::Pool2D => 6,
            Self::Upres => 7,
            Self::Normalize => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Input,
            1 => Self::Dense,
            2 => Self::Conv2D,
            3 => Self::Accumulator,
            4 => Self::Lstm,
            5 => Self::Gru,
            6 => Self::Pool2D,
            7 => Self::Upres,
            8 => Self::Normalize,
            _ => return None,
        })
    }

    /// 再帰層（状態キャッシュを持つ）かどうか
    pub fn is_recurrent(self) -> bool {
        matches!(self, Self::Lstm | Self::Gru)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Dense => "Dense",
            Self::Conv2D => "Conv2D",
            Self::Accumulator => "Accumulator",
            Self::Lstm => "LSTM",
            Self::Gru => "GRU",
            Self::Pool2D => "Pool2D",
            Self::Upres => "Upres",
            Self::Normalize => "Normalize",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 層の共通契約
///
/// `run` は内部の出力バッファ（再帰層では隠れ状態）を上書きし、その参照を返す。
/// 同じバッファは次の `run` まで `output` から参照できる。
pub trait Layer {
    /// 層種別
    fn kind(&self) -> LayerKind;

    /// 層名
    fn name(&self) -> &str;

    /// 層名を設定（`LAYER_NAME_LEN` バイトに切り詰める）
    fn set_name(&mut self, name: &str);

    /// 宣言された入力長
    fn input_len(&self) -> usize;

    /// 出力長
    fn output_len(&self) -> usize;

    /// 入力ベクトルから出力を計算する
    ///
    /// `input.len()` は `input_len()` と一致すること（Accumulator のみ以下でよい）。
    fn run(&mut self, input: &[f64]) -> &[f64];

    /// 直近の `run` で計算した出力
    fn output(&self) -> &[f64];

    /// 時間方向の状態を初期化する（状態を持たない層では何もしない）
    fn reset(&mut self) {}

    /// 層ペイロードを読み込む
    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self>
    where
        Self: Sized;

    /// 層ペイロードを書き出す
    fn write(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// 層名を正規化する
pub(crate) fn layer_name(name: &str) -> String {
    fixed_field(name, LAYER_NAME_LEN)
}

pub(crate) fn read_layer_name(reader: &mut ModelReader<'_>) -> ModelResult<String> {
    reader.read_fixed_str(LAYER_NAME_LEN, "layer name")
}

pub(crate) fn write_layer_name(w: &mut dyn Write, name: &str) -> io::Result<()> {
    write_fixed_str(w, name, LAYER_NAME_LEN)
}

/// 一様乱数で重みを初期化する（`[-limit, limit)`）
pub(crate) fn uniform_weights<R: Rng>(rng: &mut R, n: usize, limit: f64) -> Vec<f64> {
    if limit <= 0.0 || !limit.is_finite() {
        return vec![0.0; n];
    }
    (0..n).map(|_| rng.random_range(-limit..limit)).collect()
}

/// Xavier 一様初期化の範囲
pub(crate) fn xavier_limit(fan_in: usize, fan_out: usize) -> f64 {
    let fan = (fan_in + fan_out).max(1) as f64;
    (6.0 / fan).sqrt()
}

/// 次元（非負 i32）を読み、`MAX_VECTOR_LEN` を超えていれば corrupt とする
pub(crate) fn read_dim(reader: &mut ModelReader<'_>, section: &'static str) -> ModelResult<usize> {
    let value = reader.read_count(section)?;
    if value > MAX_VECTOR_LEN {
        return Err(ModelError::corrupt(
            section,
            format!("dimension {value} exceeds {MAX_VECTOR_LEN}"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_code_roundtrip() {
        for code in 0..=8u8 {
            assert_eq!(LayerKind::from_code(code).unwrap().code(), code);
        }
        assert_eq!(LayerKind::from_code(9), None);
    }

    #[test]
    fn test_registry_order_excludes_input() {
        assert!(!LayerKind::REGISTRY_ORDER.contains(&LayerKind::Input));
        assert_eq!(LayerKind::REGISTRY_ORDER.len(), crate::constants::NUM_LAYER_KINDS);
    }
}
