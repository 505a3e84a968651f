//! 活性化関数
//!
//! Dense のノードごと、Conv2D のフィルタごとに種類とパラメータ `alpha` を持つ。

use serde::Serialize;

/// 活性化関数の種類
///
/// ファイル上は u8 のコード（宣言順）で保存する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Activation {
    /// `max(0, x)`
    Relu,
    /// `x < 0` のとき `alpha * x`
    LeakyRelu,
    /// `1 / (1 + e^-x)`
    #[default]
    Sigmoid,
    /// `tanh(x)`
    Hyperbolic,
    /// 層全体で正規化する指数（Dense 専用）
    Softmax,
    /// `2σ(x) - 1`
    SymmetricSigmoid,
    /// `x > alpha` なら 1、それ以外 0
    Threshold,
    /// `alpha * x`
    Linear,
}

impl Activation {
    pub fn code(self) -> u8 {
        match self {
            Self::Relu => 0,
            Self::LeakyRelu => 1,
            Self::Sigmoid => 2,
            Self::Hyperbolic => 3,
            Self::Softmax => 4,
            Self::SymmetricSigmoid => 5,
            Self::Threshold => 6,
            Self::Linear => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Relu,
            1 => Self::LeakyRelu,
            2 => Self::Sigmoid,
            3 => Self::Hyperbolic,
            4 => Self::Softmax,
            5 => Self::SymmetricSigmoid,
            6 => Self::Threshold,
            7 => Self::Linear,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relu => "ReLU",
            Self::LeakyRelu => "LeakyReLU",
            Self::Sigmoid => "Sigmoid",
            Self::Hyperbolic => "Tanh",
            Self::Softmax => "Softmax",
            Self::SymmetricSigmoid => "SymmetricSigmoid",
            Self::Threshold => "Threshold",
            Self::Linear => "Linear",
        }
    }

    /// 要素単位の活性化を適用する
    ///
    /// Softmax は要素単位では定義できないため恒等写像を返す。
    /// 層側で [`softmax_in_place`] を別途適用すること。
    #[inline]
    pub fn apply(self, x: f64, alpha: f64) -> f64 {
        match self {
            Self::Relu => x.max(0.0),
            Self::LeakyRelu => {
                if x < 0.0 {
                    alpha * x
                } else {
                    x
                }
            }
            Self::Sigmoid => sigmoid(x),
            Self::Hyperbolic => x.tanh(),
            Self::Softmax => x,
            Self::SymmetricSigmoid => 2.0 * sigmoid(x) - 1.0,
            Self::Threshold => {
                if x > alpha {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Linear => alpha * x,
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 指定した要素群に Softmax を適用する（最大値を引いて桁あふれを防ぐ）
pub fn softmax_in_place(values: &mut [f64], mask: impl Fn(usize) -> bool) {
    let max = values
        .iter()
        .enumerate()
        .filter(|(i, _)| mask(*i))
        .map(|(_, &v)| v)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return;
    }

    let mut sum = 0.0;
    for (i, v) in values.iter_mut().enumerate() {
        if mask(i) {
            *v = (*v - max).exp();
            sum += *v;
        }
    }
    for (i, v) in values.iter_mut().enumerate() {
        if mask(i) {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in 0..8u8 {
            let act = Activation::from_code(code).unwrap();
            assert_eq!(act.code(), code);
        }
        assert_eq!(Activation::from_code(8), None);
    }

    #[test]
    fn test_elementwise_values() {
        assert_eq!(Activation::Relu.apply(-2.0, 0.0), 0.0);
        assert_eq!(Activation::LeakyRelu.apply(-2.0, 0.1), -0.2);
        assert_eq!(Activation::LeakyRelu.apply(3.0, 0.1), 3.0);
        assert_eq!(Activation::Sigmoid.apply(0.0, 0.0), 0.5);
        assert_eq!(Activation::SymmetricSigmoid.apply(0.0, 0.0), 0.0);
        assert_eq!(Activation::Threshold.apply(0.4, 0.5), 0.0);
        assert_eq!(Activation::Threshold.apply(0.6, 0.5), 1.0);
        assert_eq!(Activation::Linear.apply(3.0, 2.0), 6.0);
    }

    #[test]
    fn test_softmax_masked() {
        let mut v = [1.0, 1.0, 5.0];
        softmax_in_place(&mut v, |i| i < 2);
        assert!((v[0] - 0.5).abs() < 1e-12);
        assert!((v[1] - 0.5).abs() < 1e-12);
        assert_eq!(v[2], 5.0);
    }
}
