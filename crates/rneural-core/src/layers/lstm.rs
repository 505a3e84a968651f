//! LSTM 層
//!
//! ```text
//! i = σ(W_i x + U_i h' + b_i)
//! f = σ(W_f x + U_f h' + b_f)
//! o = σ(W_o x + U_o h' + b_o)
//! g = tanh(W_c x + U_c h' + b_c)
//! c = f ∘ c' + i ∘ g
//! h = o ∘ tanh(c)
//! ```
//!
//! `h'` は状態キャッシュの前状態。セル状態 `c` は 1 本だけ持ち越す。

use super::activation::sigmoid;
use super::window::checked_area;
use super::{layer_name, read_dim, read_layer_name, uniform_weights, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, write_f64_slice, ModelReader};
use crate::error::ModelResult;
use crate::recurrent::StateCache;
use rand::Rng;
use std::io::{self, Write};

/// LSTM のゲート
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LstmGate {
    Input = 0,
    Forget = 1,
    Output = 2,
    Candidate = 3,
}

const GATES: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Lstm {
    name: String,
    /// 入力次元
    d: usize,
    /// 状態次元
    h: usize,
    /// `[gate][unit][input]`
    w: Vec<f64>,
    /// `[gate][unit][state]`
    u: Vec<f64>,
    /// `[gate][unit]`
    b: Vec<f64>,
    /// セル状態
    cell: Vec<f64>,
    cache: StateCache,
    /// 新しい隠れ状態の作業領域
    scratch: Vec<f64>,
}

impl Lstm {
    /// 重みゼロで作成
    pub fn new(name: &str, d: usize, h: usize, cache: usize) -> Self {
        Self {
            name: layer_name(name),
            d,
            h,
            w: vec![0.0; GATES * h * d],
            u: vec![0.0; GATES * h * h],
            b: vec![0.0; GATES * h],
            cell: vec![0.0; h],
            cache: StateCache::new(h, cache),
            scratch: vec![0.0; h],
        }
    }

    /// `±1/sqrt(h)` の一様分布で W, U を初期化して作成（バイアスは 0）
    pub fn with_rng<R: Rng>(name: &str, d: usize, h: usize, cache: usize, rng: &mut R) -> Self {
        let mut layer = Self::new(name, d, h, cache);
        let limit = 1.0 / (h.max(1) as f64).sqrt();
        layer.w = uniform_weights(rng, GATES * h * d, limit);
        layer.u = uniform_weights(rng, GATES * h * h, limit);
        layer
    }

    pub fn input_dim(&self) -> usize {
        self.d
    }

    pub fn state_dim(&self) -> usize {
        self.h
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn cell(&self) -> &[f64] {
        &self.cell
    }

    /// 入力 `input` → ユニット `unit` の W を設定（範囲外は無視）
    pub fn set_w(&mut self, gate: LstmGate, input: usize, unit: usize, value: f64) {
        if input < self.d && unit < self.h {
            self.w[(gate as usize * self.h + unit) * self.d + input] = value;
        }
    }

    /// 前状態 `from` → ユニット `unit` の U を設定（範囲外は無視）
    pub fn set_u(&mut self, gate: LstmGate, from: usize, unit: usize, value: f64) {
        if from < self.h && unit < self.h {
            self.u[(gate as usize * self.h + unit) * self.h + from] = value;
        }
    }

    pub fn set_b(&mut self, gate: LstmGate, unit: usize, value: f64) {
        if unit < self.h {
            self.b[gate as usize * self.h + unit] = value;
        }
    }

    /// W, U, b を一括設定（いずれかの長さが不一致なら何もしない）
    pub fn set_weights(&mut self, w: &[f64], u: &[f64], b: &[f64]) {
        if w.len() == self.w.len() && u.len() == self.u.len() && b.len() == self.b.len() {
            self.w.copy_from_slice(w);
            self.u.copy_from_slice(u);
            self.b.copy_from_slice(b);
        }
    }

    /// ゲート `gate`・ユニット `k` の前活性
    #[inline]
    fn preactivation(&self, gate: usize, k: usize, x: &[f64], prev: &[f64]) -> f64 {
        let row = gate * self.h + k;
        let wx: f64 = self.w[row * self.d..(row + 1) * self.d].iter().zip(x).map(|(w, x)| w * x).sum();
        let uh: f64 = self.u[row * self.h..(row + 1) * self.h].iter().zip(prev).map(|(u, h)| u * h).sum();
        wx + uh + self.b[row]
    }
}

impl Layer for Lstm {
    fn kind(&self) -> LayerKind {
        LayerKind::Lstm
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = layer_name(name);
    }

    fn input_len(&self) -> usize {
        self.d
    }

    fn output_len(&self) -> usize {
        self.h
    }

    fn run(&mut self, input: &[f64]) -> &[f64] {
        // 前状態はシフト前に読む
        let prev = self.cache.previous();
        let mut next = std::mem::take(&mut self.scratch);
        for k in 0..self.h {
            let i = sigmoid(self.preactivation(LstmGate::Input as usize, k, input, prev));
            let f = sigmoid(self.preactivation(LstmGate::Forget as usize, k, input, prev));
            let o = sigmoid(self.preactivation(LstmGate::Output as usize, k, input, prev));
            let g = self.preactivation(LstmGate::Candidate as usize, k, input, prev).tanh();
            let c = f * self.cell[k] + i * g;
            next[k] = o * c.tanh();
            self.cell[k] = c;
        }
        self.cache.push(&next);
        self.scratch = next;
        self.cache.current()
    }

    fn output(&self) -> &[f64] {
        self.cache.current()
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.cell.fill(0.0);
        self.scratch.fill(0.0);
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "lstm";
        let d = read_dim(reader, SECTION)?;
        let h = read_dim(reader, SECTION)?;
        let cache = read_dim(reader, SECTION)?;
        let history = checked_area(h, cache.max(1), SECTION)?;
        let name = read_layer_name(reader)?;
        reader.reserve_buffers(history, SECTION)?;

        Ok(Self {
            name,
            d,
            h,
            w: reader.read_f64_vec(GATES * h * d, SECTION)?,
            u: reader.read_f64_vec(GATES * h * h, SECTION)?,
            b: reader.read_f64_vec(GATES * h, SECTION)?,
            cell: vec![0.0; h],
            cache: StateCache::new(h, cache),
            scratch: vec![0.0; h],
        })
    }

    fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.d)?;
        write_count(w, self.h)?;
        write_count(w, self.cache.capacity())?;
        write_layer_name(w, &self.name)?;
        write_f64_slice(w, &self.w)?;
        write_f64_slice(w, &self.u)?;
        write_f64_slice(w, &self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 入力 1 ユニット。入力ゲート・出力ゲートを開き、忘却ゲートを閉じた LSTM
    fn gated_lstm(cache: usize) -> Lstm {
        let mut l = Lstm::new("lstm", 1, 1, cache);
        l.set_b(LstmGate::Input, 0, 100.0);
        l.set_b(LstmGate::Output, 0, 100.0);
        l.set_b(LstmGate::Forget, 0, -100.0);
        l.set_w(LstmGate::Candidate, 0, 0, 1.0);
        l
    }

    #[test]
    fn test_state_follows_input_when_forget_closed() {
        let mut l = gated_lstm(2);
        let out = l.run(&[0.5])[0];
        // c = tanh(0.5), h = tanh(c)
        assert!((out - 0.5f64.tanh().tanh()).abs() < 1e-9);
        assert_eq!(l.output(), l.cache().current());
    }

    #[test]
    fn test_previous_state_feeds_recurrence() {
        // U_c = 1 で前状態を候補に足す。W = 0 なので入力は無視される
        let mut l = Lstm::new("lstm", 1, 1, 2);
        l.set_b(LstmGate::Input, 0, 100.0);
        l.set_b(LstmGate::Output, 0, 100.0);
        l.set_b(LstmGate::Forget, 0, -100.0);
        l.set_u(LstmGate::Candidate, 0, 0, 1.0);
        l.set_b(LstmGate::Candidate, 0, 1.0);

        // h_t = tanh(tanh(h_{t-1} + 1))
        let mut expected = 0.0f64;
        for _ in 0..6 {
            expected = (expected + 1.0).tanh().tanh();
            let out = l.run(&[0.0])[0];
            assert!((out - expected).abs() < 1e-9);
            assert!(l.cache().len() <= 2);
        }
    }

    #[test]
    fn test_reset_clears_cell_and_cache() {
        let mut l = gated_lstm(3);
        l.run(&[1.0]);
        l.run(&[1.0]);
        l.reset();
        assert_eq!(l.cache().step(), 0);
        assert_eq!(l.cell(), &[0.0]);
        assert_eq!(l.output(), &[0.0]);
    }

    #[test]
    fn test_read_write_roundtrip_drops_state() {
        let mut l = gated_lstm(4);
        l.run(&[1.0]);
        let mut buf = Vec::new();
        l.write(&mut buf).unwrap();
        let back = Lstm::read(&mut ModelReader::new(&buf)).unwrap();

        l.reset();
        assert_eq!(back, l);
        assert_eq!(back.cache().capacity(), 4);
    }
}
