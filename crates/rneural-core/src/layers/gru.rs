//! GRU 層
//!
//! ```text
//! z = σ(W_z x + U_z h' + b_z)
//! r = σ(W_r x + U_r h' + b_r)
//! n = tanh(W_h x + U_h (r ∘ h') + b_h)
//! h = z ∘ h' + (1 - z) ∘ n
//! ```

use super::activation::sigmoid;
use super::window::checked_area;
use super::{layer_name, read_dim, read_layer_name, uniform_weights, write_layer_name, Layer, LayerKind};
use crate::codec::{write_count, write_f64_slice, ModelReader};
use crate::error::ModelResult;
use crate::recurrent::StateCache;
use rand::Rng;
use std::io::{self, Write};

/// GRU のゲート
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GruGate {
    Update = 0,
    Reset = 1,
    Candidate = 2,
}

const GATES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Gru {
    name: String,
    d: usize,
    h: usize,
    /// `[gate][unit][input]`
    w: Vec<f64>,
    /// `[gate][unit][state]`
    u: Vec<f64>,
    /// `[gate][unit]`
    b: Vec<f64>,
    cache: StateCache,
    /// r ∘ h' の作業領域
    gated: Vec<f64>,
    /// z の作業領域
    update: Vec<f64>,
    scratch: Vec<f64>,
}

impl Gru {
    pub fn new(name: &str, d: usize, h: usize, cache: usize) -> Self {
        Self {
            name: layer_name(name),
            d,
            h,
            w: vec![0.0; GATES * h * d],
            u: vec![0.0; GATES * h * h],
            b: vec![0.0; GATES * h],
            cache: StateCache::new(h, cache),
            gated: vec![0.0; h],
            update: vec![0.0; h],
            scratch: vec![0.0; h],
        }
    }

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

    pub fn set_w(&mut self, gate: GruGate, input: usize, unit: usize, value: f64) {
        if input < self.d && unit < self.h {
            self.w[(gate as usize * self.h + unit) * self.d + input] = value;
        }
    }

    pub fn set_u(&mut self, gate: GruGate, from: usize, unit: usize, value: f64) {
        if from < self.h && unit < self.h {
            self.u[(gate as usize * self.h + unit) * self.h + from] = value;
        }
    }

    pub fn set_b(&mut self, gate: GruGate, unit: usize, value: f64) {
        if unit < self.h {
            self.b[gate as usize * self.h + unit] = value;
        }
    }

    pub fn set_weights(&mut self, w: &[f64], u: &[f64], b: &[f64]) {
        if w.len() == self.w.len() && u.len() == self.u.len() && b.len() == self.b.len() {
            self.w.copy_from_slice(w);
            self.u.copy_from_slice(u);
            self.b.copy_from_slice(b);
        }
    }

    #[inline]
    fn preactivation(&self, gate: usize, k: usize, x: &[f64], state: &[f64]) -> f64 {
        let row = gate * self.h + k;
        let wx: f64 = self.w[row * self.d..(row + 1) * self.d].iter().zip(x).map(|(w, x)| w * x).sum();
        let uh: f64 = self.u[row * self.h..(row + 1) * self.h].iter().zip(state).map(|(u, h)| u * h).sum();
        wx + uh + self.b[row]
    }
}

impl Layer for Gru {
    fn kind(&self) -> LayerKind {
        LayerKind::Gru
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
        let prev = self.cache.previous();
        let mut gated = std::mem::take(&mut self.gated);
        let mut update = std::mem::take(&mut self.update);
        let mut next = std::mem::take(&mut self.scratch);

        // r ∘ h' は候補の計算で全ユニット分が必要なので先に求める
        for k in 0..self.h {
            update[k] = sigmoid(self.preactivation(GruGate::Update as usize, k, input, prev));
            let r = sigmoid(self.preactivation(GruGate::Reset as usize, k, input, prev));
            gated[k] = r * prev[k];
        }
        for k in 0..self.h {
            let n = self.preactivation(GruGate::Candidate as usize, k, input, &gated).tanh();
            next[k] = update[k] * prev[k] + (1.0 - update[k]) * n;
        }

        self.cache.push(&next);
        self.gated = gated;
        self.update = update;
        self.scratch = next;
        self.cache.current()
    }

    fn output(&self) -> &[f64] {
        self.cache.current()
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.gated.fill(0.0);
        self.update.fill(0.0);
        self.scratch.fill(0.0);
    }

    fn read(reader: &mut ModelReader<'_>) -> ModelResult<Self> {
        const SECTION: &str = "gru";
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
            cache: StateCache::new(h, cache),
            gated: vec![0.0; h],
            update: vec![0.0; h],
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
