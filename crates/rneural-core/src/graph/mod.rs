//! 計算グラフ
//!
//! 層は種類ごとのレジストリ（8 本の `Vec`）に格納され、`(kind, index)` の組
//! [`NodeRef`] でのみ参照される。エッジは入力元の出力スライス `[start, end)` を
//! 出力先の入力ベクトルへ流し込む。
//!
//! ```text
//! NeuralNet
//! ├── registry: Dense[] / Conv2D[] / Accumulator[] / LSTM[] / GRU[] / Pool2D[] / Upres[] / Normalize[]
//! ├── edges: [Edge]   (sort_edges 後は実行順)
//! └── metadata: generation / fitness / comment / variables
//! ```
//!
//! 構築の流れ: `add_*` で層を追加 → `link_layers` で配線 → `sort_edges` → `run`

mod io;
mod link;
mod run;
mod sort;
mod summary;

pub use summary::{LayerSummary, ModelSummary};

use crate::codec::fixed_field;
use crate::constants::{COMMENT_LEN, MAX_VARIABLES, VARIABLE_KEY_LEN};
use crate::error::VariableError;
use crate::layers::{
    Accumulator, Conv2D, Dense, Gru, Layer, LayerKind, Lstm, Normalize, Pool2D, Upres,
};
use rand::Rng;
use serde::Serialize;

/// 層への参照 `(kind, index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeRef {
    pub kind: LayerKind,
    pub index: usize,
}

impl NodeRef {
    /// ネットワーク入力の擬似ノード
    pub const INPUT: NodeRef = NodeRef { kind: LayerKind::Input, index: 0 };

    pub const fn new(kind: LayerKind, index: usize) -> Self {
        Self { kind, index }
    }

    pub fn is_input(&self) -> bool {
        self.kind == LayerKind::Input
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// スライス付きの有向エッジ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub src: NodeRef,
    /// 選択範囲の開始（含む）
    pub start: usize,
    /// 選択範囲の終了（含まない）
    pub end: usize,
    pub dst: NodeRef,
}

impl Edge {
    pub const fn new(src: NodeRef, start: usize, end: usize, dst: NodeRef) -> Self {
        Self { src, start, end, dst }
    }

    /// 選択する要素数
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..{}] -> {}", self.src, self.start, self.end, self.dst)
    }
}

/// 名前付きスカラー（実行には使わない注釈）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub key: String,
    pub value: f64,
}

/// 任意の層（レジストリへの追加用）
#[derive(Debug, Clone)]
pub enum AnyLayer {
    Dense(Dense),
    Conv2D(Conv2D),
    Accumulator(Accumulator),
    Lstm(Lstm),
    Gru(Gru),
    Pool2D(Pool2D),
    Upres(Upres),
    Normalize(Normalize),
}

macro_rules! any_layer_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for AnyLayer {
                fn from(layer: $variant) -> Self {
                    AnyLayer::$variant(layer)
                }
            }
        )*
    };
}

any_layer_from!(Dense, Conv2D, Accumulator, Lstm, Gru, Pool2D, Upres, Normalize);

/// 種類別の層レジストリ
#[derive(Debug, Clone, Default)]
pub(crate) struct Registry {
    pub(crate) dense: Vec<Dense>,
    pub(crate) conv2d: Vec<Conv2D>,
    pub(crate) accum: Vec<Accumulator>,
    pub(crate) lstm: Vec<Lstm>,
    pub(crate) gru: Vec<Gru>,
    pub(crate) pool: Vec<Pool2D>,
    pub(crate) upres: Vec<Upres>,
    pub(crate) normal: Vec<Normalize>,
}

impl Registry {
    pub(crate) fn count(&self, kind: LayerKind) -> usize {
        match kind {
            LayerKind::Input => 0,
            LayerKind::Dense => self.dense.len(),
            LayerKind::Conv2D => self.conv2d.len(),
            LayerKind::Accumulator => self.accum.len(),
            LayerKind::Lstm => self.lstm.len(),
            LayerKind::Gru => self.gru.len(),
            LayerKind::Pool2D => self.pool.len(),
            LayerKind::Upres => self.upres.len(),
            LayerKind::Normalize => self.normal.len(),
        }
    }

    pub(crate) fn get(&self, node: NodeRef) -> Option<&dyn Layer> {
        let i = node.index;
        match node.kind {
            LayerKind::Input => None,
            LayerKind::Dense => self.dense.get(i).map(|l| l as &dyn Layer),
            LayerKind::Conv2D => self.conv2d.get(i).map(|l| l as &dyn Layer),
            LayerKind::Accumulator => self.accum.get(i).map(|l| l as &dyn Layer),
            LayerKind::Lstm => self.lstm.get(i).map(|l| l as &dyn Layer),
            LayerKind::Gru => self.gru.get(i).map(|l| l as &dyn Layer),
            LayerKind::Pool2D => self.pool.get(i).map(|l| l as &dyn Layer),
            LayerKind::Upres => self.upres.get(i).map(|l| l as &dyn Layer),
            LayerKind::Normalize => self.normal.get(i).map(|l| l as &dyn Layer),
        }
    }

    pub(crate) fn get_mut(&mut self, node: NodeRef) -> Option<&mut dyn Layer> {
        let i = node.index;
        match node.kind {
            LayerKind::Input => None,
            LayerKind::Dense => self.dense.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Conv2D => self.conv2d.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Accumulator => self.accum.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Lstm => self.lstm.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Gru => self.gru.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Pool2D => self.pool.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Upres => self.upres.get_mut(i).map(|l| l as &mut dyn Layer),
            LayerKind::Normalize => self.normal.get_mut(i).map(|l| l as &mut dyn Layer),
        }
    }

    /// シリアライズ順（種類順 → インデックス順）に全層を列挙する
    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeRef, &dyn Layer)> + '_ {
        LayerKind::REGISTRY_ORDER.into_iter().flat_map(move |kind| {
            (0..self.count(kind)).filter_map(move |i| {
                let node = NodeRef::new(kind, i);
                self.get(node).map(|l| (node, l))
            })
        })
    }

    fn push(&mut self, layer: AnyLayer) -> usize {
        match layer {
            AnyLayer::Dense(l) => push_len(&mut self.dense, l),
            AnyLayer::Conv2D(l) => push_len(&mut self.conv2d, l),
            AnyLayer::Accumulator(l) => push_len(&mut self.accum, l),
            AnyLayer::Lstm(l) => push_len(&mut self.lstm, l),
            AnyLayer::Gru(l) => push_len(&mut self.gru, l),
            AnyLayer::Pool2D(l) => push_len(&mut self.pool, l),
            AnyLayer::Upres(l) => push_len(&mut self.upres, l),
            AnyLayer::Normalize(l) => push_len(&mut self.normal, l),
        }
    }
}

fn push_len<T>(v: &mut Vec<T>, item: T) -> usize {
    v.push(item);
    v.len()
}

/// ニューラルネットワーク（層レジストリ + エッジ列 + メタデータ）
///
/// 1 インスタンスを同時に複数スレッドから `run` してはならない。
/// 並列推論には `clone()` でワーカーごとに複製する（重みと状態を深くコピーする）。
#[derive(Debug, Clone)]
pub struct NeuralNet {
    inputs: usize,
    pub(crate) registry: Registry,
    pub(crate) edges: Vec<Edge>,
    generation: i32,
    fitness: f64,
    comment: String,
    variables: Vec<Variable>,
    /// 直近の `run` に渡された入力（INPUT ノードの出力）
    input_buf: Vec<f64>,
}

impl NeuralNet {
    /// 入力数 `inputs` の空のネットワークを作成
    pub fn new(inputs: usize) -> Self {
        Self {
            inputs,
            registry: Registry::default(),
            edges: Vec::new(),
            generation: 0,
            fitness: 0.0,
            comment: String::new(),
            variables: Vec::new(),
            input_buf: vec![0.0; inputs],
        }
    }

    /// ネットワーク入力数
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// 層を追加し、同種の層の個数を返す
    pub fn add(&mut self, layer: impl Into<AnyLayer>) -> usize {
        let layer = layer.into();
        let count = self.registry.push(layer);
        log::debug!("added layer #{count}");
        count
    }

    pub fn add_dense<R: Rng>(&mut self, name: &str, inputs: usize, nodes: usize, rng: &mut R) -> usize {
        self.add(Dense::with_rng(name, inputs, nodes, rng))
    }

    /// フィルタなしの Conv2D を追加（フィルタは `conv2d_mut` 経由で追加する）
    pub fn add_conv2d(&mut self, name: &str, width: usize, height: usize) -> usize {
        self.add(Conv2D::new(name, width, height))
    }

    pub fn add_accumulator(&mut self, name: &str, size: usize) -> usize {
        self.add(Accumulator::new(name, size))
    }

    pub fn add_lstm<R: Rng>(&mut self, name: &str, d: usize, h: usize, cache: usize, rng: &mut R) -> usize {
        self.add(Lstm::with_rng(name, d, h, cache, rng))
    }

    pub fn add_gru<R: Rng>(&mut self, name: &str, d: usize, h: usize, cache: usize, rng: &mut R) -> usize {
        self.add(Gru::with_rng(name, d, h, cache, rng))
    }

    pub fn add_pool2d(&mut self, name: &str, width: usize, height: usize) -> usize {
        self.add(Pool2D::new(name, width, height))
    }

    pub fn add_upres(&mut self, name: &str, width: usize, height: usize) -> usize {
        self.add(Upres::new(name, width, height))
    }

    pub fn add_normalize(&mut self, name: &str, size: usize) -> usize {
        self.add(Normalize::new(name, size))
    }

    /// 種類 `kind` の層数（INPUT は 0）
    pub fn layer_count(&self, kind: LayerKind) -> usize {
        self.registry.count(kind)
    }

    /// 層への参照（INPUT・範囲外は None）
    pub fn layer(&self, node: NodeRef) -> Option<&dyn Layer> {
        self.registry.get(node)
    }

    pub fn layer_mut(&mut self, node: NodeRef) -> Option<&mut dyn Layer> {
        self.registry.get_mut(node)
    }

    /// 全層を種類順・インデックス順に列挙する
    pub fn layers(&self) -> impl Iterator<Item = (NodeRef, &dyn Layer)> + '_ {
        self.registry.iter()
    }

    /// ノードの出力長（INPUT はネットワーク入力数）
    pub fn output_len(&self, node: NodeRef) -> Option<usize> {
        if node.is_input() {
            return (node.index == 0).then_some(self.inputs);
        }
        self.registry.get(node).map(|l| l.output_len())
    }

    /// ノードが現在保持している出力（再帰層は最新の隠れ状態）
    pub fn output_of(&self, node: NodeRef) -> Option<&[f64]> {
        if node.is_input() {
            return (node.index == 0).then_some(self.input_buf.as_slice());
        }
        self.registry.get(node).map(|l| l.output())
    }

    /// エッジ列（`sort_edges` 後は実行順）
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// 名前が一致する最初の層（種類順 → インデックス順で探索）
    pub fn find(&self, name: &str) -> Option<NodeRef> {
        self.registry.iter().find(|(_, l)| l.name() == name).map(|(node, _)| node)
    }

    /// 名前が一致する最初の層のインデックス
    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.find(name).map(|n| n.index)
    }

    /// 名前が一致する最初の層の種類
    pub fn name_type(&self, name: &str) -> Option<LayerKind> {
        self.find(name).map(|n| n.kind)
    }

    /// 全再帰層の時間状態を初期化する（重みは保持）
    pub fn reset(&mut self) {
        for l in &mut self.registry.lstm {
            l.reset();
        }
        for l in &mut self.registry.gru {
            l.reset();
        }
    }

    pub fn generation(&self) -> i32 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: i32) {
        self.generation = generation;
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// コメントを設定（最初の NUL まで、`COMMENT_LEN` バイトに切り詰める）
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = fixed_field(comment, COMMENT_LEN);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// 変数の値（キーが重複する場合は最初のもの）
    pub fn variable(&self, key: &str) -> Option<f64> {
        self.variables.iter().find(|v| v.key == key).map(|v| v.value)
    }

    /// 変数を追加し、変数の個数を返す（キーは `VARIABLE_KEY_LEN` バイトに切り詰める）
    pub fn add_variable(&mut self, key: &str, value: f64) -> Result<usize, VariableError> {
        if self.variables.len() >= MAX_VARIABLES {
            return Err(VariableError::Full(self.variables.len()));
        }
        self.variables.push(Variable { key: fixed_field(key, VARIABLE_KEY_LEN), value });
        Ok(self.variables.len())
    }

    /// 既存の変数を更新し、なければ追加する
    pub fn set_variable(&mut self, key: &str, value: f64) -> Result<(), VariableError> {
        let key = fixed_field(key, VARIABLE_KEY_LEN);
        match self.variables.iter_mut().find(|v| v.key == key) {
            Some(v) => {
                v.value = value;
                Ok(())
            }
            None => self.add_variable(&key, value).map(|_| ()),
        }
    }
}

macro_rules! layer_accessors {
    ($($field:ident, $get:ident, $get_mut:ident, $ty:ty;)*) => {
        impl NeuralNet {
            $(
                pub fn $get(&self, index: usize) -> Option<&$ty> {
                    self.registry.$field.get(index)
                }

                pub fn $get_mut(&mut self, index: usize) -> Option<&mut $ty> {
                    self.registry.$field.get_mut(index)
                }
            )*
        }
    };
}

layer_accessors! {
    dense, dense, dense_mut, Dense;
    conv2d, conv2d, conv2d_mut, Conv2D;
    accum, accumulator, accumulator_mut, Accumulator;
    lstm, lstm, lstm_mut, Lstm;
    gru, gru, gru_mut, Gru;
    pool, pool2d, pool2d_mut, Pool2D;
    upres, upres, upres_mut, Upres;
    normal, normalize, normalize_mut, Normalize;
}
