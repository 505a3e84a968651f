//! エラー型
//!
//! グラフ構築・実行・モデルファイル入出力のそれぞれに型付きエラーを用意する。

use crate::graph::{Edge, NodeRef};

/// `link_layers` の失敗理由
///
/// どの失敗でもグラフは変更されない。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// 入力元インデックスが範囲外
    #[error("Source {node} out of range (count: {count})")]
    SourceOutOfRange { node: NodeRef, count: usize },

    /// 出力先インデックスが範囲外
    #[error("Destination {node} out of range (count: {count})")]
    DestinationOutOfRange { node: NodeRef, count: usize },

    /// INPUT 擬似ノードを出力先に指定した
    #[error("Network input cannot be an edge destination")]
    InputAsDestination,

    /// セレクタが逆転している（start > end）
    #[error("Invalid selector [{start}, {end})")]
    InvalidSelector { start: usize, end: usize },

    /// セレクタが入力元の出力長を超えている
    #[error("Selector [{start}, {end}) exceeds output length {len} of {node}")]
    SelectorOutOfRange { node: NodeRef, start: usize, end: usize, len: usize },

    /// 選択長が出力先の入力長と一致しない
    #[error("Shape mismatch: {selected} elements selected, {node} expects {expected}")]
    ShapeMismatch { node: NodeRef, selected: usize, expected: usize },

    /// 出力先へ配線済みの要素数の合計が入力長を超える
    #[error("Input of {node} overflows: {total} elements wired into capacity {capacity}")]
    InputOverflow { node: NodeRef, total: usize, capacity: usize },

    /// 全く同じエッジが既に存在する
    #[error("Duplicate edge: {0}")]
    DuplicateEdge(Edge),

    /// エッジを追加すると閉路ができる
    #[error("Edge {0} would create a cycle")]
    Cycle(Edge),
}

/// `run` の失敗理由
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// 入力ベクトル長がネットワーク入力数と一致しない
    #[error("Input length mismatch: expected {expected}, got {actual}")]
    InputLength { expected: usize, actual: usize },

    /// エッジが 1 本もない
    #[error("Network has no edges")]
    NoEdges,

    /// エッジ列がトポロジカル順になっていない
    #[error("Edges are not in execution order at {0} (call sort_edges first)")]
    NotSorted(Edge),

    /// 配線後に入力元の出力長か出力先の入力長が変わり、エッジが形状規則を満たさなくなった
    #[error("Edge {0} no longer fits the current layer shapes")]
    ShapeChanged(Edge),
}

/// 変数（名前付きスカラー）操作の失敗理由
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    /// 変数の個数が上限に達している
    #[error("Variable table is full ({0} entries)")]
    Full(usize),
}

/// モデルファイル入出力エラー
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 宣言された個数・次元がバイト列と矛盾している
    #[error("Corrupt model ({section}): {message}")]
    Corrupt { section: &'static str, message: String },

    /// バイト列が途中で終わっている
    #[error("Truncated model ({section}): needed {needed} bytes, {remaining} remaining")]
    Truncated { section: &'static str, needed: usize, remaining: usize },

    /// 変数が多すぎて個数フィールド（u8）に収まらない
    #[error("Too many variables to serialize: {0}")]
    TooManyVariables(usize),
}

impl ModelError {
    pub(crate) fn corrupt(section: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt { section, message: message.into() }
    }
}

/// Result type for model file operations
pub type ModelResult<T> = Result<T, ModelError>;
