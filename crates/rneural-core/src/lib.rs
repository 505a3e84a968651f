//! # rneural-core
//!
//! バイナリモデルファイルから読み込んだ層グラフの順伝播ランタイム。
//!
//! ## モジュール構成
//!
//! - `layers`: 8 種類の層（Dense, Conv2D, Accumulator, LSTM, GRU, Pool2D, Upres, Normalize）
//! - `recurrent`: 再帰層の状態キャッシュ
//! - `graph`: 層レジストリ・エッジ検証・実行順ソート・実行・モデルファイル入出力
//! - `codec`: リトルエンディアンのバイナリ読み書き
//! - `error`: 型付きエラー
//! - `constants`: ファイル形式の固定長
//!
//! ## 使用例
//!
//! ```
//! use rneural_core::{LayerKind, NeuralNet};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let mut net = NeuralNet::new(2);
//! net.add_dense("hidden", 2, 3, &mut rng);
//! net.add_dense("out", 3, 1, &mut rng);
//! net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Dense, 0).unwrap();
//! net.link_layers(LayerKind::Dense, 0, 0, 3, LayerKind::Dense, 1).unwrap();
//! net.sort_edges();
//! let y = net.run(&[0.5, -0.5]).unwrap();
//! assert_eq!(y.len(), 1);
//! ```

pub mod codec;
pub mod constants;
pub mod error;
pub mod graph;
pub mod layers;
pub mod recurrent;

pub use error::{LinkError, ModelError, ModelResult, RunError, VariableError};
pub use graph::{AnyLayer, Edge, LayerSummary, ModelSummary, NeuralNet, NodeRef, Variable};
pub use layers::{Activation, Layer, LayerKind};
pub use recurrent::StateCache;
