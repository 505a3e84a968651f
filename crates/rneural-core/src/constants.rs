//! モデルファイル形式の固定長定数
//!
//! いずれもファイル上のバイト長に直結するため、変更するとモデルファイルの互換性が失われる。

/// レイヤー名フィールドのバイト長（UTF-8、NUL 埋め）
pub const LAYER_NAME_LEN: usize = 32;

/// コメントフィールドのバイト長（UTF-8、NUL 埋め）
pub const COMMENT_LEN: usize = 64;

/// 変数キーフィールドのバイト長（UTF-8、NUL 埋め）
pub const VARIABLE_KEY_LEN: usize = 16;

/// 変数の最大個数（ファイル上の個数フィールドが u8 のため）
pub const MAX_VARIABLES: usize = u8::MAX as usize;

/// 層の種類数（INPUT 擬似ノードを除く）
pub const NUM_LAYER_KINDS: usize = 8;

/// 層 1 つあたりのベクトル長の上限（読み込み時の健全性チェック用）
pub const MAX_VECTOR_LEN: usize = 1 << 24;

/// モデル 1 つの読み込みで確保する出力・状態バッファの合計要素数の上限
///
/// 層の重みと違い、これらはファイル上の数バイトの次元指定だけで確保される。
pub const MAX_MODEL_BUFFER_LEN: usize = 1 << 24;
