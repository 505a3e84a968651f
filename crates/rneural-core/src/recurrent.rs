//! 再帰層（LSTM / GRU）共通の状態キャッシュ
//!
//! 直近 `capacity` ステップ分の隠れ状態を列として保持するリングバッファ。
//! 時刻カウンタ `t` は上限なく増え続けるが、実体化される列は常に `capacity` 以下。
//!
//! ```text
//! t < capacity : 列 t に書き込む
//! t >= capacity: 列 0 を捨てて左シフト → 最終列に書き込む
//! ```
//!
//! 層は [`StateCache::previous`] を **シフト前に** 読み、計算した新状態を
//! [`StateCache::push`] で書き込む。下流の層は [`StateCache::current`] を読む。
//! 読み手と書き手が同じ添字計算を共有するため、ラップ後に
//! 上書き予定の列を「前状態」として読む取り違えは起きない。

#[derive(Debug, Clone, PartialEq)]
pub struct StateCache {
    /// 状態の次元
    h: usize,
    /// 保持する列数（1 以上）
    capacity: usize,
    /// 時刻カウンタ（これまでの push 回数）
    t: u64,
    /// `capacity × h`（列優先、列 0 が最古）
    columns: Vec<f64>,
    /// t == 0 のときに返すゼロ状態
    zero: Vec<f64>,
}

impl StateCache {
    /// `capacity` が 0 の場合は 1 として扱う
    pub fn new(h: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            h,
            capacity,
            t: 0,
            columns: vec![0.0; capacity * h],
            zero: vec![0.0; h],
        }
    }

    pub fn dim(&self) -> usize {
        self.h
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 時刻カウンタ（実行済みステップ数）
    pub fn step(&self) -> u64 {
        self.t
    }

    /// 実体化されている列数（`capacity` 以下）
    pub fn len(&self) -> usize {
        self.t.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.t == 0
    }

    /// 最新列の添字（t == 0 なら None）
    fn latest_index(&self) -> Option<usize> {
        if self.t == 0 {
            None
        } else if self.t >= self.capacity as u64 {
            Some(self.capacity - 1)
        } else {
            Some(self.t as usize - 1)
        }
    }

    fn col(&self, i: usize) -> &[f64] {
        &self.columns[i * self.h..(i + 1) * self.h]
    }

    /// 直近の `push` で書き込まれた状態（t == 0 ならゼロベクトル）
    pub fn current(&self) -> &[f64] {
        match self.latest_index() {
            Some(i) => self.col(i),
            None => &self.zero,
        }
    }

    /// 次のステップの計算に使う前状態
    ///
    /// `push` 前に読む限り [`current`](Self::current) と同じ列を指す。
    pub fn previous(&self) -> &[f64] {
        self.current()
    }

    /// 古い順に `i` 番目の列
    pub fn column(&self, i: usize) -> Option<&[f64]> {
        (i < self.len()).then(|| self.col(i))
    }

    /// 保持している列を古い順に列挙する
    pub fn history(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.len()).map(move |i| self.col(i))
    }

    /// 新しい状態を書き込み、時刻を 1 進める
    ///
    /// 満杯なら最古の列を捨ててから最終列に書き込む。
    /// `state` の長さが `dim()` と異なる場合、足りない分は 0、余りは捨てる。
    pub fn push(&mut self, state: &[f64]) {
        let h = self.h;
        let target = if self.t >= self.capacity as u64 {
            self.columns.copy_within(h.., 0);
            self.capacity - 1
        } else {
            self.t as usize
        };

        let dst = &mut self.columns[target * h..(target + 1) * h];
        let n = state.len().min(h);
        dst[..n].copy_from_slice(&state[..n]);
        dst[n..].fill(0.0);
        self.t += 1;
    }

    /// 全列をゼロにし、時刻を 0 に戻す
    pub fn reset(&mut self) {
        self.columns.fill(0.0);
        self.t = 0;
    }
}
