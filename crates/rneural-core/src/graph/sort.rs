//! エッジの実行順への並べ替え
//!
//! 出力層（外向きエッジを持たない層）へのエッジをバッチ 0 とし、
//! 「直前バッチの入力元へ向かうエッジ」を次のバッチとして逆向きに幅優先で辿る。
//! 同じエッジが複数のバッチに現れた場合は最も深いバッチ（= 最も早く実行される位置）
//! だけを残す。最後にバッチを深い順に並べ、バッチ内では出力先ごとにまとめる。

use super::{Edge, NeuralNet, NodeRef};
use std::collections::HashSet;

impl NeuralNet {
    /// エッジ列をトポロジカル順に並べ替える
    ///
    /// 並べ替え後は各出力先へのエッジが連続し、入力元はそれを読む層より前に実行される。
    /// エッジの集合は変わらない。
    pub fn sort_edges(&mut self) {
        if self.edges.is_empty() {
            return;
        }
        let batch_of = assign_batches(&self.edges);
        let deepest = batch_of.iter().flatten().copied().max().unwrap_or(0);

        let mut sorted = Vec::with_capacity(self.edges.len());
        for batch in (0..=deepest).rev() {
            let members: Vec<Edge> = self
                .edges
                .iter()
                .zip(&batch_of)
                .filter(|(_, b)| **b == Some(batch))
                .map(|(e, _)| *e)
                .collect();
            group_by_destination(&members, &mut sorted);
        }

        // 出力層へ到達しないエッジ（閉路内のみ）は末尾に元の順で残す
        let stranded: Vec<Edge> =
            self.edges.iter().zip(&batch_of).filter(|(_, b)| b.is_none()).map(|(e, _)| *e).collect();
        if !stranded.is_empty() {
            log::warn!("{} edges do not reach an output layer", stranded.len());
            sorted.extend(stranded);
        }

        log::debug!("sorted {} edges into {} batches", sorted.len(), deepest + 1);
        self.edges = sorted;
    }
}

/// 各エッジのバッチ番号（0 = 出力層へのエッジ）
fn assign_batches(edges: &[Edge]) -> Vec<Option<usize>> {
    let sources: HashSet<NodeRef> = edges.iter().map(|e| e.src).collect();
    let mut batch_of: Vec<Option<usize>> = vec![None; edges.len()];

    let mut frontier: Vec<usize> = (0..edges.len()).filter(|&i| !sources.contains(&edges[i].dst)).collect();
    let mut batch = 0;
    // 非巡回なら深さはエッジ数以下
    while !frontier.is_empty() && batch <= edges.len() {
        for &i in &frontier {
            batch_of[i] = Some(batch);
        }
        let feeding: HashSet<NodeRef> = frontier.iter().map(|&i| edges[i].src).collect();
        frontier = (0..edges.len()).filter(|&i| feeding.contains(&edges[i].dst)).collect();
        batch += 1;
    }
    batch_of
}

/// 出力先の初出順を保ったまま、同じ出力先のエッジを連続させる
fn group_by_destination(members: &[Edge], out: &mut Vec<Edge>) {
    let mut seen: Vec<NodeRef> = Vec::new();
    for e in members {
        if !seen.contains(&e.dst) {
            seen.push(e.dst);
        }
    }
    for dst in seen {
        out.extend(members.iter().filter(|e| e.dst == dst));
    }
}
