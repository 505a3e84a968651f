//! エッジの追加と検証

use super::{Edge, NeuralNet, NodeRef};
use crate::error::LinkError;
use crate::layers::LayerKind;
use std::collections::{HashMap, HashSet, VecDeque};

impl NeuralNet {
    /// `src` の出力 `[start, end)` を `dst` の入力へ配線する
    ///
    /// 検証に失敗した場合はグラフを変更せずにエラーを返す。
    ///
    /// - 入力元・出力先のインデックスが範囲内（INPUT の場合は index 0 のみ）
    /// - 出力先は INPUT 以外
    /// - `start <= end <= 入力元の出力長`
    /// - 選択長 = 出力先の入力長（Accumulator は容量以下）
    /// - 出力先に配線済みの合計が入力長を超えない
    /// - 同一エッジが存在しない
    /// - 閉路ができない
    pub fn link_layers(
        &mut self,
        src_kind: LayerKind,
        src_index: usize,
        start: usize,
        end: usize,
        dst_kind: LayerKind,
        dst_index: usize,
    ) -> Result<(), LinkError> {
        let edge = Edge::new(NodeRef::new(src_kind, src_index), start, end, NodeRef::new(dst_kind, dst_index));
        match self.check_edge(&edge) {
            Ok(()) => {
                log::debug!("linked {edge}");
                self.edges.push(edge);
                Ok(())
            }
            Err(e) => {
                log::warn!("rejected edge {edge}: {e}");
                Err(e)
            }
        }
    }

    /// 既存グラフに `edge` を追加してよいか検証する
    pub(crate) fn check_edge(&self, edge: &Edge) -> Result<(), LinkError> {
        let src = edge.src;
        let dst = edge.dst;

        let src_len = self.output_len(src).ok_or(LinkError::SourceOutOfRange {
            node: src,
            count: if src.is_input() { 1 } else { self.layer_count(src.kind) },
        })?;

        if dst.is_input() {
            return Err(LinkError::InputAsDestination);
        }
        let dst_layer = self.layer(dst).ok_or(LinkError::DestinationOutOfRange {
            node: dst,
            count: self.layer_count(dst.kind),
        })?;
        let capacity = dst_layer.input_len();

        if edge.start > edge.end {
            return Err(LinkError::InvalidSelector { start: edge.start, end: edge.end });
        }
        if edge.end > src_len {
            return Err(LinkError::SelectorOutOfRange {
                node: src,
                start: edge.start,
                end: edge.end,
                len: src_len,
            });
        }

        let selected = edge.len();
        let fits = if dst.kind == LayerKind::Accumulator {
            selected <= capacity
        } else {
            selected == capacity
        };
        if !fits {
            return Err(LinkError::ShapeMismatch { node: dst, selected, expected: capacity });
        }

        if self.edges.contains(edge) {
            return Err(LinkError::DuplicateEdge(*edge));
        }

        let wired: usize = self.edges.iter().filter(|e| e.dst == dst).map(Edge::len).sum();
        let total = wired + selected;
        if total > capacity {
            return Err(LinkError::InputOverflow { node: dst, total, capacity });
        }

        if self.creates_cycle(src, dst) {
            return Err(LinkError::Cycle(*edge));
        }
        Ok(())
    }

    /// `src → dst` を追加すると閉路ができるか（`dst` から `src` へ到達可能か）
    fn creates_cycle(&self, src: NodeRef, dst: NodeRef) -> bool {
        if src == dst {
            return true;
        }
        let mut adjacency: HashMap<NodeRef, Vec<NodeRef>> = HashMap::new();
        for e in &self.edges {
            adjacency.entry(e.src).or_default().push(e.dst);
        }

        let mut seen = HashSet::from([dst]);
        let mut queue = VecDeque::from([dst]);
        while let Some(node) = queue.pop_front() {
            for &next in adjacency.get(&node).into_iter().flatten() {
                if next == src {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Conv2D, Filter2D};

    fn dense_chain() -> NeuralNet {
        // INPUT(3) → D0(3→2) → D1(2→2) → D2(2→1)
        let mut net = NeuralNet::new(3);
        net.add(crate::layers::Dense::new("d0", 3, 2));
        net.add(crate::layers::Dense::new("d1", 2, 2));
        net.add(crate::layers::Dense::new("d2", 2, 1));
        net
    }

    #[test]
    fn test_valid_chain() {
        let mut net = dense_chain();
        net.link_layers(LayerKind::Input, 0, 0, 3, LayerKind::Dense, 0).unwrap();
        net.link_layers(LayerKind::Dense, 0, 0, 2, LayerKind::Dense, 1).unwrap();
        net.link_layers(LayerKind::Dense, 1, 0, 2, LayerKind::Dense, 2).unwrap();
        assert_eq!(net.edges().len(), 3);
    }

    #[test]
    fn test_reject_out_of_range_indices() {
        let mut net = dense_chain();
        let err = net.link_layers(LayerKind::Dense, 5, 0, 2, LayerKind::Dense, 1).unwrap_err();
        assert!(matches!(err, LinkError::SourceOutOfRange { count: 3, .. }));

        let err = net.link_layers(LayerKind::Input, 1, 0, 3, LayerKind::Dense, 0).unwrap_err();
        assert!(matches!(err, LinkError::SourceOutOfRange { count: 1, .. }));

        let err = net.link_layers(LayerKind::Input, 0, 0, 3, LayerKind::Gru, 0).unwrap_err();
        assert!(matches!(err, LinkError::DestinationOutOfRange { count: 0, .. }));
        assert!(net.edges().is_empty());
    }

    #[test]
    fn test_reject_input_destination() {
        let mut net = dense_chain();
        let err = net.link_layers(LayerKind::Dense, 0, 0, 2, LayerKind::Input, 0).unwrap_err();
        assert_eq!(err, LinkError::InputAsDestination);
    }

    #[test]
    fn test_reject_bad_selectors() {
        let mut net = dense_chain();
        let err = net.link_layers(LayerKind::Input, 0, 2, 1, LayerKind::Dense, 0).unwrap_err();
        assert_eq!(err, LinkError::InvalidSelector { start: 2, end: 1 });

        let err = net.link_layers(LayerKind::Input, 0, 0, 4, LayerKind::Dense, 0).unwrap_err();
        assert!(matches!(err, LinkError::SelectorOutOfRange { len: 3, .. }));
    }

    #[test]
    fn test_reject_shape_mismatch() {
        let mut net = dense_chain();
        // D1 は 2 入力
        let err = net.link_layers(LayerKind::Input, 0, 0, 3, LayerKind::Dense, 1).unwrap_err();
        assert!(matches!(err, LinkError::ShapeMismatch { selected: 3, expected: 2, .. }));
    }

    #[test]
    fn test_accumulator_accepts_partial_and_rejects_overflow() {
        let mut net = NeuralNet::new(4);
        net.add_accumulator("acc", 5);
        net.link_layers(LayerKind::Input, 0, 0, 3, LayerKind::Accumulator, 0).unwrap();
        net.link_layers(LayerKind::Input, 0, 3, 4, LayerKind::Accumulator, 0).unwrap();
        let err = net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Accumulator, 0).unwrap_err();
        assert_eq!(
            err,
            LinkError::InputOverflow { node: NodeRef::new(LayerKind::Accumulator, 0), total: 6, capacity: 5 }
        );
        assert_eq!(net.edges().len(), 2);
    }

    #[test]
    fn test_reject_second_full_width_edge() {
        let mut net = dense_chain();
        net.link_layers(LayerKind::Dense, 0, 0, 2, LayerKind::Dense, 1).unwrap();
        net.add(crate::layers::Dense::new("d3", 3, 2));
        let err = net.link_layers(LayerKind::Dense, 3, 0, 2, LayerKind::Dense, 1).unwrap_err();
        assert!(matches!(err, LinkError::InputOverflow { total: 4, capacity: 2, .. }));
    }

    #[test]
    fn test_reject_duplicate() {
        let mut net = NeuralNet::new(2);
        net.add_accumulator("acc", 4);
        net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Accumulator, 0).unwrap();
        let err = net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Accumulator, 0).unwrap_err();
        assert!(matches!(err, LinkError::DuplicateEdge(_)));
    }

    #[test]
    fn test_reject_cycles() {
        let mut net = NeuralNet::new(2);
        net.add_accumulator("a", 4);
        net.add_accumulator("b", 4);
        net.add_accumulator("c", 4);
        net.link_layers(LayerKind::Accumulator, 0, 0, 2, LayerKind::Accumulator, 1).unwrap();
        net.link_layers(LayerKind::Accumulator, 1, 0, 2, LayerKind::Accumulator, 2).unwrap();

        // c → a は a → b → c と閉路になる
        let err = net.link_layers(LayerKind::Accumulator, 2, 0, 2, LayerKind::Accumulator, 0).unwrap_err();
        assert!(matches!(err, LinkError::Cycle(_)));

        // 自己ループ
        let err = net.link_layers(LayerKind::Accumulator, 1, 0, 1, LayerKind::Accumulator, 1).unwrap_err();
        assert!(matches!(err, LinkError::Cycle(_)));
        assert_eq!(net.edges().len(), 2);
    }

    #[test]
    fn test_conv_output_slice_into_dense() {
        let mut net = NeuralNet::new(9);
        let mut conv = Conv2D::new("conv", 3, 3);
        conv.add_filter(Filter2D::new(2, 2));
        conv.add_filter(Filter2D::new(3, 3));
        net.add(conv);
        net.add(crate::layers::Dense::new("head", 4, 1));

        net.link_layers(LayerKind::Input, 0, 0, 9, LayerKind::Conv2D, 0).unwrap();
        // 出力 = 2×2 + 1×1 = 5、先頭 4 要素（第 1 フィルタ）のみ Dense へ
        net.link_layers(LayerKind::Conv2D, 0, 0, 4, LayerKind::Dense, 0).unwrap();
        let err = net.link_layers(LayerKind::Conv2D, 0, 0, 6, LayerKind::Dense, 0).unwrap_err();
        assert!(matches!(err, LinkError::SelectorOutOfRange { len: 5, .. }));
    }
}
