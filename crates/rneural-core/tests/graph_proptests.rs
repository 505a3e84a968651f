//! ランダムな配線列に対するグラフ不変条件

use proptest::prelude::*;
use rneural_core::layers::Dense;
use rneural_core::{Edge, LayerKind, LinkError, NeuralNet, NodeRef};
use std::collections::{HashMap, HashSet};

const INPUTS: usize = 4;
const ACCUMULATOR_SIZES: [usize; 5] = [4, 3, 5, 2, 6];
const DENSE_COUNT: usize = 2;

fn build_layers() -> NeuralNet {
    let mut net = NeuralNet::new(INPUTS);
    for (i, &size) in ACCUMULATOR_SIZES.iter().enumerate() {
        net.add_accumulator(&format!("acc{i}"), size);
    }
    for i in 0..DENSE_COUNT {
        net.add(Dense::new(&format!("dense{i}"), 3, 2));
    }
    net
}

fn source(i: usize) -> NodeRef {
    match i {
        0 => NodeRef::INPUT,
        i if i <= ACCUMULATOR_SIZES.len() => NodeRef::new(LayerKind::Accumulator, i - 1),
        i => NodeRef::new(LayerKind::Dense, i - 1 - ACCUMULATOR_SIZES.len()),
    }
}

fn destination(i: usize) -> NodeRef {
    if i < ACCUMULATOR_SIZES.len() {
        NodeRef::new(LayerKind::Accumulator, i)
    } else {
        NodeRef::new(LayerKind::Dense, i - ACCUMULATOR_SIZES.len())
    }
}

fn arb_attempts() -> impl Strategy<Value = Vec<(usize, usize, usize, usize)>> {
    let sources = 1 + ACCUMULATOR_SIZES.len() + DENSE_COUNT;
    let destinations = ACCUMULATOR_SIZES.len() + DENSE_COUNT;
    prop::collection::vec((0..sources, 0..destinations, 0usize..6, 0usize..7), 0..40)
}

/// 採用されたエッジのみからなるグラフを作る
fn wire(attempts: &[(usize, usize, usize, usize)]) -> NeuralNet {
    let mut net = build_layers();
    for &(s, d, start, len) in attempts {
        let src = source(s);
        let dst = destination(d);
        let _ = net.link_layers(src.kind, src.index, start, start + len, dst.kind, dst.index);
    }
    net
}

fn is_acyclic(edges: &[Edge]) -> bool {
    let mut indegree: HashMap<NodeRef, usize> = HashMap::new();
    for e in edges {
        indegree.entry(e.src).or_default();
        *indegree.entry(e.dst).or_default() += 1;
    }
    let mut ready: Vec<NodeRef> = indegree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
    let mut visited = 0;
    while let Some(node) = ready.pop() {
        visited += 1;
        for e in edges.iter().filter(|e| e.src == node) {
            let d = indegree.entry(e.dst).or_default();
            *d -= 1;
            if *d == 0 {
                ready.push(e.dst);
            }
        }
    }
    visited == indegree.len()
}

fn edge_key(e: &Edge) -> (NodeRef, usize, usize, NodeRef) {
    (e.src, e.start, e.end, e.dst)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn prop_accepted_edges_are_acyclic(attempts in arb_attempts()) {
        let net = wire(&attempts);
        prop_assert!(is_acyclic(net.edges()));
    }

    #[test]
    fn prop_accepted_edges_obey_shape_law(attempts in arb_attempts()) {
        let net = wire(&attempts);
        let mut wired: HashMap<NodeRef, usize> = HashMap::new();
        for e in net.edges() {
            let src_len = net.output_len(e.src).unwrap();
            let dst_len = net.layer(e.dst).unwrap().input_len();
            prop_assert!(e.start <= e.end && e.end <= src_len);
            if e.dst.kind == LayerKind::Accumulator {
                prop_assert!(e.len() <= dst_len);
            } else {
                prop_assert_eq!(e.len(), dst_len);
            }
            *wired.entry(e.dst).or_default() += e.len();
        }
        for (node, total) in wired {
            prop_assert!(total <= net.layer(node).unwrap().input_len());
        }
    }

    #[test]
    fn prop_single_edge_accepted_iff_shape_fits(
        s in 0..1 + ACCUMULATOR_SIZES.len() + DENSE_COUNT,
        d in 0..ACCUMULATOR_SIZES.len() + DENSE_COUNT,
        start in 0usize..8,
        end in 0usize..8,
    ) {
        let mut net = build_layers();
        let src = source(s);
        let dst = destination(d);
        let src_len = net.output_len(src).unwrap();
        let capacity = net.layer(dst).unwrap().input_len();

        let result = net.link_layers(src.kind, src.index, start, end, dst.kind, dst.index);
        if start > end {
            prop_assert!(matches!(result, Err(LinkError::InvalidSelector { .. })), "{:?}", result);
        } else if end > src_len {
            prop_assert!(matches!(result, Err(LinkError::SelectorOutOfRange { .. })), "{:?}", result);
        } else {
            let selected = end - start;
            let fits = if dst.kind == LayerKind::Accumulator { selected <= capacity } else { selected == capacity };
            if !fits {
                prop_assert!(matches!(result, Err(LinkError::ShapeMismatch { .. })), "{:?}", result);
            } else if src == dst {
                prop_assert!(matches!(result, Err(LinkError::Cycle(_))), "{:?}", result);
            } else {
                prop_assert_eq!(result, Ok(()));
                prop_assert_eq!(net.edges(), &[Edge::new(src, start, end, dst)][..]);
            }
        }
    }

    #[test]
    fn prop_sorted_edges_are_topological(attempts in arb_attempts()) {
        let mut net = wire(&attempts);
        let mut before: Vec<_> = net.edges().iter().map(edge_key).collect();
        net.sort_edges();
        let edges = net.edges().to_vec();

        // 集合は変わらない
        let mut after: Vec<_> = edges.iter().map(edge_key).collect();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);

        // 入力元へのエッジはすべて先に現れる
        for (pos, e) in edges.iter().enumerate() {
            for (earlier, feeder) in edges.iter().enumerate() {
                if feeder.dst == e.src {
                    prop_assert!(earlier < pos, "{} must precede {}", feeder, e);
                }
            }
        }

        // 出力先ごとのエッジは連続する
        let mut closed: HashSet<NodeRef> = HashSet::new();
        for pair in edges.windows(2) {
            if pair[0].dst != pair[1].dst {
                prop_assert!(closed.insert(pair[0].dst));
                prop_assert!(!closed.contains(&pair[1].dst));
            }
        }

        if !edges.is_empty() {
            prop_assert!(net.run(&[0.1, 0.2, 0.3, 0.4]).is_ok());
        }
    }
}
