//! 複数の入力元を Accumulator に集約するケース

use rneural_core::layers::{Activation, Dense};
use rneural_core::{LayerKind, LinkError, NeuralNet};

/// 重み 1 の線形 Dense（入力 `inputs` 個の総和 + オフセットを各ノードに出す）
fn summing_dense(name: &str, inputs: usize, nodes: usize, offset: f64) -> Dense {
    let mut d = Dense::new(name, inputs, nodes);
    for k in 0..nodes {
        let mut w = vec![1.0; inputs];
        w.push(offset + k as f64);
        d.set_node_weights(k, &w);
    }
    d.set_activation_all(Activation::Linear);
    d
}

fn fan_in_net() -> NeuralNet {
    let mut net = NeuralNet::new(2);
    net.add(summing_dense("three", 2, 3, 0.0));
    net.add(summing_dense("two", 2, 2, 10.0));
    net.add_accumulator("concat", 5);

    net.link_layers(LayerKind::Dense, 0, 0, 3, LayerKind::Accumulator, 0).unwrap();
    net.link_layers(LayerKind::Dense, 1, 0, 2, LayerKind::Accumulator, 0).unwrap();
    net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Dense, 1).unwrap();
    net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Dense, 0).unwrap();
    net.sort_edges();
    net
}

#[test]
fn test_fan_in_concatenates_in_edge_order() {
    let mut net = fan_in_net();
    let out = net.run(&[1.0, 2.0]).unwrap();
    // three: 3 + {0, 1, 2}, two: 3 + {10, 11}
    assert_eq!(out, vec![3.0, 4.0, 5.0, 13.0, 14.0]);
}

#[test]
fn test_fan_in_is_full() {
    let mut net = fan_in_net();
    let err = net.link_layers(LayerKind::Input, 0, 0, 1, LayerKind::Accumulator, 0).unwrap_err();
    assert!(matches!(err, LinkError::InputOverflow { total: 6, capacity: 5, .. }));
}

#[test]
fn test_accumulator_as_intermediate_layer() {
    // Accumulator → Dense: 集約結果をさらに変換する
    let mut net = fan_in_net();
    net.add(summing_dense("head", 5, 1, 0.0));
    net.link_layers(LayerKind::Accumulator, 0, 0, 5, LayerKind::Dense, 2).unwrap();
    net.sort_edges();

    let out = net.run(&[1.0, 2.0]).unwrap();
    assert_eq!(out, vec![3.0 + 4.0 + 5.0 + 13.0 + 14.0]);
    assert_eq!(net.output_of(rneural_core::NodeRef::new(LayerKind::Accumulator, 0)).unwrap().len(), 5);
}
