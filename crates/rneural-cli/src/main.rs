//! rneural モデルファイルの表示・実行
//!
//! # 使用例
//!
//! ```bash
//! # XOR の参照モデルを書き出す
//! cargo run -p rneural-cli -- xor xor.nn
//!
//! # 構造を表示（--json で JSON 出力）
//! cargo run -p rneural-cli -- info xor.nn
//!
//! # 入力ベクトルを順に実行（再帰層の状態は引き継ぐ）
//! cargo run -p rneural-cli -- run xor.nn 0,0 0,1 1,0 1,1
//! ```

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use rneural_core::layers::Dense;
use rneural_core::{LayerKind, NeuralNet};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rneural", version, about = "層グラフ推論ランタイムのモデルファイル操作")]
struct Cli {
    /// ログを詳細にする（-v: info, -vv: debug）
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// メタデータ・層・エッジを表示
    Info {
        /// モデルファイル
        model: PathBuf,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// 入力ベクトルを順に実行して出力を表示
    Run {
        /// モデルファイル
        model: PathBuf,
        /// 各入力の前に再帰層の状態を初期化する
        #[arg(long)]
        reset_between: bool,
        /// カンマ区切りの入力ベクトル（例: 0.5,1,-2）
        #[arg(required = true, allow_hyphen_values = true)]
        inputs: Vec<String>,
    },
    /// XOR の参照モデル（2-2-1 Dense、全ノード sigmoid）を書き出す
    Xor {
        /// 出力パス
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.cmd {
        Cmd::Info { model, json } => run_info(&model, json),
        Cmd::Run { model, reset_between, inputs } => run_vectors(&model, reset_between, &inputs),
        Cmd::Xor { out } => run_xor(&out),
    }
}

fn load(path: &Path) -> Result<NeuralNet> {
    NeuralNet::load(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn run_info(path: &Path, json: bool) -> Result<()> {
    let net = load(path)?;
    let summary = net.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}

fn run_vectors(path: &Path, reset_between: bool, inputs: &[String]) -> Result<()> {
    let mut net = load(path)?;
    for (i, raw) in inputs.iter().enumerate() {
        let x = parse_vector(raw).with_context(|| format!("input #{i}"))?;
        if reset_between {
            net.reset();
        }
        let y = net.run(&x).with_context(|| format!("run failed for input #{i} ({raw})"))?;
        println!("{}", format_vector(&y));
    }
    Ok(())
}

fn run_xor(out: &Path) -> Result<()> {
    let net = xor_network()?;
    net.save(out).with_context(|| format!("failed to write {}", out.display()))?;
    log::info!("wrote XOR reference model to {}", out.display());
    Ok(())
}

/// h1 = σ(20x1 + 20x2 - 10), h2 = σ(-20x1 - 20x2 + 30), y = σ(20h1 + 20h2 - 30)
fn xor_network() -> Result<NeuralNet> {
    let mut hidden = Dense::new("hidden", 2, 2);
    hidden.set_node_weights(0, &[20.0, 20.0, -10.0]);
    hidden.set_node_weights(1, &[-20.0, -20.0, 30.0]);
    let mut output = Dense::new("output", 2, 1);
    output.set_node_weights(0, &[20.0, 20.0, -30.0]);

    let mut net = NeuralNet::new(2);
    net.add(hidden);
    net.add(output);
    net.link_layers(LayerKind::Input, 0, 0, 2, LayerKind::Dense, 0)?;
    net.link_layers(LayerKind::Dense, 0, 0, 2, LayerKind::Dense, 1)?;
    net.sort_edges();
    net.set_comment("xor reference");
    Ok(net)
}

fn parse_vector(raw: &str) -> Result<Vec<f64>> {
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().with_context(|| format!("invalid number '{s}'")))
        .collect::<Result<Vec<_>>>()?;
    if values.is_empty() {
        bail!("empty input vector");
    }
    Ok(values)
}

fn format_vector(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:.6}")).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("0.5, -1,2").unwrap(), vec![0.5, -1.0, 2.0]);
        assert!(parse_vector("1,x").is_err());
        assert!(parse_vector(" , ").is_err());
    }

    #[test]
    fn test_xor_network_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xor.nn");
        run_xor(&path).unwrap();

        let mut net = NeuralNet::load(&path).unwrap();
        assert_eq!(net.comment(), "xor reference");
        let y: Vec<bool> = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]
            .iter()
            .map(|x| net.run(x).unwrap()[0] > 0.5)
            .collect();
        assert_eq!(y, vec![false, true, true, false]);
    }

    #[test]
    fn test_format_vector() {
        assert_eq!(format_vector(&[0.5, 1.0]), "0.500000,1.000000");
    }

    #[test]
    fn test_cli_parses_run_arguments() {
        let cli = Cli::try_parse_from(["rneural", "-vv", "run", "m.nn", "--reset-between", "0,1", "-1,2"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.cmd {
            Cmd::Run { reset_between, inputs, .. } => {
                assert!(reset_between);
                assert_eq!(inputs, vec!["0,1".to_string(), "-1,2".to_string()]);
            }
            _ => panic!("expected run"),
        }
    }
}
