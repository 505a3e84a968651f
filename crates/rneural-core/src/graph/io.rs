//! モデルファイルの読み書き
//!
//! すべてリトルエンディアン。
//!
//! ```text
//! header   : inputs (i32) edge_count (i32) layer_count[8] (i32)
//!            variable_count (u8) generation (i32) fitness (f64) comment[64]
//! edges    : src_kind (u8) src_index (i32) start (i32) end (i32) dst_kind (u8) dst_index (i32)
//! layers   : Dense* Conv2D* Accumulator* LSTM* GRU* Pool2D* Upres* Normalize*
//! variables: key[16] value (f64)
//! ```
//!
//! 再帰層の時間状態は保存しない。

use super::{Edge, NeuralNet, NodeRef, Variable};
use crate::codec::{write_count, write_f64, write_fixed_str, write_i32, write_u8, ModelReader};
use crate::constants::{COMMENT_LEN, LAYER_NAME_LEN, MAX_VARIABLES, MAX_VECTOR_LEN, VARIABLE_KEY_LEN};
use crate::error::{ModelError, ModelResult};
use crate::layers::{Layer, LayerKind};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// 1 エッジのバイト数
const EDGE_BYTES: usize = 1 + 4 + 4 + 4 + 1 + 4;

/// 層ペイロードの最小バイト数（次元 1 つ + 層名）
const MIN_LAYER_BYTES: usize = 4 + LAYER_NAME_LEN;

impl NeuralNet {
    /// ファイルからモデルを読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let net = Self::from_bytes(&bytes)?;
        log::info!(
            "loaded model from {} ({} bytes, {} layers, {} edges)",
            path.display(),
            bytes.len(),
            net.layers().count(),
            net.edges.len()
        );
        Ok(net)
    }

    /// ファイルへモデルを書き出す
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ModelResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        log::info!("saved model to {}", path.display());
        Ok(())
    }

    /// ストリームを末尾まで読み、モデルとして復元する
    pub fn read<R: Read>(reader: &mut R) -> ModelResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// バイト列からモデルを復元する
    ///
    /// 失敗した場合は部分的に構築されたグラフを返さない。
    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        let mut r = ModelReader::new(bytes);

        let inputs = r.read_count("header")?;
        if inputs > MAX_VECTOR_LEN {
            return Err(ModelError::corrupt("header", format!("input count {inputs} exceeds {MAX_VECTOR_LEN}")));
        }
        let edge_count = r.read_count("header")?;
        let mut counts = [0usize; LayerKind::REGISTRY_ORDER.len()];
        for c in counts.iter_mut() {
            *c = r.read_count("header")?;
        }
        let variable_count = r.read_u8("header")? as usize;
        let generation = r.read_i32("header")?;
        let fitness = r.read_f64("header")?;
        let comment = r.read_fixed_str(COMMENT_LEN, "header")?;
        log::debug!("header: inputs={inputs} edges={edge_count} layers={counts:?} variables={variable_count}");

        r.ensure(edge_count, EDGE_BYTES, "edges")?;
        let mut edges = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            edges.push(read_edge(&mut r)?);
        }

        let mut net = NeuralNet::new(inputs);
        net.generation = generation;
        net.fitness = fitness;
        net.comment = comment;

        for (kind, &count) in LayerKind::REGISTRY_ORDER.iter().zip(&counts) {
            r.ensure(count, MIN_LAYER_BYTES, "layers")?;
            let reg = &mut net.registry;
            match kind {
                LayerKind::Dense => read_layers(&mut r, count, &mut reg.dense)?,
                LayerKind::Conv2D => read_layers(&mut r, count, &mut reg.conv2d)?,
                LayerKind::Accumulator => read_layers(&mut r, count, &mut reg.accum)?,
                LayerKind::Lstm => read_layers(&mut r, count, &mut reg.lstm)?,
                LayerKind::Gru => read_layers(&mut r, count, &mut reg.gru)?,
                LayerKind::Pool2D => read_layers(&mut r, count, &mut reg.pool)?,
                LayerKind::Upres => read_layers(&mut r, count, &mut reg.upres)?,
                LayerKind::Normalize => read_layers(&mut r, count, &mut reg.normal)?,
                LayerKind::Input => {}
            }
            log::debug!("read {count} {kind} layers");
        }

        r.ensure(variable_count, VARIABLE_KEY_LEN + 8, "variables")?;
        for _ in 0..variable_count {
            let key = r.read_fixed_str(VARIABLE_KEY_LEN, "variables")?;
            let value = r.read_f64("variables")?;
            net.variables.push(Variable { key, value });
        }
        r.finish()?;

        // 保存時の順序を保ったまま、配線規則を満たすか再検証する
        for edge in edges {
            net.check_edge(&edge).map_err(|e| ModelError::corrupt("edges", e.to_string()))?;
            net.edges.push(edge);
        }
        Ok(net)
    }

    /// ストリームへモデルを書き出す
    pub fn write<W: Write>(&self, w: &mut W) -> ModelResult<()> {
        if self.variables.len() > MAX_VARIABLES {
            return Err(ModelError::TooManyVariables(self.variables.len()));
        }

        write_count(w, self.inputs())?;
        write_count(w, self.edges.len())?;
        for kind in LayerKind::REGISTRY_ORDER {
            write_count(w, self.layer_count(kind))?;
        }
        write_u8(w, self.variables.len() as u8)?;
        write_i32(w, self.generation)?;
        write_f64(w, self.fitness)?;
        write_fixed_str(w, &self.comment, COMMENT_LEN)?;

        for e in &self.edges {
            write_u8(w, e.src.kind.code())?;
            write_count(w, e.src.index)?;
            write_count(w, e.start)?;
            write_count(w, e.end)?;
            write_u8(w, e.dst.kind.code())?;
            write_count(w, e.dst.index)?;
        }

        for (_, layer) in self.layers() {
            layer.write(w)?;
        }

        for v in &self.variables {
            write_fixed_str(w, &v.key, VARIABLE_KEY_LEN)?;
            write_f64(w, v.value)?;
        }
        Ok(())
    }

    /// モデルをバイト列に書き出す
    pub fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

fn read_kind(r: &mut ModelReader<'_>) -> ModelResult<LayerKind> {
    let code = r.read_u8("edges")?;
    LayerKind::from_code(code).ok_or_else(|| ModelError::corrupt("edges", format!("unknown layer kind code {code}")))
}

fn read_edge(r: &mut ModelReader<'_>) -> ModelResult<Edge> {
    let src_kind = read_kind(r)?;
    let src_index = r.read_count("edges")?;
    let start = r.read_count("edges")?;
    let end = r.read_count("edges")?;
    let dst_kind = read_kind(r)?;
    let dst_index = r.read_count("edges")?;
    Ok(Edge::new(NodeRef::new(src_kind, src_index), start, end, NodeRef::new(dst_kind, dst_index)))
}

fn read_layers<L: Layer>(r: &mut ModelReader<'_>, count: usize, out: &mut Vec<L>) -> ModelResult<()> {
    out.reserve(count);
    for _ in 0..count {
        out.push(L::read(r)?);
    }
    Ok(())
}
