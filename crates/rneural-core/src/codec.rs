//! リトルエンディアンのバイナリ読み書きヘルパー
//!
//! 読み込みはメモリ上のバイト列に対して境界チェック付きで行い、
//! 宣言された個数がバイト列の残りと矛盾する場合は確保前にエラーにする。

use crate::constants::MAX_MODEL_BUFFER_LEN;
use crate::error::{ModelError, ModelResult};
use std::io::{self, Write};

/// 境界チェック付きモデルリーダー
pub struct ModelReader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// ファイル上に実体を持たないバッファ（出力・状態）に使える残り要素数
    buffer_budget: usize,
}

impl<'a> ModelReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, buffer_budget: MAX_MODEL_BUFFER_LEN }
    }

    /// 未読バイト数
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// 読み込み位置（先頭からのバイト数）
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, section: &'static str) -> ModelResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(ModelError::Truncated {
                section,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// `count` 個 × `width` バイトが残っているか事前に確認する
    pub fn ensure(&self, count: usize, width: usize, section: &'static str) -> ModelResult<()> {
        let needed = count
            .checked_mul(width)
            .ok_or_else(|| ModelError::corrupt(section, format!("size overflow: {count} x {width}")))?;
        if needed > self.remaining() {
            return Err(ModelError::Truncated {
                section,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// 出力・状態バッファ `n` 要素分を予算から差し引く（確保前に呼ぶ）
    ///
    /// 予算はリーダー 1 つ（= モデル 1 つ）で共有する。
    pub fn reserve_buffers(&mut self, n: usize, section: &'static str) -> ModelResult<()> {
        if n > self.buffer_budget {
            return Err(ModelError::corrupt(
                section,
                format!("buffers of {n} elements exceed remaining budget {}", self.buffer_budget),
            ));
        }
        self.buffer_budget -= n;
        Ok(())
    }

    pub fn read_u8(&mut self, section: &'static str) -> ModelResult<u8> {
        Ok(self.take(1, section)?[0])
    }

    pub fn read_i32(&mut self, section: &'static str) -> ModelResult<i32> {
        let b = self.take(4, section)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self, section: &'static str) -> ModelResult<f64> {
        let b = self.take(8, section)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(f64::from_le_bytes(buf))
    }

    /// 非負の i32 を個数・次元として読む
    pub fn read_count(&mut self, section: &'static str) -> ModelResult<usize> {
        let v = self.read_i32(section)?;
        usize::try_from(v)
            .map_err(|_| ModelError::corrupt(section, format!("negative count: {v}")))
    }

    /// f64 を `n` 個読む（確保前に残りバイト数を検証）
    pub fn read_f64_vec(&mut self, n: usize, section: &'static str) -> ModelResult<Vec<f64>> {
        self.ensure(n, 8, section)?;
        let bytes = self.take(n * 8, section)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// 固定長の NUL 埋め UTF-8 文字列を読む
    pub fn read_fixed_str(&mut self, len: usize, section: &'static str) -> ModelResult<String> {
        let bytes = self.take(len, section)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        String::from_utf8(bytes[..end].to_vec())
            .map_err(|e| ModelError::corrupt(section, format!("invalid UTF-8: {e}")))
    }

    /// 末尾まで読み切ったことを確認する
    pub fn finish(&self) -> ModelResult<()> {
        if self.remaining() != 0 {
            return Err(ModelError::corrupt(
                "trailer",
                format!("{} trailing bytes after last section", self.remaining()),
            ));
        }
        Ok(())
    }
}

pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_i32<W: Write + ?Sized>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64<W: Write + ?Sized>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_slice<W: Write + ?Sized>(w: &mut W, values: &[f64]) -> io::Result<()> {
    for &v in values {
        write_f64(w, v)?;
    }
    Ok(())
}

/// 個数・次元を i32 として書く
pub fn write_count<W: Write + ?Sized>(w: &mut W, v: usize) -> io::Result<()> {
    let v = i32::try_from(v).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("count {v} exceeds i32 range"))
    })?;
    write_i32(w, v)
}

/// 固定長の NUL 埋め文字列を書く（呼び出し側で長さを切り詰め済みであること）
pub fn write_fixed_str<W: Write + ?Sized>(w: &mut W, s: &str, len: usize) -> io::Result<()> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf)
}

/// 固定長フィールドに書ける形に正規化する
///
/// 最初の NUL で打ち切り、文字境界を保って `max` バイト以下にする。
pub fn fixed_field(s: &str, max: usize) -> String {
    let s = s.split('\0').next().unwrap_or_default();
    truncate_utf8(s, max)
}

/// 文字境界を保ったまま `max` バイト以下に切り詰める
pub fn truncate_utf8(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives_le() {
        let mut data = Vec::new();
        write_u8(&mut data, 7).unwrap();
        write_i32(&mut data, -2).unwrap();
        write_f64(&mut data, 1.5).unwrap();

        let mut r = ModelReader::new(&data);
        assert_eq!(r.read_u8("t").unwrap(), 7);
        assert_eq!(r.read_i32("t").unwrap(), -2);
        assert_eq!(r.read_f64("t").unwrap(), 1.5);
        assert!(r.finish().is_ok());
    }

    #[test]
    fn test_negative_count_is_corrupt() {
        let data = (-1i32).to_le_bytes();
        let mut r = ModelReader::new(&data);
        let err = r.read_count("header").unwrap_err();
        assert!(matches!(err, ModelError::Corrupt { section: "header", .. }));
    }

    #[test]
    fn test_huge_vec_rejected_before_alloc() {
        let data = [0u8; 16];
        let mut r = ModelReader::new(&data);
        let err = r.read_f64_vec(1 << 40, "weights").unwrap_err();
        assert!(matches!(err, ModelError::Truncated { needed, remaining: 16, .. } if needed == 8 << 40));
        // 失敗しても読み込み位置は進まない
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_fixed_str_roundtrip_and_padding() {
        let mut data = Vec::new();
        write_fixed_str(&mut data, "hidden", 8).unwrap();
        assert_eq!(data, b"hidden\0\0");

        let mut r = ModelReader::new(&data);
        assert_eq!(r.read_fixed_str(8, "name").unwrap(), "hidden");
    }

    #[test]
    fn test_truncate_utf8_char_boundary() {
        // "あ" は 3 バイト
        assert_eq!(truncate_utf8("ああ", 4), "あ");
        assert_eq!(truncate_utf8("abc", 8), "abc");
    }

    #[test]
    fn test_fixed_field_stops_at_nul() {
        assert_eq!(fixed_field("ab\0cd", 8), "ab");
        assert_eq!(fixed_field("\0x", 8), "");
        assert_eq!(fixed_field("abcdef", 4), "abcd");

        let mut data = Vec::new();
        write_fixed_str(&mut data, &fixed_field("lr\0tail", 8), 8).unwrap();
        assert_eq!(ModelReader::new(&data).read_fixed_str(8, "key").unwrap(), "lr");
    }

    #[test]
    fn test_buffer_budget_is_shared() {
        let mut r = ModelReader::new(&[]);
        r.reserve_buffers(MAX_MODEL_BUFFER_LEN - 10, "a").unwrap();
        r.reserve_buffers(10, "b").unwrap();
        let err = r.reserve_buffers(1, "c").unwrap_err();
        assert!(matches!(err, ModelError::Corrupt { section: "c", .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let data = [1u8, 2];
        let mut r = ModelReader::new(&data);
        r.read_u8("t").unwrap();
        assert!(r.finish().is_err());
    }
}
