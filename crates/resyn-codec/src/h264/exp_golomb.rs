//! Exp-Golomb 族变长整数编解码.
//!
//! ue(v)/se(v)/te(v)/ce(v)/me(v) 的读写, 所有宏块层与残差层的定长以外字段都经过这里.

use resyn_core::{BitReader, BitWriter, ResynError, ResynResult};

use super::context::ChromaArrayType;

/// ue(v) 前导零上限, 超过即视为码流无法终止
const MAX_LEADING_ZEROS: u32 = 31;

// ============================================================
// ue / se / te / ce
// ============================================================

/// 读取无符号 Exp-Golomb 编码值 ue(v)
pub fn read_ue(br: &mut BitReader) -> ResynResult<u32> {
    let mut leading_zeros = 0u32;
    while br.read_bit()? == 0 {
        leading_zeros += 1;
        if leading_zeros > MAX_LEADING_ZEROS {
            return Err(ResynError::UnboundedLoop("Exp-Golomb 前导零过多".into()));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }

    let suffix = br.read_bits(leading_zeros)?;
    let value = (1u64 << leading_zeros) - 1 + u64::from(suffix);
    u32::try_from(value).map_err(|_| ResynError::malformed(format!("ue(v) 溢出: {}", value)))
}

/// 写入无符号 Exp-Golomb 编码值 ue(v)
pub fn write_ue(bw: &mut BitWriter, value: u32) {
    let code = u64::from(value) + 1;
    let len = 63 - code.leading_zeros();
    bw.write_bits(0, len);
    // 码字 = len 个前导零 + (len+1) 位的 code
    bw.write_bit(1);
    bw.write_bits((code & ((1u64 << len) - 1)) as u32, len);
}

/// ue(v) 码字长度 (比特)
pub fn ue_bit_len(value: u32) -> u32 {
    let code = u64::from(value) + 1;
    2 * (63 - code.leading_zeros()) + 1
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
pub fn read_se(br: &mut BitReader) -> ResynResult<i32> {
    let code = read_ue(br)?;
    // 映射: 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
    let magnitude = code.div_ceil(2) as i64;
    let value = if code & 1 == 1 { magnitude } else { -magnitude };
    i32::try_from(value).map_err(|_| ResynError::malformed(format!("se(v) 溢出: {}", value)))
}

/// 写入有符号 Exp-Golomb 编码值 se(v)
pub fn write_se(bw: &mut BitWriter, value: i32) -> ResynResult<()> {
    let value = i64::from(value);
    let code = if value > 0 { 2 * value - 1 } else { -2 * value };
    let code = u32::try_from(code)
        .map_err(|_| ResynError::invalid(format!("se(v) 无法表示: {}", value)))?;
    write_ue(bw, code);
    Ok(())
}

/// 读取截断 Exp-Golomb 编码值 te(v)
///
/// `range` 为语法元素的最大取值; 为 1 时只有一个取反的比特.
pub fn read_te(br: &mut BitReader, range: u32) -> ResynResult<u32> {
    match range {
        0 => Err(ResynError::invalid("te(v) 取值范围为 0, 语法元素不应出现")),
        1 => Ok(1 - br.read_bit()?),
        _ => {
            let value = read_ue(br)?;
            if value > range {
                return Err(ResynError::malformed(format!(
                    "te(v) 超出范围: value={}, range={}",
                    value, range
                )));
            }
            Ok(value)
        }
    }
}

/// 写入截断 Exp-Golomb 编码值 te(v)
pub fn write_te(bw: &mut BitWriter, value: u32, range: u32) -> ResynResult<()> {
    if range == 0 || value > range {
        return Err(ResynError::invalid(format!(
            "te(v) 超出范围: value={}, range={}",
            value, range
        )));
    }
    if range == 1 {
        bw.write_bit(1 - value);
    } else {
        write_ue(bw, value);
    }
    Ok(())
}

/// 读取 ce(v)
///
/// 比特形式与 ue(v) 相同, 解释由所在的系数域语法决定.
pub fn read_ce(br: &mut BitReader) -> ResynResult<u32> {
    read_ue(br)
}

/// 写入 ce(v)
pub fn write_ce(bw: &mut BitWriter, value: u32) {
    write_ue(bw, value);
}

// ============================================================
// me(v): coded_block_pattern 映射
// ============================================================

/// ChromaArrayType 1/2, Intra_4x4/Intra_8x8 宏块: codeNum -> cbp
const INTRA_CBP_FROM_CODE: [u8; 48] = [
    47, 31, 15, 0, 23, 27, 29, 30, 7, 11, 13, 14, 39, 43, 45, 46, 16, 3, 5, 10, 12, 19, 21, 26, 28,
    35, 37, 42, 44, 1, 2, 4, 8, 17, 18, 20, 24, 6, 9, 22, 25, 32, 33, 34, 36, 40, 38, 41,
];

/// ChromaArrayType 1/2, 帧间宏块: codeNum -> cbp
const INTER_CBP_FROM_CODE: [u8; 48] = [
    0, 16, 1, 2, 4, 8, 32, 3, 5, 10, 12, 15, 47, 7, 11, 13, 14, 6, 9, 31, 35, 37, 42, 44, 33, 34, 36,
    40, 39, 43, 45, 46, 17, 18, 20, 24, 19, 21, 26, 28, 23, 27, 29, 30, 22, 25, 38, 41,
];

/// ChromaArrayType 0/3, Intra_4x4/Intra_8x8 宏块
const GRAY_INTRA_CBP_FROM_CODE: [u8; 16] = [15, 0, 7, 11, 13, 14, 3, 5, 10, 12, 1, 2, 4, 8, 6, 9];

/// ChromaArrayType 0/3, 帧间宏块
const GRAY_INTER_CBP_FROM_CODE: [u8; 16] = [0, 1, 2, 4, 8, 3, 5, 10, 12, 15, 7, 11, 13, 14, 6, 9];

const fn invert_48(table: &[u8; 48]) -> [u8; 48] {
    let mut out = [0u8; 48];
    let mut code = 0;
    while code < 48 {
        out[table[code] as usize] = code as u8;
        code += 1;
    }
    out
}

const fn invert_16(table: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut code = 0;
    while code < 16 {
        out[table[code] as usize] = code as u8;
        code += 1;
    }
    out
}

const INTRA_CODE_FROM_CBP: [u8; 48] = invert_48(&INTRA_CBP_FROM_CODE);
const INTER_CODE_FROM_CBP: [u8; 48] = invert_48(&INTER_CBP_FROM_CODE);
const GRAY_INTRA_CODE_FROM_CBP: [u8; 16] = invert_16(&GRAY_INTRA_CBP_FROM_CODE);
const GRAY_INTER_CODE_FROM_CBP: [u8; 16] = invert_16(&GRAY_INTER_CBP_FROM_CODE);

fn cbp_tables(chroma: ChromaArrayType, intra: bool) -> (&'static [u8], &'static [u8]) {
    match (chroma.has_chroma_dc_ac(), intra) {
        (true, true) => (&INTRA_CBP_FROM_CODE[..], &INTRA_CODE_FROM_CBP[..]),
        (true, false) => (&INTER_CBP_FROM_CODE[..], &INTER_CODE_FROM_CBP[..]),
        (false, true) => (&GRAY_INTRA_CBP_FROM_CODE[..], &GRAY_INTRA_CODE_FROM_CBP[..]),
        (false, false) => (&GRAY_INTER_CBP_FROM_CODE[..], &GRAY_INTER_CODE_FROM_CBP[..]),
    }
}

/// 读取映射 Exp-Golomb 编码的 coded_block_pattern me(v)
///
/// `intra` 为宏块预测模式是否为 Intra_4x4/Intra_8x8.
pub fn read_me(br: &mut BitReader, chroma: ChromaArrayType, intra: bool) -> ResynResult<u8> {
    let code = read_ue(br)?;
    let (from_code, _) = cbp_tables(chroma, intra);
    from_code.get(code as usize).copied().ok_or_else(|| {
        ResynError::malformed(format!(
            "coded_block_pattern 码号超出映射表: code={}, chroma={:?}",
            code, chroma
        ))
    })
}

/// 写入映射 Exp-Golomb 编码的 coded_block_pattern me(v)
pub fn write_me(bw: &mut BitWriter, cbp: u8, chroma: ChromaArrayType, intra: bool) -> ResynResult<()> {
    let (_, to_code) = cbp_tables(chroma, intra);
    let code = to_code.get(cbp as usize).copied().ok_or_else(|| {
        ResynError::invalid(format!(
            "coded_block_pattern 无法映射: cbp={}, chroma={:?}",
            cbp, chroma
        ))
    })?;
    write_ue(bw, u32::from(code));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> Vec<u8> {
        let mut bw = BitWriter::new();
        for c in s.chars() {
            bw.write_bit(u32::from(c == '1'));
        }
        bw.finish()
    }

    #[test]
    fn test_exp_golomb_ue() {
        // ue(v) 编码: 1 → 0, 010 → 1, 011 → 2, 00100 → 3
        for (pattern, expected) in [("1", 0), ("010", 1), ("011", 2), ("00100", 3), ("0001000", 7)] {
            let data = bits(pattern);
            let mut br = BitReader::new(&data);
            assert_eq!(read_ue(&mut br).unwrap(), expected, "pattern={}", pattern);
            assert_eq!(br.bits_read(), pattern.len());
        }
    }

    #[test]
    fn test_exp_golomb_se() {
        // se(v): 0→0, 1→1, 2→-1, 3→2, 4→-2
        for (pattern, expected) in [("1", 0), ("010", 1), ("011", -1), ("00100", 2), ("00101", -2)] {
            let data = bits(pattern);
            let mut br = BitReader::new(&data);
            assert_eq!(read_se(&mut br).unwrap(), expected, "pattern={}", pattern);
        }
    }

    #[test]
    fn test_ue_write_matches_read() {
        for value in [0u32, 1, 2, 3, 6, 7, 254, 255, 65534, 1 << 20, u32::MAX - 1] {
            let mut bw = BitWriter::new();
            write_ue(&mut bw, value);
            assert_eq!(bw.bits_written() as u32, ue_bit_len(value));
            let data = bw.finish();
            let mut br = BitReader::new(&data);
            assert_eq!(read_ue(&mut br).unwrap(), value);
        }
    }

    #[test]
    fn test_ce_matches_ue_bits() {
        for value in [0u32, 1, 5, 30, 1023] {
            let mut ce = BitWriter::new();
            write_ce(&mut ce, value);
            let mut ue = BitWriter::new();
            write_ue(&mut ue, value);
            assert_eq!(ce.to_bit_string(), ue.to_bit_string(), "ce(v) 与 ue(v) 比特形式相同");
            let data = ce.finish();
            let mut br = BitReader::new(&data);
            assert_eq!(read_ce(&mut br).unwrap(), value);
            assert_eq!(br.bits_read() as u32, ue_bit_len(value));
        }
    }

    #[test]
    fn test_se_extremes() {
        for value in [i32::MIN + 1, -65536, -1, 0, 1, 65536, i32::MAX] {
            let mut bw = BitWriter::new();
            write_se(&mut bw, value).unwrap();
            let data = bw.finish();
            let mut br = BitReader::new(&data);
            assert_eq!(read_se(&mut br).unwrap(), value);
        }
    }

    #[test]
    fn test_leading_zero_guard() {
        let data = [0u8; 8];
        let mut br = BitReader::new(&data);
        assert!(matches!(read_ue(&mut br), Err(ResynError::UnboundedLoop(_))));

        let data = [0u8; 2];
        let mut br = BitReader::new(&data);
        assert_eq!(read_ue(&mut br), Err(ResynError::StreamExhausted));
    }

    #[test]
    fn test_te_single_bit_inverted() {
        let data = bits("01");
        let mut br = BitReader::new(&data);
        assert_eq!(read_te(&mut br, 1).unwrap(), 1);
        assert_eq!(read_te(&mut br, 1).unwrap(), 0);

        let mut bw = BitWriter::new();
        write_te(&mut bw, 1, 1).unwrap();
        write_te(&mut bw, 2, 3).unwrap();
        assert_eq!(bw.to_bit_string(), "0011");
        assert!(write_te(&mut bw, 4, 3).is_err());
    }

    #[test]
    fn test_te_out_of_range_is_malformed() {
        let data = bits("00100");
        let mut br = BitReader::new(&data);
        assert!(matches!(read_te(&mut br, 2), Err(ResynError::MalformedSyntax(_))));
    }

    #[test]
    fn test_cbp_tables_are_bijective() {
        for chroma in [
            ChromaArrayType::Monochrome,
            ChromaArrayType::Yuv420,
            ChromaArrayType::Yuv422,
            ChromaArrayType::Yuv444,
        ] {
            for intra in [false, true] {
                let (from_code, to_code) = cbp_tables(chroma, intra);
                for (code, &cbp) in from_code.iter().enumerate() {
                    assert_eq!(to_code[cbp as usize] as usize, code, "cbp 映射必须可逆");
                }
            }
        }
    }

    #[test]
    fn test_me_roundtrip_and_reject() {
        let mut bw = BitWriter::new();
        write_me(&mut bw, 47, ChromaArrayType::Yuv420, true).unwrap();
        write_me(&mut bw, 0, ChromaArrayType::Yuv420, false).unwrap();
        // Intra 映射下 47 是码号 0, 帧间映射下 0 是码号 0
        assert_eq!(bw.to_bit_string(), "11");
        assert!(write_me(&mut bw, 16, ChromaArrayType::Yuv444, false).is_err());

        // 码号 48 超出表
        let mut bw = BitWriter::new();
        write_ue(&mut bw, 48);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            read_me(&mut br, ChromaArrayType::Yuv420, false),
            Err(ResynError::MalformedSyntax(_))
        ));
    }
}
