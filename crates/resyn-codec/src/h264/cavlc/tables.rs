//! CAVLC 码表 (coeff_token / total_zeros / run_before).
//!
//! 码表项统一表示为 `(码长, 码字)`, 码长为 0 表示该位置不存在码字.

use resyn_core::{BitReader, BitWriter, ResynError, ResynResult};

// ============================================================
// coeff_token: [TotalCoeff][TrailingOnes] -> (码长, 码字)
// ============================================================

/// 0 <= nC < 2
pub(crate) const COEFF_TOKEN_0: [[(u8, u16); 4]; 17] = [
    [(1, 0b1), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000101), (2, 0b01), (0, 0), (0, 0)],
    [(8, 0b00000111), (6, 0b000100), (3, 0b001), (0, 0)],
    [(9, 0b000000111), (8, 0b00000110), (7, 0b0000101), (5, 0b00011)],
    [(10, 0b0000000111), (9, 0b000000110), (8, 0b00000101), (6, 0b000011)],
    [(11, 0b00000000111), (10, 0b0000000110), (9, 0b000000101), (7, 0b0000100)],
    [(13, 0b0000000001111), (11, 0b00000000110), (10, 0b0000000101), (8, 0b00000100)],
    [(13, 0b0000000001011), (13, 0b0000000001110), (11, 0b00000000101), (9, 0b000000100)],
    [(13, 0b0000000001000), (13, 0b0000000001010), (13, 0b0000000001101), (10, 0b0000000100)],
    [(14, 0b00000000001111), (14, 0b00000000001110), (13, 0b0000000001001), (11, 0b00000000100)],
    [(14, 0b00000000001011), (14, 0b00000000001010), (14, 0b00000000001101), (13, 0b0000000001100)],
    [(15, 0b000000000001111), (15, 0b000000000001110), (14, 0b00000000001001), (14, 0b00000000001100)],
    [(15, 0b000000000001011), (15, 0b000000000001010), (15, 0b000000000001101), (14, 0b00000000001000)],
    [(16, 0b0000000000001111), (15, 0b000000000000001), (15, 0b000000000001001), (15, 0b000000000001100)],
    [(16, 0b0000000000001011), (16, 0b0000000000001110), (16, 0b0000000000001101), (15, 0b000000000001000)],
    [(16, 0b0000000000000111), (16, 0b0000000000001010), (16, 0b0000000000001001), (16, 0b0000000000001100)],
    [(16, 0b0000000000000100), (16, 0b0000000000000110), (16, 0b0000000000000101), (16, 0b0000000000001000)],
];

/// 2 <= nC < 4
pub(crate) const COEFF_TOKEN_1: [[(u8, u16); 4]; 17] = [
    [(2, 0b11), (0, 0), (0, 0), (0, 0)],
    [(6, 0b001011), (2, 0b10), (0, 0), (0, 0)],
    [(6, 0b000111), (5, 0b00111), (3, 0b011), (0, 0)],
    [(7, 0b0000111), (6, 0b001010), (6, 0b001001), (4, 0b0101)],
    [(8, 0b00000111), (6, 0b000110), (6, 0b000101), (4, 0b0100)],
    [(8, 0b00000100), (7, 0b0000110), (7, 0b0000101), (5, 0b00110)],
    [(9, 0b000000111), (8, 0b00000110), (8, 0b00000101), (6, 0b001000)],
    [(11, 0b00000001111), (9, 0b000000110), (9, 0b000000101), (6, 0b000100)],
    [(11, 0b00000001011), (11, 0b00000001110), (11, 0b00000001101), (7, 0b0000100)],
    [(12, 0b000000001111), (11, 0b00000001010), (11, 0b00000001001), (9, 0b000000100)],
    [(12, 0b000000001011), (12, 0b000000001110), (12, 0b000000001101), (11, 0b00000001100)],
    [(12, 0b000000001000), (12, 0b000000001010), (12, 0b000000001001), (11, 0b00000001000)],
    [(13, 0b0000000001111), (13, 0b0000000001110), (13, 0b0000000001101), (12, 0b000000001100)],
    [(13, 0b0000000001011), (13, 0b0000000001010), (13, 0b0000000001001), (13, 0b0000000001100)],
    [(13, 0b0000000000111), (14, 0b00000000001011), (13, 0b0000000000110), (13, 0b0000000001000)],
    [(14, 0b00000000001001), (14, 0b00000000001000), (14, 0b00000000001010), (13, 0b0000000000001)],
    [(14, 0b00000000000111), (14, 0b00000000000110), (14, 0b00000000000101), (14, 0b00000000000100)],
];

/// 4 <= nC < 8
pub(crate) const COEFF_TOKEN_2: [[(u8, u16); 4]; 17] = [
    [(4, 0b1111), (0, 0), (0, 0), (0, 0)],
    [(6, 0b001111), (4, 0b1110), (0, 0), (0, 0)],
    [(6, 0b001011), (5, 0b01111), (4, 0b1101), (0, 0)],
    [(6, 0b001000), (5, 0b01100), (5, 0b01110), (4, 0b1100)],
    [(7, 0b0001111), (5, 0b01010), (5, 0b01011), (4, 0b1011)],
    [(7, 0b0001011), (5, 0b01000), (5, 0b01001), (4, 0b1010)],
    [(7, 0b0001001), (6, 0b001110), (6, 0b001101), (4, 0b1001)],
    [(7, 0b0001000), (6, 0b001010), (6, 0b001001), (4, 0b1000)],
    [(8, 0b00001111), (7, 0b0001110), (7, 0b0001101), (5, 0b01101)],
    [(8, 0b00001011), (8, 0b00001110), (7, 0b0001010), (6, 0b001100)],
    [(9, 0b000001111), (8, 0b00001010), (8, 0b00001101), (7, 0b0001100)],
    [(9, 0b000001011), (9, 0b000001110), (8, 0b00001001), (8, 0b00001100)],
    [(9, 0b000001000), (9, 0b000001010), (9, 0b000001101), (8, 0b00001000)],
    [(10, 0b0000001101), (9, 0b000000111), (9, 0b000001001), (9, 0b000001100)],
    [(10, 0b0000001001), (10, 0b0000001100), (10, 0b0000001011), (10, 0b0000001010)],
    [(10, 0b0000000101), (10, 0b0000001000), (10, 0b0000000111), (10, 0b0000000110)],
    [(10, 0b0000000001), (10, 0b0000000100), (10, 0b0000000011), (10, 0b0000000010)],
];

/// 8 <= nC, 6 位定长码
pub(crate) const COEFF_TOKEN_3: [[(u8, u16); 4]; 17] = [
    [(6, 0b000011), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000000), (6, 0b000001), (0, 0), (0, 0)],
    [(6, 0b000100), (6, 0b000101), (6, 0b000110), (0, 0)],
    [(6, 0b001000), (6, 0b001001), (6, 0b001010), (6, 0b001011)],
    [(6, 0b001100), (6, 0b001101), (6, 0b001110), (6, 0b001111)],
    [(6, 0b010000), (6, 0b010001), (6, 0b010010), (6, 0b010011)],
    [(6, 0b010100), (6, 0b010101), (6, 0b010110), (6, 0b010111)],
    [(6, 0b011000), (6, 0b011001), (6, 0b011010), (6, 0b011011)],
    [(6, 0b011100), (6, 0b011101), (6, 0b011110), (6, 0b011111)],
    [(6, 0b100000), (6, 0b100001), (6, 0b100010), (6, 0b100011)],
    [(6, 0b100100), (6, 0b100101), (6, 0b100110), (6, 0b100111)],
    [(6, 0b101000), (6, 0b101001), (6, 0b101010), (6, 0b101011)],
    [(6, 0b101100), (6, 0b101101), (6, 0b101110), (6, 0b101111)],
    [(6, 0b110000), (6, 0b110001), (6, 0b110010), (6, 0b110011)],
    [(6, 0b110100), (6, 0b110101), (6, 0b110110), (6, 0b110111)],
    [(6, 0b111000), (6, 0b111001), (6, 0b111010), (6, 0b111011)],
    [(6, 0b111100), (6, 0b111101), (6, 0b111110), (6, 0b111111)],
];

/// nC == -1 (4:2:0 色度 DC)
pub(crate) const COEFF_TOKEN_CHROMA_DC_420: [[(u8, u16); 4]; 5] = [
    [(2, 0b01), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000111), (1, 0b1), (0, 0), (0, 0)],
    [(6, 0b000100), (6, 0b000110), (3, 0b001), (0, 0)],
    [(6, 0b000011), (7, 0b0000011), (7, 0b0000010), (6, 0b000101)],
    [(6, 0b000010), (8, 0b00000011), (8, 0b00000010), (7, 0b0000000)],
];

/// nC == -2 (4:2:2 色度 DC)
pub(crate) const COEFF_TOKEN_CHROMA_DC_422: [[(u8, u16); 4]; 9] = [
    [(1, 0b1), (0, 0), (0, 0), (0, 0)],
    [(7, 0b0001111), (2, 0b01), (0, 0), (0, 0)],
    [(7, 0b0001110), (7, 0b0001101), (3, 0b001), (0, 0)],
    [(9, 0b000000111), (7, 0b0001100), (7, 0b0001011), (5, 0b00001)],
    [(9, 0b000000110), (9, 0b000000101), (7, 0b0001010), (6, 0b000001)],
    [(10, 0b0000000111), (10, 0b0000000110), (9, 0b000000100), (7, 0b0001001)],
    [(11, 0b00000000111), (11, 0b00000000110), (10, 0b0000000101), (7, 0b0001000)],
    [(12, 0b000000000111), (12, 0b000000000110), (11, 0b00000000101), (10, 0b0000000100)],
    [(13, 0b0000000000111), (12, 0b000000000101), (12, 0b000000000100), (11, 0b00000000100)],
];

// ============================================================
// total_zeros: [tzVlcIndex - 1][total_zeros] -> (码长, 码字)
// ============================================================

pub(crate) const TOTAL_ZEROS_4X4: [[(u8, u8); 16]; 15] = [
    [(1, 0b1), (3, 0b011), (3, 0b010), (4, 0b0011), (4, 0b0010), (5, 0b00011), (5, 0b00010), (6, 0b000011), (6, 0b000010), (7, 0b0000011), (7, 0b0000010), (8, 0b00000011), (8, 0b00000010), (9, 0b000000011), (9, 0b000000010), (9, 0b000000001)],
    [(3, 0b111), (3, 0b110), (3, 0b101), (3, 0b100), (3, 0b011), (4, 0b0101), (4, 0b0100), (4, 0b0011), (4, 0b0010), (5, 0b00011), (5, 0b00010), (6, 0b000011), (6, 0b000010), (6, 0b000001), (6, 0b000000), (0, 0)],
    [(4, 0b0101), (3, 0b111), (3, 0b110), (3, 0b101), (4, 0b0100), (4, 0b0011), (3, 0b100), (3, 0b011), (4, 0b0010), (5, 0b00011), (5, 0b00010), (6, 0b000001), (5, 0b00001), (6, 0b000000), (0, 0), (0, 0)],
    [(5, 0b00011), (3, 0b111), (4, 0b0101), (4, 0b0100), (3, 0b110), (3, 0b101), (3, 0b100), (4, 0b0011), (3, 0b011), (4, 0b0010), (5, 0b00010), (5, 0b00001), (5, 0b00000), (0, 0), (0, 0), (0, 0)],
    [(4, 0b0101), (4, 0b0100), (4, 0b0011), (3, 0b111), (3, 0b110), (3, 0b101), (3, 0b100), (3, 0b011), (4, 0b0010), (5, 0b00001), (4, 0b0001), (5, 0b00000), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000001), (5, 0b00001), (3, 0b111), (3, 0b110), (3, 0b101), (3, 0b100), (3, 0b011), (3, 0b010), (4, 0b0001), (3, 0b001), (6, 0b000000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000001), (5, 0b00001), (3, 0b101), (3, 0b100), (3, 0b011), (2, 0b11), (3, 0b010), (4, 0b0001), (3, 0b001), (6, 0b000000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000001), (4, 0b0001), (5, 0b00001), (3, 0b011), (2, 0b11), (2, 0b10), (3, 0b010), (3, 0b001), (6, 0b000000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(6, 0b000001), (6, 0b000000), (4, 0b0001), (2, 0b11), (2, 0b10), (3, 0b001), (2, 0b01), (5, 0b00001), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(5, 0b00001), (5, 0b00000), (3, 0b001), (2, 0b11), (2, 0b10), (2, 0b01), (4, 0b0001), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(4, 0b0000), (4, 0b0001), (3, 0b001), (3, 0b010), (1, 0b1), (3, 0b011), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(4, 0b0000), (4, 0b0001), (2, 0b01), (1, 0b1), (3, 0b001), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(3, 0b000), (3, 0b001), (1, 0b1), (2, 0b01), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b00), (2, 0b01), (1, 0b1), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(1, 0b0), (1, 0b1), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
];

pub(crate) const TOTAL_ZEROS_CHROMA_DC_420: [[(u8, u8); 4]; 3] = [
    [(1, 0b1), (2, 0b01), (3, 0b001), (3, 0b000)],
    [(1, 0b1), (2, 0b01), (2, 0b00), (0, 0)],
    [(1, 0b1), (1, 0b0), (0, 0), (0, 0)],
];

pub(crate) const TOTAL_ZEROS_CHROMA_DC_422: [[(u8, u8); 8]; 7] = [
    [(1, 0b1), (3, 0b010), (3, 0b011), (4, 0b0010), (4, 0b0011), (4, 0b0001), (5, 0b00001), (5, 0b00000)],
    [(3, 0b000), (2, 0b01), (3, 0b001), (3, 0b100), (3, 0b101), (3, 0b110), (3, 0b111), (0, 0)],
    [(3, 0b000), (3, 0b001), (2, 0b01), (2, 0b10), (3, 0b110), (3, 0b111), (0, 0), (0, 0)],
    [(3, 0b110), (2, 0b00), (2, 0b01), (2, 0b10), (3, 0b111), (0, 0), (0, 0), (0, 0)],
    [(2, 0b00), (2, 0b01), (2, 0b10), (2, 0b11), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b00), (2, 0b01), (1, 0b1), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(1, 0b0), (1, 0b1), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
];

// ============================================================
// run_before: [min(zerosLeft, 7) - 1][run_before] -> (码长, 码字)
// ============================================================

pub(crate) const RUN_BEFORE: [[(u8, u8); 15]; 7] = [
    [(1, 0b1), (1, 0b0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(1, 0b1), (2, 0b01), (2, 0b00), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b11), (2, 0b10), (2, 0b01), (2, 0b00), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b11), (2, 0b10), (2, 0b01), (3, 0b001), (3, 0b000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b11), (2, 0b10), (3, 0b011), (3, 0b010), (3, 0b001), (3, 0b000), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(2, 0b11), (3, 0b000), (3, 0b001), (3, 0b011), (3, 0b010), (3, 0b101), (3, 0b100), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(3, 0b111), (3, 0b110), (3, 0b101), (3, 0b100), (3, 0b011), (3, 0b010), (3, 0b001), (4, 0b0001), (5, 0b00001), (6, 0b000001), (7, 0b0000001), (8, 0b00000001), (9, 0b000000001), (10, 0b0000000001), (11, 0b00000000001)],
];

// ============================================================
// 查表读写
// ============================================================

/// 窗口宽度: 所有 CAVLC 码字都不超过 16 位
const PEEK_BITS: u32 = 16;

/// 在候选码字中匹配当前位置, 命中则消费对应比特并返回候选的值
fn match_code(
    br: &mut BitReader,
    candidates: impl Iterator<Item = (usize, u8, u32)>,
) -> ResynResult<Option<usize>> {
    let window = br.peek_bits_padded(PEEK_BITS)?;
    for (value, len, code) in candidates {
        if len == 0 {
            continue;
        }
        if window >> (PEEK_BITS - len as u32) == code {
            if br.bits_left() < len as usize {
                return Err(ResynError::StreamExhausted);
            }
            br.skip_bits(len as usize)?;
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// 按 nC 选择 coeff_token 码表
fn coeff_token_table(nc: i32) -> ResynResult<&'static [[(u8, u16); 4]]> {
    match nc {
        -1 => Ok(&COEFF_TOKEN_CHROMA_DC_420[..]),
        -2 => Ok(&COEFF_TOKEN_CHROMA_DC_422[..]),
        0..=1 => Ok(&COEFF_TOKEN_0[..]),
        2..=3 => Ok(&COEFF_TOKEN_1[..]),
        4..=7 => Ok(&COEFF_TOKEN_2[..]),
        8..=16 => Ok(&COEFF_TOKEN_3[..]),
        _ => Err(ResynError::invalid(format!("nC 超出范围: {}", nc))),
    }
}

/// 读取 coeff_token, 返回 `(TotalCoeff, TrailingOnes)`
pub(crate) fn read_coeff_token(br: &mut BitReader, nc: i32) -> ResynResult<(u8, u8)> {
    let table = coeff_token_table(nc)?;
    let candidates = table.iter().enumerate().flat_map(|(tc, row)| {
        row.iter()
            .enumerate()
            .map(move |(t1, &(len, code))| (tc * 4 + t1, len, code as u32))
    });
    match match_code(br, candidates)? {
        Some(v) => Ok(((v / 4) as u8, (v % 4) as u8)),
        None => Err(ResynError::malformed(format!(
            "coeff_token 无匹配码字: nC={}, 位置={}",
            nc,
            br.bits_read()
        ))),
    }
}

/// 写入 coeff_token
pub(crate) fn write_coeff_token(
    bw: &mut BitWriter,
    nc: i32,
    total_coeff: u8,
    trailing_ones: u8,
) -> ResynResult<()> {
    let table = coeff_token_table(nc)?;
    let entry = table
        .get(total_coeff as usize)
        .and_then(|row| row.get(trailing_ones as usize))
        .copied()
        .unwrap_or((0, 0));
    if entry.0 == 0 {
        return Err(ResynError::invalid(format!(
            "coeff_token 不可表示: nC={}, TotalCoeff={}, TrailingOnes={}",
            nc, total_coeff, trailing_ones
        )));
    }
    bw.write_bits(entry.1 as u32, entry.0 as u32);
    Ok(())
}

/// 按块容量选择 total_zeros 码表行
fn total_zeros_row(total_coeff: u8, max_coeff: usize) -> ResynResult<&'static [(u8, u8)]> {
    let idx = (total_coeff as usize).wrapping_sub(1);
    let row = match max_coeff {
        4 => TOTAL_ZEROS_CHROMA_DC_420.get(idx).map(|r| &r[..]),
        8 => TOTAL_ZEROS_CHROMA_DC_422.get(idx).map(|r| &r[..]),
        _ => TOTAL_ZEROS_4X4.get(idx).map(|r| &r[..]),
    };
    row.ok_or_else(|| {
        ResynError::invalid(format!(
            "total_zeros 码表索引非法: TotalCoeff={}, 容量={}",
            total_coeff, max_coeff
        ))
    })
}

/// 读取 total_zeros
pub(crate) fn read_total_zeros(br: &mut BitReader, total_coeff: u8, max_coeff: usize) -> ResynResult<u8> {
    let row = total_zeros_row(total_coeff, max_coeff)?;
    let candidates = row
        .iter()
        .enumerate()
        .map(|(v, &(len, code))| (v, len, code as u32));
    match match_code(br, candidates)? {
        Some(v) => Ok(v as u8),
        None => Err(ResynError::malformed(format!(
            "total_zeros 无匹配码字: TotalCoeff={}",
            total_coeff
        ))),
    }
}

/// 写入 total_zeros
pub(crate) fn write_total_zeros(
    bw: &mut BitWriter,
    total_zeros: u8,
    total_coeff: u8,
    max_coeff: usize,
) -> ResynResult<()> {
    let row = total_zeros_row(total_coeff, max_coeff)?;
    match row.get(total_zeros as usize) {
        Some(&(len, code)) if len > 0 => {
            bw.write_bits(code as u32, len as u32);
            Ok(())
        }
        _ => Err(ResynError::invalid(format!(
            "total_zeros 不可表示: {} (TotalCoeff={})",
            total_zeros, total_coeff
        ))),
    }
}

/// run_before 码表行
fn run_before_row(zeros_left: u8) -> ResynResult<&'static [(u8, u8)]> {
    if zeros_left == 0 {
        return Err(ResynError::invalid("zerosLeft 为 0 时不存在 run_before"));
    }
    let idx = zeros_left.min(7) as usize - 1;
    Ok(&RUN_BEFORE[idx][..])
}

/// 读取 run_before
pub(crate) fn read_run_before(br: &mut BitReader, zeros_left: u8) -> ResynResult<u8> {
    let row = run_before_row(zeros_left)?;
    let candidates = row
        .iter()
        .enumerate()
        .map(|(v, &(len, code))| (v, len, code as u32));
    match match_code(br, candidates)? {
        Some(v) if v as u8 <= zeros_left => Ok(v as u8),
        Some(v) => Err(ResynError::malformed(format!(
            "run_before 超过剩余零个数: {} > {}",
            v, zeros_left
        ))),
        None => Err(ResynError::malformed(format!(
            "run_before 无匹配码字: zerosLeft={}",
            zeros_left
        ))),
    }
}

/// 写入 run_before
pub(crate) fn write_run_before(bw: &mut BitWriter, run_before: u8, zeros_left: u8) -> ResynResult<()> {
    let row = run_before_row(zeros_left)?;
    match row.get(run_before as usize) {
        Some(&(len, code)) if len > 0 && run_before <= zeros_left => {
            bw.write_bits(code as u32, len as u32);
            Ok(())
        }
        _ => Err(ResynError::invalid(format!(
            "run_before 不可表示: {} (zerosLeft={})",
            run_before, zeros_left
        ))),
    }
}
