//! CAVLC 残差块 (residual_block_cavlc) 解码与编码.

use resyn_core::{BitReader, BitWriter, ResynError, ResynResult};

use super::tables::{
    read_coeff_token, read_run_before, read_total_zeros, write_coeff_token, write_run_before,
    write_total_zeros,
};
use crate::h264::block::{BlockAddress, CoeffArray};

/// level_prefix 的前导零上限
const MAX_LEVEL_PREFIX: u32 = 31;

/// 一个 CAVLC 残差块的全部语法值与重建后的系数
///
/// `levels` / `runs` 等数组按解码顺序排列 (最高频率系数在前), 有效长度为 `total_coeff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CavlcBlock {
    pub address: BlockAddress,
    /// TotalCoeff(coeff_token)
    pub total_coeff: u8,
    /// TrailingOnes(coeff_token)
    pub trailing_ones: u8,
    /// trailing_ones_sign_flag
    pub trailing_signs: [bool; 3],
    /// level_prefix (拖尾 1 对应位置为 0)
    pub level_prefix: [u8; 16],
    /// level_suffix (拖尾 1 或无后缀时为 0)
    pub level_suffix: [u32; 16],
    pub levels: [i32; 16],
    pub total_zeros: u8,
    /// run_before 语法值 (未出现时为 0)
    pub run_before: [u8; 16],
    /// 每个系数之前的零游程, 最后一个系数吸收剩余零
    pub runs: [u8; 16],
    /// 块内系数 (长度为块容量)
    pub coeffs: CoeffArray,
}

impl CavlcBlock {
    fn empty(address: BlockAddress) -> Self {
        Self {
            address,
            total_coeff: 0,
            trailing_ones: 0,
            trailing_signs: [false; 3],
            level_prefix: [0; 16],
            level_suffix: [0; 16],
            levels: [0; 16],
            total_zeros: 0,
            run_before: [0; 16],
            runs: [0; 16],
            coeffs: CoeffArray::zeroed(address.max_coeff()),
        }
    }

    /// 从码流解码一个块
    pub fn decode(br: &mut BitReader, address: BlockAddress, nc: i32) -> ResynResult<Self> {
        let mut block = Self::empty(address);
        let (total_coeff, trailing_ones) = read_coeff_token(br, nc)?;
        let tc = total_coeff as usize;
        let span = address.span();
        if tc > span || tc > 16 {
            return Err(ResynError::malformed(format!(
                "TotalCoeff 超过扫描区间: {} > {}",
                tc, span
            )));
        }
        block.total_coeff = total_coeff;
        block.trailing_ones = trailing_ones;
        if tc == 0 {
            log::trace!("CAVLC 块 {:?}: nC={}, 无系数", address.category(), nc);
            return Ok(block);
        }

        // 电平
        let t1 = trailing_ones as usize;
        let mut suffix_length: u32 = if tc > 10 && t1 < 3 { 1 } else { 0 };
        for i in 0..tc {
            if i < t1 {
                let sign = br.read_flag()?;
                block.trailing_signs[i] = sign;
                block.levels[i] = if sign { -1 } else { 1 };
                continue;
            }
            let prefix = read_level_prefix(br)?;
            let mut level_code = (prefix.min(15) as i64) << suffix_length;
            let size = level_suffix_size(prefix, suffix_length);
            let mut suffix = 0u32;
            if size > 0 {
                suffix = br.read_bits(size)?;
                level_code += suffix as i64;
            }
            if prefix >= 15 && suffix_length == 0 {
                level_code += 15;
            }
            if prefix >= 16 {
                level_code += (1i64 << (prefix - 3)) - 4096;
            }
            if i == t1 && t1 < 3 {
                level_code += 2;
            }
            let level = if level_code % 2 == 0 {
                (level_code + 2) >> 1
            } else {
                -((level_code + 1) >> 1)
            };
            let level = i32::try_from(level)
                .map_err(|_| ResynError::malformed(format!("level 超出范围: {}", level)))?;
            block.level_prefix[i] = prefix as u8;
            block.level_suffix[i] = suffix;
            block.levels[i] = level;
            suffix_length = next_suffix_length(suffix_length, level);
        }

        // 零游程
        if tc < span {
            let total_zeros = read_total_zeros(br, total_coeff, address.max_coeff())?;
            if total_zeros as usize > span - tc {
                return Err(ResynError::malformed(format!(
                    "total_zeros 超过扫描区间: {} + {} > {}",
                    total_zeros, tc, span
                )));
            }
            block.total_zeros = total_zeros;
        }
        let mut zeros_left = block.total_zeros;
        for i in 0..tc - 1 {
            if zeros_left > 0 {
                let run = read_run_before(br, zeros_left)?;
                block.run_before[i] = run;
                block.runs[i] = run;
                zeros_left -= run;
            }
        }
        block.runs[tc - 1] = zeros_left;

        block.place()?;
        log::trace!(
            "CAVLC 块 {:?}: nC={}, TotalCoeff={}, TrailingOnes={}, total_zeros={}",
            address.category(),
            nc,
            total_coeff,
            trailing_ones,
            block.total_zeros
        );
        Ok(block)
    }

    /// 由 levels / runs 重建系数数组
    fn place(&mut self) -> ResynResult<()> {
        let start = self.address.start();
        let end = self.address.end();
        let mut coeff_num: isize = -1;
        for i in (0..self.total_coeff as usize).rev() {
            coeff_num += self.runs[i] as isize + 1;
            let pos = start + coeff_num as usize;
            if pos > end {
                return Err(ResynError::malformed(format!("系数位置越界: {} > {}", pos, end)));
            }
            self.coeffs[pos] = self.levels[i];
        }
        Ok(())
    }

    /// 由系数数组推导全部语法值
    ///
    /// `coeffs` 长度必须等于块容量, 扫描区间外的系数必须为 0.
    pub fn from_coefficients(address: BlockAddress, coeffs: &[i32]) -> ResynResult<Self> {
        if coeffs.len() != address.max_coeff() {
            return Err(ResynError::invalid(format!(
                "系数个数与块容量不符: {} != {}",
                coeffs.len(),
                address.max_coeff()
            )));
        }
        let (start, end) = (address.start(), address.end());
        if coeffs
            .iter()
            .enumerate()
            .any(|(pos, &c)| c != 0 && (pos < start || pos > end))
        {
            return Err(ResynError::invalid("扫描区间外存在非零系数"));
        }

        let mut block = Self::empty(address);
        block.coeffs = CoeffArray::from_slice(coeffs)?;

        // 从高频到低频收集非零系数
        let mut positions = [0usize; 16];
        let mut tc = 0usize;
        for pos in (start..=end).rev() {
            if coeffs[pos] != 0 {
                if tc == 16 {
                    return Err(ResynError::invalid("CAVLC 块最多 16 个非零系数"));
                }
                positions[tc] = pos;
                block.levels[tc] = coeffs[pos];
                tc += 1;
            }
        }
        block.total_coeff = tc as u8;
        if tc == 0 {
            return Ok(block);
        }

        let mut t1 = 0usize;
        while t1 < tc.min(3) && block.levels[t1].abs() == 1 {
            block.trailing_signs[t1] = block.levels[t1] < 0;
            t1 += 1;
        }
        block.trailing_ones = t1 as u8;

        let mut suffix_length: u32 = if tc > 10 && t1 < 3 { 1 } else { 0 };
        for i in t1..tc {
            let level = block.levels[i];
            let (prefix, suffix, _) = encode_level(level, suffix_length, i == t1 && t1 < 3)?;
            block.level_prefix[i] = prefix as u8;
            block.level_suffix[i] = suffix;
            suffix_length = next_suffix_length(suffix_length, level);
        }

        block.total_zeros = (positions[0] - start + 1 - tc) as u8;
        let mut zeros_left = block.total_zeros;
        for i in 0..tc - 1 {
            let run = (positions[i] - positions[i + 1] - 1) as u8;
            block.runs[i] = run;
            if zeros_left > 0 {
                block.run_before[i] = run;
            }
            zeros_left -= run;
        }
        block.runs[tc - 1] = zeros_left;
        Ok(block)
    }

    /// 按语法值写出块
    pub fn encode(&self, bw: &mut BitWriter, nc: i32) -> ResynResult<()> {
        let tc = self.total_coeff as usize;
        let t1 = self.trailing_ones as usize;
        let span = self.address.span();
        if tc > span || tc > 16 || t1 > tc.min(3) {
            return Err(ResynError::invalid(format!(
                "coeff_token 不一致: TotalCoeff={}, TrailingOnes={}",
                tc, t1
            )));
        }
        write_coeff_token(bw, nc, self.total_coeff, self.trailing_ones)?;
        if tc == 0 {
            return Ok(());
        }

        let mut suffix_length: u32 = if tc > 10 && t1 < 3 { 1 } else { 0 };
        for i in 0..tc {
            let level = self.levels[i];
            if i < t1 {
                if level != if self.trailing_signs[i] { -1 } else { 1 } {
                    return Err(ResynError::invalid(format!("拖尾 1 与符号不一致: levels[{}]={}", i, level)));
                }
                bw.write_flag(self.trailing_signs[i]);
                continue;
            }
            let (prefix, suffix, size) = encode_level(level, suffix_length, i == t1 && t1 < 3)?;
            if prefix as u8 != self.level_prefix[i] || suffix != self.level_suffix[i] {
                return Err(ResynError::invalid(format!(
                    "level 与前缀/后缀不一致: levels[{}]={}, prefix={}, suffix={}",
                    i, level, self.level_prefix[i], self.level_suffix[i]
                )));
            }
            bw.write_bits(1, prefix + 1);
            if size > 0 {
                bw.write_bits(suffix, size);
            }
            suffix_length = next_suffix_length(suffix_length, level);
        }

        let runs_total: usize = self.runs[..tc].iter().map(|&r| r as usize).sum();
        if runs_total != self.total_zeros as usize || tc + runs_total > span {
            return Err(ResynError::invalid(format!(
                "零游程与 total_zeros 不一致: {} != {}",
                runs_total, self.total_zeros
            )));
        }
        if tc < span {
            write_total_zeros(bw, self.total_zeros, self.total_coeff, self.address.max_coeff())?;
        }
        let mut zeros_left = self.total_zeros;
        for i in 0..tc - 1 {
            if zeros_left > 0 {
                write_run_before(bw, self.runs[i], zeros_left)?;
                zeros_left -= self.runs[i];
            }
        }
        Ok(())
    }

    pub fn coefficients(&self) -> &[i32] {
        self.coeffs.as_slice()
    }
}

/// 读取 level_prefix (前导零个数)
fn read_level_prefix(br: &mut BitReader) -> ResynResult<u32> {
    let mut zeros = 0u32;
    while br.read_bit()? == 0 {
        zeros += 1;
        if zeros > MAX_LEVEL_PREFIX {
            return Err(ResynError::UnboundedLoop(format!(
                "level_prefix 超过 {}",
                MAX_LEVEL_PREFIX
            )));
        }
    }
    Ok(zeros)
}

/// levelSuffixSize
fn level_suffix_size(prefix: u32, suffix_length: u32) -> u32 {
    if prefix == 14 && suffix_length == 0 {
        4
    } else if prefix >= 15 {
        prefix - 3
    } else {
        suffix_length
    }
}

fn next_suffix_length(suffix_length: u32, level: i32) -> u32 {
    let mut sl = suffix_length.max(1);
    if level.unsigned_abs() > (3u32 << (sl - 1)) && sl < 6 {
        sl += 1;
    }
    sl
}

/// 由 level 计算 `(level_prefix, level_suffix, levelSuffixSize)`
fn encode_level(level: i32, suffix_length: u32, first_after_t1: bool) -> ResynResult<(u32, u32, u32)> {
    if level == 0 {
        return Err(ResynError::invalid("非零系数位置出现 0"));
    }
    let mut level_code: i64 = if level > 0 {
        2 * level as i64 - 2
    } else {
        -2 * level as i64 - 1
    };
    if first_after_t1 {
        level_code -= 2;
    }
    if level_code < 0 {
        return Err(ResynError::invalid(format!("拖尾 1 之后的首个系数不能为 ±1: {}", level)));
    }

    let sl = suffix_length;
    if sl == 0 {
        if level_code < 14 {
            return Ok((level_code as u32, 0, 0));
        }
        if level_code < 30 {
            return Ok((14, (level_code - 14) as u32, 4));
        }
    } else if level_code < (15i64 << sl) {
        return Ok(((level_code >> sl) as u32, (level_code & ((1 << sl) - 1)) as u32, sl));
    }

    let escape_base = (15i64 << sl) + if sl == 0 { 15 } else { 0 };
    let rem = level_code - escape_base;
    if rem < 4096 {
        return Ok((15, rem as u32, 12));
    }
    for prefix in 16..=MAX_LEVEL_PREFIX {
        let size = prefix - 3;
        let value = rem - ((1i64 << size) - 4096);
        if value < (1i64 << size) {
            return Ok((prefix, value as u32, size));
        }
    }
    Err(ResynError::invalid(format!("level 超出可编码范围: {}", level)))
}
