//! 缩放矩阵 (scaling_list) 的延迟解析.
//!
//! 参数集中的缩放矩阵长度依赖数据, 首次扫描时只记录每个列表的位置,
//! 需要时再按位置重新解析.

use resyn_core::{BitReader, BitSpan, BitWriter, ResynError, ResynResult};

use super::exp_golomb::{read_se, write_se};

/// 第 `index` 个列表的系数个数: 前 6 个为 4x4, 其余为 8x8
pub fn scaling_list_size(index: usize) -> usize {
    if index < 6 { 16 } else { 64 }
}

/// 一个已解析的缩放列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingList {
    /// 码流中的 delta_scale, 遇到 nextScale=0 后提前结束
    pub deltas: Vec<i32>,
    /// 按扫描顺序展开的列表值
    pub values: Vec<u8>,
    /// useDefaultScalingMatrixFlag
    pub use_default: bool,
}

impl ScalingList {
    /// 解析 scaling_list(sizeOfScalingList)
    pub fn parse(br: &mut BitReader<'_>, size: usize) -> ResynResult<Self> {
        let mut last_scale = 8i32;
        let mut next_scale = 8i32;
        let mut list = Self {
            deltas: Vec::new(),
            values: Vec::with_capacity(size),
            use_default: false,
        };
        for j in 0..size {
            if next_scale != 0 {
                let delta = read_se(br)?;
                if !(-128..=127).contains(&delta) {
                    return Err(ResynError::malformed(format!("delta_scale 超出范围: {}", delta)));
                }
                list.deltas.push(delta);
                next_scale = (last_scale + delta + 256) % 256;
                list.use_default = j == 0 && next_scale == 0;
            }
            let value = if next_scale == 0 { last_scale } else { next_scale };
            list.values.push(value as u8);
            last_scale = value;
        }
        Ok(list)
    }

    /// 由列表值构造, 末尾重复值以 nextScale=0 提前结束
    pub fn from_values(values: &[u8]) -> ResynResult<Self> {
        if values.len() != 16 && values.len() != 64 {
            return Err(ResynError::invalid(format!("缩放列表长度非法: {}", values.len())));
        }
        if values.contains(&0) {
            return Err(ResynError::invalid("缩放列表值不能为 0"));
        }
        let last = values[values.len() - 1];
        // 末尾重复段的第一个值仍需显式写出
        let tail_start = values.iter().rposition(|&v| v != last).map_or(0, |p| p + 1);
        let explicit = (tail_start + 1).min(values.len());
        let mut deltas = Vec::new();
        let mut last_scale = 8i32;
        for &value in &values[..explicit] {
            deltas.push(wrap_delta(i32::from(value) - last_scale));
            last_scale = i32::from(value);
        }
        if explicit < values.len() {
            deltas.push(wrap_delta(-last_scale));
        }
        Ok(Self {
            deltas,
            values: values.to_vec(),
            use_default: false,
        })
    }

    /// 指示使用默认矩阵的列表 (delta_scale=-8)
    pub fn default_matrix(size: usize) -> Self {
        Self {
            deltas: vec![-8],
            values: vec![8; size],
            use_default: true,
        }
    }

    pub fn write(&self, bw: &mut BitWriter) -> ResynResult<()> {
        for &delta in &self.deltas {
            write_se(bw, delta)?;
        }
        Ok(())
    }
}

/// 把差值折叠到 [-128, 127]
fn wrap_delta(delta: i32) -> i32 {
    (delta + 128).rem_euclid(256) - 128
}

/// 参数集中一组缩放列表的位置描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingMatrices {
    span: BitSpan,
    lists: Vec<Option<BitSpan>>,
}

impl ScalingMatrices {
    /// 扫描 `list_count` 个 (present_flag, scaling_list), 只记录位置
    pub fn locate(br: &mut BitReader<'_>, list_count: usize) -> ResynResult<Self> {
        if list_count == 0 || list_count > 12 {
            return Err(ResynError::invalid(format!("缩放列表个数非法: {}", list_count)));
        }
        let (span, lists) = BitSpan::capture(br, |r| {
            let mut lists = Vec::with_capacity(list_count);
            for i in 0..list_count {
                if r.read_flag()? {
                    let (list_span, _) = BitSpan::capture(r, |r| ScalingList::parse(r, scaling_list_size(i)))?;
                    lists.push(Some(list_span));
                } else {
                    lists.push(None);
                }
            }
            Ok(lists)
        })?;
        Ok(Self { span, lists })
    }

    /// 整个结构的区间
    pub fn span(&self) -> BitSpan {
        self.span
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// scaling_list_present_flag[index]
    pub fn is_present(&self, index: usize) -> bool {
        matches!(self.lists.get(index), Some(Some(_)))
    }

    /// 按需解析第 `index` 个列表, 完成后恢复 `br` 的游标
    pub fn read_list(&self, br: &mut BitReader<'_>, index: usize) -> ResynResult<Option<ScalingList>> {
        match self.lists.get(index) {
            None => Err(ResynError::invalid(format!(
                "缩放列表下标越界: {} >= {}",
                index,
                self.lists.len()
            ))),
            Some(None) => Ok(None),
            Some(Some(span)) => span
                .resolve(br, |r| ScalingList::parse(r, scaling_list_size(index)))
                .map(Some),
        }
    }

    /// 写出 (present_flag, scaling_list) 序列
    pub fn write_lists(bw: &mut BitWriter, lists: &[Option<ScalingList>]) -> ResynResult<()> {
        for (i, list) in lists.iter().enumerate() {
            bw.write_flag(list.is_some());
            if let Some(list) = list {
                if list.values.len() != scaling_list_size(i) {
                    return Err(ResynError::invalid(format!(
                        "第 {} 个缩放列表长度应为 {}",
                        i,
                        scaling_list_size(i)
                    )));
                }
                list.write(bw)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_terminates_early() {
        let mut values = [16u8; 16];
        values[0] = 6;
        values[1] = 13;
        let list = ScalingList::from_values(&values).unwrap();
        // 6-8, 13-6, 16-13, 然后 0-16 结束
        assert_eq!(list.deltas, vec![-2, 7, 3, -16]);

        let flat = ScalingList::from_values(&[8; 64]).unwrap();
        assert_eq!(flat.deltas, vec![0, -8], "全 8 列表写一个 0 再结束");
        assert!(ScalingList::from_values(&[8; 15]).is_err());
    }

    #[test]
    fn test_delta_wraps_into_signed_byte() {
        assert_eq!(wrap_delta(200), -56);
        assert_eq!(wrap_delta(-200), 56);
        assert_eq!(wrap_delta(127), 127);
        assert_eq!(wrap_delta(-128), -128);
    }

    #[test]
    fn test_locate_and_resolve_restores_cursor() {
        let mut values = [20u8; 64];
        values[5] = 40;
        let lists = vec![
            None,
            Some(ScalingList::default_matrix(16)),
            None,
            None,
            None,
            None,
            Some(ScalingList::from_values(&values).unwrap()),
            None,
        ];
        let mut bw = BitWriter::new();
        ScalingMatrices::write_lists(&mut bw, &lists).unwrap();
        let total = bw.bits_written();
        bw.write_bits(0b101, 3);
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        let matrices = ScalingMatrices::locate(&mut br, 8).unwrap();
        assert_eq!(br.bits_read(), total, "locate 应消费整个结构");
        assert_eq!(matrices.span().bit_len(), total);
        assert!(matrices.is_present(1) && matrices.is_present(6));
        assert!(!matrices.is_present(0) && !matrices.is_present(8));

        assert_eq!(br.read_bits(3).unwrap(), 0b101);
        let default = matrices.read_list(&mut br, 1).unwrap().unwrap();
        assert!(default.use_default);
        let list = matrices.read_list(&mut br, 6).unwrap().unwrap();
        assert_eq!(list.values, values.to_vec());
        assert_eq!(matrices.read_list(&mut br, 0).unwrap(), None);
        assert!(matrices.read_list(&mut br, 9).is_err());
        assert_eq!(br.bits_read(), total + 3, "按需解析后应恢复游标");
    }
}
