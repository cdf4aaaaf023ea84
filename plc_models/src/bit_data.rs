// plc_models/src/bit_data.rs

//! Word 位分类模型。
//!
//! 将遥测帧的 65 个 Word 逐位展开为布尔数组，并按 Word 下标范围
//! 归入三个命名段：状态/动画段 (Words 0-16)、报警段 (Words 17-47)、
//! 事件段 (Words 48-64)。所有越界查询一律返回 `false` 而不是错误。

use serde::{Deserialize, Serialize};

use crate::telemetry::WORD_SLOTS;

/// 状态段包含的 Word 行数 (Words 0-16)。
pub const STATUS_BAND_WORDS: usize = 17;
/// 报警段包含的 Word 行数 (Words 17-47)。
pub const ALARM_BAND_WORDS: usize = 31;
/// 事件段包含的 Word 行数 (Words 48-64)。
pub const EVENT_BAND_WORDS: usize = 17;

/// 位分类的三个命名段。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BitBand {
    /// 状态/动画段 (Words 0-16)。
    Status,
    /// 报警段 (Words 17-47)。
    Alarm,
    /// 事件段 (Words 48-64)。
    Event,
}

/// 从遥测帧 Word 数组派生出的只读位视图。
///
/// 每个 Word 的第 *i* 位按 `(word >> i) & 1 != 0` 展开，
/// 行内下标是段内相对下标（报警段第 0 行对应 Word 17）。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BitClassification {
    /// 状态/动画位，17 行 x 16 位 (Words 0-16)。
    pub status_bits: Vec<Vec<bool>>,
    /// 报警位，31 行 x 16 位 (Words 17-47)。
    pub alarm_bits: Vec<Vec<bool>>,
    /// 事件位，17 行 x 16 位 (Words 48-64)。
    pub event_bits: Vec<Vec<bool>>,
}

/// 将单个 Word 展开为 16 个布尔位。
fn unpack_word(word: u16) -> Vec<bool> {
    (0..16).map(|i| (word >> i) & 1 != 0).collect()
}

impl BitClassification {
    /// 从 Word 数组派生位分类。超过 65 个的输入 Word 被忽略，
    /// 不足时缺失的行保持全 `false`。
    pub fn from_words(words: &[u16]) -> Self {
        let mut classification = Self {
            status_bits: vec![vec![false; 16]; STATUS_BAND_WORDS],
            alarm_bits: vec![vec![false; 16]; ALARM_BAND_WORDS],
            event_bits: vec![vec![false; 16]; EVENT_BAND_WORDS],
        };

        for (word_index, word) in words.iter().enumerate().take(WORD_SLOTS) {
            let bits = unpack_word(*word);
            if word_index <= 16 {
                classification.status_bits[word_index] = bits;
            } else if word_index <= 47 {
                classification.alarm_bits[word_index - 17] = bits;
            } else {
                classification.event_bits[word_index - 48] = bits;
            }
        }

        classification
    }

    fn band_rows(&self, band: BitBand) -> &[Vec<bool>] {
        match band {
            BitBand::Status => &self.status_bits,
            BitBand::Alarm => &self.alarm_bits,
            BitBand::Event => &self.event_bits,
        }
    }

    /// 查询指定段内某行某位的值；段内行下标或位下标越界时返回 `false`。
    pub fn get_bit(&self, band: BitBand, word_index: usize, bit_index: usize) -> bool {
        self.band_rows(band)
            .get(word_index)
            .and_then(|bits| bits.get(bit_index))
            .copied()
            .unwrap_or(false)
    }

    /// 查询指定段内某行的一段连续位；任何越界范围返回空切片。
    pub fn get_bit_range(
        &self,
        band: BitBand,
        word_index: usize,
        start_bit: usize,
        end_bit: usize,
    ) -> &[bool] {
        match self.band_rows(band).get(word_index) {
            Some(bits) if start_bit <= end_bit && end_bit < bits.len() => {
                &bits[start_bit..=end_bit]
            }
            _ => &[],
        }
    }
}
