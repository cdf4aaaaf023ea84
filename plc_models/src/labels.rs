// plc_models/src/labels.rs

//! 设备标签表模型。
//!
//! 标签表把 Word 位下标和 Int/Real 下标映射为人类可读的设备点位名称，
//! 按设备分组。它是外部配置数据（JSON 资源文件），不是代码：
//! 表缺失或不完整只会让标注退化，绝不影响解码与广播。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bit_data::BitClassification;
use crate::telemetry::TelemetryFrame;

/// 单个 Word 位点位的标签定义。`word_index` 是全局 Word 下标 (0-64)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BitLabel {
    pub name: String,
    pub equipment: String,
    pub word_index: usize,
    pub bit_index: usize,
    #[serde(default)]
    pub description: String,
}

/// 单个 Int/Real 槽位的标签定义。`index` 是对应数组内的全局下标。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValueLabel {
    pub name: String,
    pub equipment: String,
    pub index: usize,
    #[serde(default)]
    pub description: String,
}

/// 完整标签表：三个位段与两类数值的标签定义，按设备分组。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LabelTables {
    #[serde(default)]
    pub status_bits: BTreeMap<String, Vec<BitLabel>>,
    #[serde(default)]
    pub alarm_bits: BTreeMap<String, Vec<BitLabel>>,
    #[serde(default)]
    pub event_bits: BTreeMap<String, Vec<BitLabel>>,
    #[serde(default)]
    pub int_data: BTreeMap<String, Vec<ValueLabel>>,
    #[serde(default)]
    pub real_data: BTreeMap<String, Vec<ValueLabel>>,
}

impl LabelTables {
    /// 从 JSON 文本解析标签表。文件读取由调用方负责，保持本 crate 无 I/O。
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// 判断表中是否没有任何标签定义。
    pub fn is_empty(&self) -> bool {
        self.status_bits.is_empty()
            && self.alarm_bits.is_empty()
            && self.event_bits.is_empty()
            && self.int_data.is_empty()
            && self.real_data.is_empty()
    }
}

/// 附带当前值的位标签。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LabeledBit {
    #[serde(flatten)]
    pub label: BitLabel,
    pub value: bool,
}

/// 附带当前值的数值标签。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabeledValue<T> {
    #[serde(flatten)]
    pub label: ValueLabel,
    pub value: T,
}

/// 按设备分组、附带当前帧取值的标签视图。
///
/// 由广播引擎在每帧派生一次；标签下标越界时对应值保持零/假。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LabeledView {
    pub status_bits: BTreeMap<String, Vec<LabeledBit>>,
    pub alarm_bits: BTreeMap<String, Vec<LabeledBit>>,
    pub event_bits: BTreeMap<String, Vec<LabeledBit>>,
    pub int_data: BTreeMap<String, Vec<LabeledValue<i16>>>,
    pub real_data: BTreeMap<String, Vec<LabeledValue<f32>>>,
}

/// 按全局 Word 下标读取一位；越界返回 `false`。
fn word_bit(words: &[u16], word_index: usize, bit_index: usize) -> bool {
    if bit_index >= 16 {
        return false;
    }
    words
        .get(word_index)
        .map(|word| (word >> bit_index) & 1 != 0)
        .unwrap_or(false)
}

fn fill_bits(
    tables: &BTreeMap<String, Vec<BitLabel>>,
    words: &[u16],
) -> BTreeMap<String, Vec<LabeledBit>> {
    tables
        .iter()
        .map(|(equipment, labels)| {
            let filled = labels
                .iter()
                .map(|label| LabeledBit {
                    value: word_bit(words, label.word_index, label.bit_index),
                    label: label.clone(),
                })
                .collect();
            (equipment.clone(), filled)
        })
        .collect()
}

fn fill_values<T: Copy + Default>(
    tables: &BTreeMap<String, Vec<ValueLabel>>,
    values: &[T],
) -> BTreeMap<String, Vec<LabeledValue<T>>> {
    tables
        .iter()
        .map(|(equipment, labels)| {
            let filled = labels
                .iter()
                .map(|label| LabeledValue {
                    value: values.get(label.index).copied().unwrap_or_default(),
                    label: label.clone(),
                })
                .collect();
            (equipment.clone(), filled)
        })
        .collect()
}

impl LabeledView {
    /// 用当前帧的取值填充标签表，生成按设备分组的标注视图。
    pub fn build(
        frame: &TelemetryFrame,
        _classification: &BitClassification,
        tables: &LabelTables,
    ) -> Self {
        Self {
            status_bits: fill_bits(&tables.status_bits, &frame.words),
            alarm_bits: fill_bits(&tables.alarm_bits, &frame.words),
            event_bits: fill_bits(&tables.event_bits, &frame.words),
            int_data: fill_values(&tables.int_data, &frame.ints),
            real_data: fill_values(&tables.real_data, &frame.reals),
        }
    }
}
