// plc_models/src/ws_payloads.rs

//! WebSocket 广播消息负载定义。
//!
//! 本模块定义广播引擎推送给仪表板客户端的 JSON 负载结构。
//! 字段名即线上协议：前端按这些名字取值，任何改名都是破坏性变更。

use serde::{Deserialize, Serialize};

use crate::bit_data::BitClassification;
use crate::labels::{LabelTables, LabeledView};
use crate::telemetry::{Counts, TelemetryFrame};

/// 快照负载中的位分类部分，三个段各为“行 x 16 位”的布尔矩阵。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BitDataPayload {
    pub status_bits: Vec<Vec<bool>>,
    pub alarm_bits: Vec<Vec<bool>>,
    pub event_bits: Vec<Vec<bool>>,
}

impl From<BitClassification> for BitDataPayload {
    fn from(classification: BitClassification) -> Self {
        Self {
            status_bits: classification.status_bits,
            alarm_bits: classification.alarm_bits,
            event_bits: classification.event_bits,
        }
    }
}

/// 推送给每个仪表板客户端的完整遥测快照。
///
/// 原始数组始终存在；标注视图仅在标签表非空时附带
/// (`skip_serializing_if` 让空表不产生冗余字段)。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TelemetrySnapshotPayload {
    pub words: Vec<u16>,
    pub ints: Vec<i16>,
    pub reals: Vec<f32>,
    pub strings: Vec<String>,
    pub bit_data: BitDataPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeled: Option<LabeledView>,
    pub counts: Counts,
    pub timestamp: String,
    pub bytes_size: usize,
}

impl TelemetrySnapshotPayload {
    /// 由解码后的遥测帧构建快照负载，每帧构建一次、序列化一次、
    /// 同一份 JSON 文本发给所有客户端。
    pub fn build(frame: &TelemetryFrame, tables: &LabelTables) -> Self {
        let classification = BitClassification::from_words(&frame.words);
        let labeled = if tables.is_empty() {
            None
        } else {
            Some(LabeledView::build(frame, &classification, tables))
        };

        Self {
            words: frame.words.clone(),
            ints: frame.ints.clone(),
            reals: frame.reals.clone(),
            strings: frame.strings.clone(),
            bit_data: classification.into(),
            labeled,
            counts: frame.counts,
            timestamp: frame.timestamp.clone(),
            bytes_size: frame.bytes_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_data::{ALARM_BAND_WORDS, EVENT_BAND_WORDS, STATUS_BAND_WORDS};

    #[test]
    /// 测试快照负载序列化后的 JSON 顶层字段名与前端协议一致。
    fn test_snapshot_payload_field_names() {
        let frame = TelemetryFrame::new();
        let payload = TelemetrySnapshotPayload::build(&frame, &LabelTables::default());
        let json = serde_json::to_value(&payload).expect("快照负载序列化失败");

        for key in ["words", "ints", "reals", "strings", "bit_data", "counts", "timestamp", "bytes_size"] {
            assert!(json.get(key).is_some(), "快照负载缺少字段 '{}'", key);
        }
        let bit_data = json.get("bit_data").unwrap();
        for key in ["status_bits", "alarm_bits", "event_bits"] {
            assert!(bit_data.get(key).is_some(), "bit_data 缺少字段 '{}'", key);
        }
        assert!(json.get("labeled").is_none(), "空标签表不应产生 labeled 字段");
    }

    #[test]
    /// 测试位分类矩阵在快照中保持固定形状。
    fn test_snapshot_bit_data_shape() {
        let mut frame = TelemetryFrame::new();
        frame.words[17] = 0x0001;
        let payload = TelemetrySnapshotPayload::build(&frame, &LabelTables::default());

        assert_eq!(payload.bit_data.status_bits.len(), STATUS_BAND_WORDS);
        assert_eq!(payload.bit_data.alarm_bits.len(), ALARM_BAND_WORDS);
        assert_eq!(payload.bit_data.event_bits.len(), EVENT_BAND_WORDS);
        assert!(payload.bit_data.alarm_bits[0][0], "Word 17 的位 0 应出现在报警段第 0 行");
    }

    #[test]
    /// 测试标签表非空时快照附带标注视图。
    fn test_snapshot_includes_labeled_view_when_tables_present() {
        let tables = LabelTables::from_json_str(
            r#"{"real_data": {"Mistura": [{"name": "TEMP_MISTURADOR", "equipment": "Mistura", "index": 2}]}}"#,
        )
        .expect("标签表解析失败");

        let mut frame = TelemetryFrame::new();
        frame.reals[2] = 36.5;
        let payload = TelemetrySnapshotPayload::build(&frame, &tables);

        let labeled = payload.labeled.expect("非空标签表应产生标注视图");
        assert_eq!(labeled.real_data["Mistura"][0].value, 36.5, "标注视图应取到当前帧的 Real 值");
    }
}
