// plc_models/src/write_command.rs

//! 仪表板下发给 PLC 的写命令模型。
//!
//! `WriteCommand` 是一个稀疏的 `(index, value)` 对列表：只有命令中显式出现
//! 且下标合法、类型匹配的槽位才会被写入编码帧，其余槽位编码为零/空。
//! 下标越界或类型不匹配的条目会被静默跳过，不视为错误。

use serde::{Deserialize, Serialize};

/// 可写 Word 槽位数量 (Array[0..2])。
pub const WRITE_WORD_SLOTS: usize = 3;
/// 可写 Int 槽位数量 (Array[0..10])。
pub const WRITE_INT_SLOTS: usize = 11;
/// 可写 Real 槽位数量 (Array[0..10])。
pub const WRITE_REAL_SLOTS: usize = 11;
/// 可写字符串槽位数量 (Array[0..4])。
pub const WRITE_STRING_SLOTS: usize = 5;
/// 编码后的写命令帧固定字节长度：6 + 22 + 44 + 160 + 8 = 240。
pub const WRITE_FRAME_LEN: usize = 240;

/// 写命令中的单个 `(下标, 值)` 对。
///
/// `value` 保持为原始 JSON 值：数值槽位接受任意 JSON 数字（按 f64 解释后截断），
/// 字符串槽位接受 JSON 字符串；其余类型在编码时被跳过。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WriteValue {
    pub index: i64,
    pub value: serde_json::Value,
}

/// 仪表板下发的完整写命令，四个数组均可缺省为空。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WriteCommand {
    #[serde(default)]
    pub words: Vec<WriteValue>,
    #[serde(default)]
    pub ints: Vec<WriteValue>,
    #[serde(default)]
    pub reals: Vec<WriteValue>,
    #[serde(default)]
    pub strings: Vec<WriteValue>,
}

impl WriteCommand {
    /// 判断命令是否不包含任何条目（包括非法条目）。
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
            && self.ints.is_empty()
            && self.reals.is_empty()
            && self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    /// 测试仪表板协议约定的 JSON 形状可以被正确反序列化，缺省数组按空处理。
    fn test_write_command_deserialization() {
        let raw = r#"{"words":[{"index":0,"value":1}],"strings":[{"index":2,"value":"ABC"}]}"#;
        let cmd: WriteCommand = serde_json::from_str(raw).expect("WriteCommand 反序列化失败");

        assert_eq!(cmd.words.len(), 1, "words 数组长度不正确");
        assert_eq!(cmd.words[0].index, 0);
        assert_eq!(cmd.words[0].value, json!(1));
        assert!(cmd.ints.is_empty(), "缺省的 ints 数组应为空");
        assert!(cmd.reals.is_empty(), "缺省的 reals 数组应为空");
        assert_eq!(cmd.strings[0].value, json!("ABC"));
    }

    #[test]
    /// 测试 `is_empty` 对空命令与非空命令的判断。
    fn test_write_command_is_empty() {
        assert!(WriteCommand::default().is_empty(), "默认命令应为空");

        let cmd = WriteCommand {
            reals: vec![WriteValue { index: 3, value: json!(1.5) }],
            ..Default::default()
        };
        assert!(!cmd.is_empty(), "包含条目的命令不应为空");
    }
}
