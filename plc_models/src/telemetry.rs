// plc_models/src/telemetry.rs

//! PLC 遥测帧模型。
//!
//! `TelemetryFrame` 是从 PLC 字节流解码得到的固定形状数据帧：
//! 无论输入长度如何，帧内各数组的槽位数量都是固定的，
//! 缺失的字节只会让对应槽位保持零值，解码永远不会失败。

use serde::{Deserialize, Serialize};

/// Word 槽位数量 (Array[0..64])。
pub const WORD_SLOTS: usize = 65;
/// Int 槽位数量 (Array[0..80])。
pub const INT_SLOTS: usize = 81;
/// Real 槽位数量 (Array[0..130])。
pub const REAL_SLOTS: usize = 131;
/// 字符串槽位数量 (Array[0..1])。
pub const STRING_SLOTS: usize = 2;
/// 单个字符串槽位的字节宽度（1 字节最大长度 + 1 字节实际长度 + 30 字节内容）。
pub const STRING_SLOT_BYTES: usize = 32;
/// 一个完整遥测帧的标称字节长度：130 + 162 + 524 + 64 + 8 = 888。
pub const NOMINAL_FRAME_LEN: usize = 888;

/// 帧尾部的四个计数器，由 PLC 报告各类数据的实际数量。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub word_count: i16,
    pub int_count: i16,
    pub real_count: i16,
    pub string_count: i16,
}

/// 从 PLC 接收并解码后的完整遥测帧。
///
/// 每收到一条 PLC 消息就新建一个实例，解码完成后不再修改，
/// 由广播引擎消费后即丢弃，不做任何持久化。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TelemetryFrame {
    /// 原始 Word 数组，固定 65 个无符号 16 位槽位。
    pub words: Vec<u16>,
    /// 原始 Int 数组，固定 81 个有符号 16 位槽位。
    pub ints: Vec<i16>,
    /// 原始 Real 数组，固定 131 个 32 位浮点槽位。
    pub reals: Vec<f32>,
    /// 两个固定字符串槽位（西门子风格长度前缀编码，最长 30 字符）。
    pub strings: Vec<String>,
    /// 帧尾部计数器。
    pub counts: Counts,
    /// 捕获时间戳，格式 `YYYY-MM-DD HH:MM:SS.mmm`，供下游诊断使用。
    pub timestamp: String,
    /// 实际收到的输入字节数，供下游诊断使用。
    pub bytes_size: usize,
}

impl TelemetryFrame {
    /// 创建一个零值填充的完整形状遥测帧。
    pub fn new() -> Self {
        Self {
            words: vec![0; WORD_SLOTS],
            ints: vec![0; INT_SLOTS],
            reals: vec![0.0; REAL_SLOTS],
            strings: vec![String::new(); STRING_SLOTS],
            counts: Counts::default(),
            timestamp: String::new(),
            bytes_size: 0,
        }
    }
}

impl Default for TelemetryFrame {
    fn default() -> Self {
        Self::new()
    }
}
