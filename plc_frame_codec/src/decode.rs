// plc_frame_codec/src/decode.rs

//! PLC 遥测帧解码。
//!
//! 线上格式为大端字节序的固定布局，标称长度 888 字节：
//!
//! | 区段     | 偏移 | 长度 | 内容                     |
//! |----------|------|------|--------------------------|
//! | Words    | 0    | 130  | 65 x u16                 |
//! | Ints     | 130  | 162  | 81 x i16                 |
//! | Reals    | 292  | 524  | 131 x f32                |
//! | Strings  | 816  | 64   | 2 x 32 字节字符串槽位    |
//! | Counters | 880  | 8    | 4 x u16 计数器           |
//!
//! 解码逐元素做边界检查：输入在任何位置截断时，后续槽位保持零值，
//! 解码永远成功。这是刻意的防御式设计，PLC 在启动或配置阶段可能
//! 发送不完整的帧。

use chrono::Local;

use plc_models::telemetry::{
    Counts, TelemetryFrame, INT_SLOTS, REAL_SLOTS, STRING_SLOTS, STRING_SLOT_BYTES, WORD_SLOTS,
};

/// Words 区段起始偏移。
const WORDS_OFFSET: usize = 0;
/// Ints 区段起始偏移。
const INTS_OFFSET: usize = WORDS_OFFSET + WORD_SLOTS * 2;
/// Reals 区段起始偏移。
const REALS_OFFSET: usize = INTS_OFFSET + INT_SLOTS * 2;
/// Strings 区段起始偏移。
const STRINGS_OFFSET: usize = REALS_OFFSET + REAL_SLOTS * 4;
/// Counters 区段起始偏移。
const COUNTS_OFFSET: usize = STRINGS_OFFSET + STRING_SLOTS * STRING_SLOT_BYTES;

/// 将 PLC 上报的原始字节流解码为完整形状的遥测帧。
///
/// # 参数
/// * `data` - 从 TCP 链路读到的一条原始消息，长度任意。
///
/// # 返回
/// 解码后的 [`TelemetryFrame`]。输入不足的部分槽位保持零值，
/// 时间戳取本地捕获时间，`bytes_size` 记录实际输入长度。
pub fn decode_frame(data: &[u8]) -> TelemetryFrame {
    let mut frame = TelemetryFrame::new();
    frame.timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    frame.bytes_size = data.len();

    for i in 0..WORD_SLOTS {
        if let Some(value) = read_u16_be(data, WORDS_OFFSET + i * 2) {
            frame.words[i] = value;
        }
    }

    for i in 0..INT_SLOTS {
        if let Some(value) = read_u16_be(data, INTS_OFFSET + i * 2) {
            frame.ints[i] = value as i16;
        }
    }

    for i in 0..REAL_SLOTS {
        if let Some(value) = read_u32_be(data, REALS_OFFSET + i * 4) {
            frame.reals[i] = f32::from_bits(value);
        }
    }

    for i in 0..STRING_SLOTS {
        let offset = STRINGS_OFFSET + i * STRING_SLOT_BYTES;
        if let Some(slot) = data.get(offset..offset + STRING_SLOT_BYTES) {
            frame.strings[i] = decode_string_slot(slot);
        }
    }

    frame.counts = Counts {
        word_count: read_u16_be(data, COUNTS_OFFSET).unwrap_or(0) as i16,
        int_count: read_u16_be(data, COUNTS_OFFSET + 2).unwrap_or(0) as i16,
        real_count: read_u16_be(data, COUNTS_OFFSET + 4).unwrap_or(0) as i16,
        string_count: read_u16_be(data, COUNTS_OFFSET + 6).unwrap_or(0) as i16,
    };

    frame
}

fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// 解码单个 32 字节字符串槽位。
///
/// 优先按西门子 S7 STRING 格式解释（字节 0 为最大长度，字节 1 为实际长度）；
/// 长度前缀不合法时退化为直接 ASCII 扫描：跳过前导的不可打印字节，
/// 收集可打印字符，遇到 NUL 或内容后的第一个不可打印字节即停止。
pub fn decode_string_slot(slot: &[u8]) -> String {
    // 方法 1: 西门子长度前缀格式。
    if slot.len() >= 2 {
        let max_len = slot[0] as usize;
        let act_len = slot[1] as usize;
        if max_len > 0 && max_len <= 30 && act_len > 0 && act_len <= max_len {
            if let Some(content) = slot.get(2..2 + act_len) {
                return String::from_utf8_lossy(content).into_owned();
            }
        }
    }

    // 方法 2: 直接 ASCII 扫描。
    let mut result = String::new();
    for &byte in slot {
        if byte == 0 {
            break;
        }
        if (32..=126).contains(&byte) {
            result.push(byte as char);
        } else if !result.is_empty() {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use plc_models::telemetry::NOMINAL_FRAME_LEN;

    /// 构造一个内容可预测的标称长度帧。
    fn sample_frame_bytes() -> Vec<u8> {
        let mut data = vec![0u8; NOMINAL_FRAME_LEN];
        // words[0] = 0x1234, words[64] = 0x00FF
        data[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
        data[128..130].copy_from_slice(&0x00FFu16.to_be_bytes());
        // ints[0] = -5, ints[80] = 32000
        data[130..132].copy_from_slice(&(-5i16).to_be_bytes());
        data[290..292].copy_from_slice(&32000i16.to_be_bytes());
        // reals[0] = 1.5, reals[130] = -2.25
        data[292..296].copy_from_slice(&1.5f32.to_be_bytes());
        data[812..816].copy_from_slice(&(-2.25f32).to_be_bytes());
        // strings[0]: 西门子格式 "ABC"
        data[816] = 30;
        data[817] = 3;
        data[818..821].copy_from_slice(b"ABC");
        // strings[1]: 裸 ASCII "OK" 后跟 NUL
        data[848..850].copy_from_slice(b"OK");
        // 计数器 65/81/131/2
        data[880..882].copy_from_slice(&65u16.to_be_bytes());
        data[882..884].copy_from_slice(&81u16.to_be_bytes());
        data[884..886].copy_from_slice(&131u16.to_be_bytes());
        data[886..888].copy_from_slice(&2u16.to_be_bytes());
        data
    }

    #[test]
    /// 测试标称长度帧的各区段按大端字节序正确解码。
    fn test_decode_full_frame() {
        let data = sample_frame_bytes();
        let frame = decode_frame(&data);

        assert_eq!(frame.words[0], 0x1234);
        assert_eq!(frame.words[64], 0x00FF);
        assert_eq!(frame.ints[0], -5);
        assert_eq!(frame.ints[80], 32000);
        assert_eq!(frame.reals[0], 1.5);
        assert_eq!(frame.reals[130], -2.25);
        assert_eq!(frame.strings[0], "ABC");
        assert_eq!(frame.strings[1], "OK");
        assert_eq!(frame.counts.word_count, 65);
        assert_eq!(frame.counts.int_count, 81);
        assert_eq!(frame.counts.real_count, 131);
        assert_eq!(frame.counts.string_count, 2);
        assert_eq!(frame.bytes_size, NOMINAL_FRAME_LEN);
        assert!(!frame.timestamp.is_empty(), "解码应填充捕获时间戳");
    }

    #[test]
    /// 测试任意长度的截断输入都能解码成功，且已覆盖的前缀内容不变。
    fn test_decode_truncated_input_never_fails() {
        let full = sample_frame_bytes();
        let reference = decode_frame(&full);

        for len in 0..NOMINAL_FRAME_LEN {
            let frame = decode_frame(&full[..len]);
            assert_eq!(frame.words.len(), 65, "截断输入仍应保持完整形状");
            assert_eq!(frame.bytes_size, len);

            // 已完整覆盖的 Word 槽位必须与完整帧一致，其余保持零值。
            for i in 0..65 {
                let expected = if (i + 1) * 2 <= len { reference.words[i] } else { 0 };
                assert_eq!(frame.words[i], expected, "长度 {} 时 words[{}] 不正确", len, i);
            }
        }
    }

    #[test]
    /// 测试空输入解码为全零帧。
    fn test_decode_empty_input() {
        let frame = decode_frame(&[]);
        assert!(frame.words.iter().all(|w| *w == 0));
        assert!(frame.ints.iter().all(|v| *v == 0));
        assert!(frame.reals.iter().all(|v| *v == 0.0));
        assert!(frame.strings.iter().all(|s| s.is_empty()));
        assert_eq!(frame.counts, Counts::default());
        assert_eq!(frame.bytes_size, 0);
    }

    #[test]
    /// 测试超长输入只解码前 888 字节覆盖的区段，多余字节被忽略。
    fn test_decode_oversized_input_ignores_tail() {
        let mut data = sample_frame_bytes();
        data.extend_from_slice(&[0xAA; 100]);
        let frame = decode_frame(&data);

        assert_eq!(frame.words[0], 0x1234);
        assert_eq!(frame.counts.string_count, 2);
        assert_eq!(frame.bytes_size, NOMINAL_FRAME_LEN + 100);
    }

    #[test]
    /// 测试计数器区段被截断时各计数器独立降级为零。
    fn test_decode_counters_degrade_independently() {
        let full = sample_frame_bytes();

        // 只保留前两个计数器的字节。
        let frame = decode_frame(&full[..884]);
        assert_eq!(frame.counts.word_count, 65);
        assert_eq!(frame.counts.int_count, 81);
        assert_eq!(frame.counts.real_count, 0, "被截断的计数器应保持零");
        assert_eq!(frame.counts.string_count, 0);

        // 计数器区段被奇数截断时，不完整的计数器保持零。
        let frame = decode_frame(&full[..883]);
        assert_eq!(frame.counts.word_count, 65);
        assert_eq!(frame.counts.int_count, 0, "不足 2 字节的计数器应保持零");
    }

    #[test]
    /// 测试西门子长度前缀格式的字符串解码，包括最大长度不为 30 的变体。
    fn test_decode_string_siemens_format() {
        let mut slot = [0u8; 32];
        slot[0] = 30;
        slot[1] = 5;
        slot[2..7].copy_from_slice(b"MOTOR");
        assert_eq!(decode_string_slot(&slot), "MOTOR");

        // 最大长度声明为 20 同样是合法前缀。
        slot[0] = 20;
        slot[1] = 3;
        assert_eq!(decode_string_slot(&slot), "MOT");

        // 实际长度为 0 的西门子槽位解码为空串。
        let mut empty = [0u8; 32];
        empty[0] = 30;
        assert_eq!(decode_string_slot(&empty), "");

        // 实际长度超过最大长度时前缀不合法，退化为 ASCII 扫描。
        slot[0] = 4;
        slot[1] = 10;
        slot[2..12].copy_from_slice(b"ABCDEFGHIJ");
        let decoded = decode_string_slot(&slot);
        assert!(decoded.starts_with("ABCDEFGHIJ"), "非法前缀应退化为 ASCII 扫描: {:?}", decoded);
    }

    #[test]
    /// 测试 ASCII 扫描方法：跳过前导不可打印字节，内容之后遇到不可打印字节即停止。
    fn test_decode_string_ascii_scan() {
        let mut slot = [0u8; 32];
        // 前导控制字节 + "PUMP" + 控制字节 + "XX"
        slot[0] = 0x01;
        slot[1] = 0x02;
        slot[2..6].copy_from_slice(b"PUMP");
        slot[6] = 0x07;
        slot[7..9].copy_from_slice(b"XX");
        assert_eq!(decode_string_slot(&slot), "PUMP", "内容后的不可打印字节应终止扫描");

        // NUL 立即终止。
        let mut slot = [0u8; 32];
        slot[0..2].copy_from_slice(b"AB");
        slot[2] = 0;
        slot[3..5].copy_from_slice(b"CD");
        assert_eq!(decode_string_slot(&slot), "AB");

        // 全零槽位解码为空串。
        assert_eq!(decode_string_slot(&[0u8; 32]), "");
    }
}
