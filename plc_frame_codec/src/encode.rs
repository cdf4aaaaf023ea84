// plc_frame_codec/src/encode.rs

//! PLC 写回帧编码。
//!
//! 写回帧是固定 240 字节的大端布局：
//!
//! | 区段     | 偏移 | 长度 | 内容                    |
//! |----------|------|------|-------------------------|
//! | Words    | 0    | 6    | 3 x u16                 |
//! | Ints     | 6    | 22   | 11 x i16                |
//! | Reals    | 28   | 44   | 11 x f32                |
//! | Strings  | 72   | 160  | 5 x 32 字节字符串槽位   |
//! | Counters | 232  | 8    | 4 x u16 实际写入计数    |
//!
//! 写命令是稀疏的：只有下标合法且值类型匹配的条目会被写入对应槽位，
//! 其余条目记一条警告日志后跳过；未出现的槽位编码为零/空字符串。

use log::warn;

use plc_models::write_command::{
    WriteCommand, WriteValue, WRITE_FRAME_LEN, WRITE_INT_SLOTS, WRITE_REAL_SLOTS,
    WRITE_STRING_SLOTS, WRITE_WORD_SLOTS,
};

const WORDS_OFFSET: usize = 0;
const INTS_OFFSET: usize = WORDS_OFFSET + WRITE_WORD_SLOTS * 2;
const REALS_OFFSET: usize = INTS_OFFSET + WRITE_INT_SLOTS * 2;
const STRINGS_OFFSET: usize = REALS_OFFSET + WRITE_REAL_SLOTS * 4;
const COUNTS_OFFSET: usize = STRINGS_OFFSET + WRITE_STRING_SLOTS * 32;

/// 将写命令编码为固定 240 字节的写回帧。
///
/// # 参数
/// * `cmd` - 仪表板下发并通过 JSON 反序列化得到的写命令。
///
/// # 返回
/// 恒为 [`WRITE_FRAME_LEN`] 字节的帧；尾部四个计数器记录各类
/// 实际写入的条目数量。
pub fn encode_write_command(cmd: &WriteCommand) -> Vec<u8> {
    let mut data = vec![0u8; WRITE_FRAME_LEN];

    let (words, word_count) =
        collect_numeric(&cmd.words, WRITE_WORD_SLOTS, "Word", |v| v as u16);
    let (ints, int_count) =
        collect_numeric(&cmd.ints, WRITE_INT_SLOTS, "Int", |v| v as i16);
    let (reals, real_count) =
        collect_numeric(&cmd.reals, WRITE_REAL_SLOTS, "Real", |v| v as f32);
    let (strings, string_count) = collect_strings(&cmd.strings);

    for (i, word) in words.iter().enumerate() {
        data[WORDS_OFFSET + i * 2..WORDS_OFFSET + i * 2 + 2].copy_from_slice(&word.to_be_bytes());
    }
    for (i, int) in ints.iter().enumerate() {
        data[INTS_OFFSET + i * 2..INTS_OFFSET + i * 2 + 2].copy_from_slice(&int.to_be_bytes());
    }
    for (i, real) in reals.iter().enumerate() {
        data[REALS_OFFSET + i * 4..REALS_OFFSET + i * 4 + 4]
            .copy_from_slice(&real.to_bits().to_be_bytes());
    }
    for (i, string) in strings.iter().enumerate() {
        let offset = STRINGS_OFFSET + i * 32;
        encode_string_slot(&mut data[offset..offset + 32], string);
    }

    for (i, count) in [word_count, int_count, real_count, string_count].iter().enumerate() {
        data[COUNTS_OFFSET + i * 2..COUNTS_OFFSET + i * 2 + 2]
            .copy_from_slice(&(*count as u16).to_be_bytes());
    }

    data
}

/// 收集某一类数值条目：下标合法且值为 JSON 数字的条目才会写入槽位。
fn collect_numeric<T: Copy + Default>(
    entries: &[WriteValue],
    slots: usize,
    kind: &str,
    convert: impl Fn(f64) -> T,
) -> (Vec<T>, usize) {
    let mut values = vec![T::default(); slots];
    let mut applied = 0;
    for entry in entries {
        let index = entry.index;
        if index < 0 || index as usize >= slots {
            warn!("[帧编码] 跳过 {} 条目：下标 {} 越界 (0-{})", kind, index, slots - 1);
            continue;
        }
        match entry.value.as_f64() {
            Some(value) => {
                values[index as usize] = convert(value);
                applied += 1;
            }
            None => {
                warn!("[帧编码] 跳过 {} 条目 (下标 {}): 值不是数字: {}", kind, index, entry.value);
            }
        }
    }
    (values, applied)
}

/// 收集字符串条目：下标合法且值为 JSON 字符串的条目才会写入槽位。
fn collect_strings(entries: &[WriteValue]) -> (Vec<String>, usize) {
    let mut values = vec![String::new(); WRITE_STRING_SLOTS];
    let mut applied = 0;
    for entry in entries {
        let index = entry.index;
        if index < 0 || index as usize >= WRITE_STRING_SLOTS {
            warn!(
                "[帧编码] 跳过字符串条目：下标 {} 越界 (0-{})",
                index,
                WRITE_STRING_SLOTS - 1
            );
            continue;
        }
        match entry.value.as_str() {
            Some(value) => {
                values[index as usize] = value.to_string();
                applied += 1;
            }
            None => {
                warn!("[帧编码] 跳过字符串条目 (下标 {}): 值不是字符串: {}", index, entry.value);
            }
        }
    }
    (values, applied)
}

/// 按西门子 S7 STRING 格式编码单个 32 字节槽位：
/// 字节 0 恒为最大长度 30，字节 1 为实际长度，内容超过 30 字节时截断。
fn encode_string_slot(slot: &mut [u8], value: &str) {
    slot[0] = 30;
    let mut content = value.as_bytes();
    if content.len() > 30 {
        content = &content[..30];
    }
    slot[1] = content.len() as u8;
    slot[2..2 + content.len()].copy_from_slice(content);
}
