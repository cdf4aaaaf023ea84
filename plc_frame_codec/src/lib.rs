//! `plc_frame_codec` PLC 帧编解码库 crate。
//!
//! 本 crate 实现 PLC 遥测桥的二进制线上格式（大端字节序）：
//! - **解码 (`decode`)**: 把 PLC 上报的原始字节流解码为 [`plc_models::telemetry::TelemetryFrame`]。
//!   解码是全量防御式的：逐元素做边界检查，输入不足时对应槽位保持零值，
//!   任何长度的输入都不会导致失败或 panic。
//! - **编码 (`encode`)**: 把仪表板下发的 [`plc_models::write_command::WriteCommand`]
//!   编码为固定 240 字节的写回帧。
//!
//! 本 crate 不做任何网络或文件 I/O，由 `bridge_server` 在收发两端调用。

pub mod decode;
pub mod encode;

pub use decode::decode_frame;
pub use encode::encode_write_command;
