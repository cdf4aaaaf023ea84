//! `plc_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了 PLC 遥测桥各个 Rust 组件（`plc_frame_codec` 帧编解码库、
//! `bridge_server` 桥接服务）以及 Web 前端（通过 JSON 字段名对应）之间共享的
//! 核心数据结构。
//!
//! 主要包含以下类型的模型：
//! - **遥测帧 (`telemetry`)**: 从 PLC 接收并解码后的完整数据帧 `TelemetryFrame` 及其计数器。
//! - **位分类 (`bit_data`)**: 从 Word 数组派生出的三段式位视图 `BitClassification`。
//! - **写命令 (`write_command`)**: 仪表板下发给 PLC 的稀疏写命令 `WriteCommand`。
//! - **设备标签表 (`labels`)**: 外部加载的设备名称标签表及带值的标签视图。
//! - **WebSocket 消息负载 (`ws_payloads`)**: 广播给仪表板客户端的快照负载结构。
//!
//! 设计原则：
//! - **共享性**: 所有模型都旨在被多个其他 crate 共享使用。
//! - **序列化/反序列化**: 面向线上传输的模型必须派生 `serde::Serialize` /
//!   `serde::Deserialize`，以保证 JSON 字段名跨语言边界的一致性。
//! - **无 I/O**: 本 crate 只含数据结构与纯派生逻辑，不做任何网络或文件操作。

pub mod bit_data;
pub mod labels;
pub mod telemetry;
pub mod write_command;
pub mod ws_payloads;
