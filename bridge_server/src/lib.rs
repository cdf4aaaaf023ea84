//! `bridge_server` 桥接服务核心库。
//!
//! 本 Crate 实现 PLC 遥测桥的服务端：通过原始 TCP 接入 PLC 数据上报，
//! 解码后经广播引擎扇出到所有 WebSocket 仪表板客户端，并把仪表板下发的
//! 写命令编码后回写给 PLC。
//!
//! 主要模块包括：
//! - `config`: 管理应用的配置信息加载与访问，以及设备标签表加载。
//! - `error`: 定义应用特定的错误类型。
//! - `plc_link`: PLC 链路模型与注册表。
//! - `plc_server`: PLC TCP 接入服务，读取并解码 PLC 上报的原始帧。
//! - `broadcast`: 遥测帧广播引擎（去抖、限速、慢客户端踢出）。
//! - `write_back`: 写回引擎，把写命令编码后写给所有在线 PLC。
//! - `stats`: 广播统计计数器与桥接状态快照。
//! - `ws_server`: 实现 WebSocket 服务端，处理客户端连接、消息路由和心跳。

pub mod broadcast;
pub mod config;
pub mod error;
pub mod plc_link;
pub mod plc_server;
pub mod stats;
pub mod write_back;
pub mod ws_server;
