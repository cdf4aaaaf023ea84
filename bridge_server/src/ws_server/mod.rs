//! WebSocket 服务端模块，处理仪表板客户端的连接受理、消息路由与健康监测。

pub mod client_session;
pub mod connection_manager;
pub mod heartbeat_monitor;
pub mod message_router;
pub mod service;
