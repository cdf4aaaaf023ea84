use thiserror::Error;

/// 应用的主要错误类型
///
/// 这个枚举定义了桥接服务中可能出现的各种错误类型。
/// 连接级别的失败（单个 PLC 链路或单个仪表板客户端出错）不会用它向上传播，
/// 只会记日志并清理对应连接；它只用于启动阶段和服务级别的失败。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("PLC 接入服务错误: {0}")]
    PlcServer(String),

    #[error("WebSocket 服务错误: {0}")]
    WebSocketService(String),
}
