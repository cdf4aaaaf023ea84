// bridge_server/src/stats.rs

//! 广播统计与桥接状态快照。
//!
//! 统计计数器全部是原子量：广播派发循环在热路径上只做原子自增，
//! 状态快照由外部状态层按需读取，不加任何锁。

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Local;
use serde::{Deserialize, Serialize};

/// 广播引擎的累计计数器。
#[derive(Debug, Default)]
pub struct BroadcastStats {
    sent: AtomicI64,
    dropped: AtomicI64,
    errors: AtomicI64,
}

impl BroadcastStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功投递到客户端队列。
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次被丢弃的帧或消息（去抖、通道满、队列满）。
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次发送错误。
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> i64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> i64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> i64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// 桥接服务的瞬时状态，供外部状态层（HTTP 状态接口等）序列化输出。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BridgeStatus {
    /// 当前在线的仪表板客户端数
    pub websocket_clients: usize,
    /// 当前在线的 PLC 链路数
    pub plc_connections: usize,
    /// 累计成功投递数
    pub frames_sent: i64,
    /// 累计丢弃数
    pub frames_dropped: i64,
    /// 累计发送错误数
    pub send_errors: i64,
    /// 丢弃率（丢弃 / (投递 + 丢弃)），无流量时为 0
    pub drop_rate: f64,
    /// 快照生成时间
    pub timestamp: String,
}

impl BridgeStatus {
    /// 生成一份状态快照。
    pub fn snapshot(websocket_clients: usize, plc_connections: usize, stats: &BroadcastStats) -> Self {
        let sent = stats.sent();
        let dropped = stats.dropped();
        let total = sent + dropped;
        let drop_rate = if total > 0 { dropped as f64 / total as f64 } else { 0.0 };

        Self {
            websocket_clients,
            plc_connections,
            frames_sent: sent,
            frames_dropped: dropped,
            send_errors: stats.errors(),
            drop_rate,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }
}
