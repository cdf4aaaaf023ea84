// bridge_server/src/ws_server/heartbeat_monitor.rs

//! 客户端心跳监视器。
//!
//! 独立任务，按固定间隔向所有在线客户端发送 WebSocket Ping，
//! 并检查 Pong 响应是否超时。Pong 时间戳由各连接的读循环更新。
//! Ping 写失败或 Pong 超时的客户端被标记为不健康并立即移除。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::SinkExt;
use log::{debug, info, warn};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::ws_server::connection_manager::ConnectionManager;

/// 向单个客户端写 Ping 帧的超时时间。
const PING_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// 心跳监视器结构体。
pub struct HeartbeatMonitor {
    connection_manager: Arc<ConnectionManager>,
    /// Ping 发送间隔
    ping_interval: Duration,
    /// Pong 响应超时时间，移动端网络较差时需要放宽
    pong_timeout: chrono::Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        ping_interval: Duration,
        pong_timeout: Duration,
    ) -> Self {
        info!(
            "[心跳监视器] 实例已创建。Ping 间隔: {:?}, Pong 超时: {:?}",
            ping_interval, pong_timeout
        );
        Self {
            connection_manager,
            ping_interval,
            pong_timeout: chrono::Duration::from_std(pong_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(600)),
        }
    }

    /// 心跳循环主体，应在独立的异步任务中运行，正常情况下永不返回。
    pub async fn run(&self) {
        info!("[心跳监视器] 心跳循环已启动。");
        loop {
            tokio::time::sleep(self.ping_interval).await;
            self.sweep().await;
        }
    }

    /// 对所有在线客户端做一轮心跳检查。
    async fn sweep(&self) {
        let sessions = self.connection_manager.clients_snapshot();
        debug!("[心跳监视器] 开始新一轮心跳检查，客户端数: {}", sessions.len());

        for session in sessions {
            if session.is_closed() {
                continue;
            }

            // 先检查 Pong 是否超时。
            let last_pong = *session.last_pong.read().await;
            if Utc::now().signed_duration_since(last_pong) > self.pong_timeout {
                warn!(
                    "[心跳监视器] 客户端 {} 的 Pong 响应已超时 (最后一次: {})，将被移除。",
                    session.client_id, last_pong
                );
                session.mark_unhealthy();
                self.connection_manager.remove_client(&session.client_id).await;
                continue;
            }

            // 再发送 Ping；写半边与写任务共享同一把互斥锁。
            let mut writer = session.writer.lock().await;
            let Some(sink) = writer.as_mut() else {
                continue;
            };
            match timeout(PING_WRITE_TIMEOUT, sink.send(Message::Ping(Vec::new()))).await {
                Ok(Ok(())) => {
                    debug!("[心跳监视器] 已向客户端 {} 发送 Ping。", session.client_id);
                }
                Ok(Err(e)) => {
                    warn!(
                        "[心跳监视器] 向客户端 {} 发送 Ping 失败: {}。将被移除。",
                        session.client_id, e
                    );
                    drop(writer);
                    session.mark_unhealthy();
                    self.connection_manager.remove_client(&session.client_id).await;
                }
                Err(_) => {
                    warn!(
                        "[心跳监视器] 向客户端 {} 发送 Ping 超过 {:?} 未完成。将被移除。",
                        session.client_id, PING_WRITE_TIMEOUT
                    );
                    drop(writer);
                    session.mark_unhealthy();
                    self.connection_manager.remove_client(&session.client_id).await;
                }
            }
        }
    }
}
