// bridge_server/src/broadcast.rs

//! 遥测帧广播引擎。
//!
//! 入口 (`Broadcaster`) 运行在 PLC 接入路径上，必须永不阻塞：
//! 全局去抖 + 有界通道上的 `try_send`，装不下就丢帧并计数。
//! 出口 (`BroadcastDispatcher`) 是唯一的派发任务：每帧构建一次快照负载、
//! 序列化一次，再按客户端逐个限速投递，慢客户端与不健康客户端在
//! 本轮结束后被踢出。通过通道的帧保持到达顺序，被丢弃的帧只是缺席，
//! 不会乱序。

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use plc_models::labels::LabelTables;
use plc_models::telemetry::TelemetryFrame;
use plc_models::ws_payloads::TelemetrySnapshotPayload;

use crate::stats::BroadcastStats;
use crate::ws_server::connection_manager::ConnectionManager;

/// 广播入口：全局去抖 + 非阻塞投递到有界广播通道。
pub struct Broadcaster {
    tx: mpsc::Sender<TelemetryFrame>,
    debounce: Duration,
    last_accepted: StdMutex<Option<Instant>>,
    stats: Arc<BroadcastStats>,
}

impl Broadcaster {
    /// 创建广播入口及配套的接收端（由派发循环消费）。
    pub fn new(
        channel_capacity: usize,
        debounce_ms: u64,
        stats: Arc<BroadcastStats>,
    ) -> (Self, mpsc::Receiver<TelemetryFrame>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let broadcaster = Self {
            tx,
            debounce: Duration::from_millis(debounce_ms),
            last_accepted: StdMutex::new(None),
            stats,
        };
        (broadcaster, rx)
    }

    /// 接收一帧解码后的遥测数据。永不阻塞：
    /// 距上一条被接受的帧不足去抖间隔、或广播通道已满时，丢帧并计数。
    pub fn broadcast(&self, frame: TelemetryFrame) {
        {
            let mut last = self.last_accepted.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(instant) = *last {
                if instant.elapsed() < self.debounce {
                    self.stats.record_dropped();
                    debug!("[广播引擎] 帧到达过快，被去抖丢弃 (间隔 < {:?})。", self.debounce);
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        if let Err(e) = self.tx.try_send(frame) {
            self.stats.record_dropped();
            match e {
                TrySendError::Full(_) => {
                    warn!("[广播引擎] 广播通道已满，丢弃一帧。派发循环可能跟不上上报速率。");
                }
                TrySendError::Closed(_) => {
                    warn!("[广播引擎] 广播通道已关闭，丢弃一帧。派发循环可能已退出。");
                }
            }
        }
    }
}

/// 广播出口：唯一的派发任务，把帧扇出到所有仪表板客户端。
pub struct BroadcastDispatcher {
    manager: Arc<ConnectionManager>,
    tables: Arc<LabelTables>,
    stats: Arc<BroadcastStats>,
    rate_limit: chrono::Duration,
    slow_threshold: u32,
}

impl BroadcastDispatcher {
    pub fn new(
        manager: Arc<ConnectionManager>,
        tables: Arc<LabelTables>,
        stats: Arc<BroadcastStats>,
        client_rate_limit_ms: u64,
        slow_client_threshold: u32,
    ) -> Self {
        Self {
            manager,
            tables,
            stats,
            rate_limit: chrono::Duration::milliseconds(client_rate_limit_ms as i64),
            slow_threshold: slow_client_threshold,
        }
    }

    /// 派发循环主体。通道关闭（所有入口被丢弃）时结束。
    pub async fn run(self, mut rx: mpsc::Receiver<TelemetryFrame>) {
        info!("[广播引擎] 派发循环已启动。");
        while let Some(frame) = rx.recv().await {
            self.dispatch_frame(&frame).await;
        }
        info!("[广播引擎] 广播通道已关闭，派发循环结束。");
    }

    /// 把单帧扇出到所有客户端：负载构建与序列化只做一次。
    async fn dispatch_frame(&self, frame: &TelemetryFrame) {
        let payload = TelemetrySnapshotPayload::build(frame, &self.tables);
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                error!("[广播引擎] 序列化快照负载失败: {}。本帧被跳过。", e);
                self.stats.record_error();
                return;
            }
        };

        let mut evict: Vec<Uuid> = Vec::new();
        let now = Utc::now();

        for session in self.manager.clients_snapshot() {
            if !session.is_healthy() {
                evict.push(session.client_id);
                continue;
            }

            // 单客户端限速：间隔不足时跳过本帧（不是丢弃整帧，只是这个客户端不发）。
            let last_sent = *session.last_sent.read().await;
            if now.signed_duration_since(last_sent) < self.rate_limit {
                continue;
            }

            match session.sender.try_send(json.clone()) {
                Ok(()) => {
                    self.stats.record_sent();
                    session.slow_responses.store(0, std::sync::atomic::Ordering::Relaxed);
                    *session.last_sent.write().await = now;
                }
                Err(TrySendError::Full(_)) => {
                    self.stats.record_dropped();
                    let slow = session
                        .slow_responses
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                        + 1;
                    if slow >= self.slow_threshold {
                        warn!(
                            "[广播引擎] 客户端 {} 队列连续满 {} 次，判定为慢客户端，将被踢出。",
                            session.client_id, slow
                        );
                        session.mark_unhealthy();
                        evict.push(session.client_id);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    self.stats.record_error();
                    evict.push(session.client_id);
                }
            }
        }

        for client_id in evict {
            self.manager.remove_client(&client_id).await;
        }
    }
}
