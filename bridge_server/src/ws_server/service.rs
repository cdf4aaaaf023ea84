// bridge_server/src/ws_server/service.rs

//! WebSocket 服务端核心服务：握手受理、读循环与连接生命周期。

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::config::WebSocketConfig;
use crate::error::AppError;
use crate::write_back::WriteBackEngine;
use crate::ws_server::client_session::ClientSession;
use crate::ws_server::connection_manager::{AdmitResult, ConnectionManager};
use crate::ws_server::message_router;

/// 外部鉴权钩子：在握手阶段基于对端地址与请求头决定是否放行。
///
/// 桥接核心自身不解释任何凭据；返回 `false` 时握手被以 403 拒绝，
/// 不会产生任何会话状态。
pub type AccessGuard = Arc<dyn Fn(SocketAddr, &HeaderMap) -> bool + Send + Sync>;

/// WebSocket 服务结构体，封装了配置、连接管理器与写回引擎入口。
pub struct WsService {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    write_back: Arc<WriteBackEngine>,
    access_guard: Option<AccessGuard>,
}

impl WsService {
    /// 创建一个新的 WsService 实例。
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        write_back: Arc<WriteBackEngine>,
        access_guard: Option<AccessGuard>,
    ) -> Self {
        info!("[WS服务] WsService 实例已创建。");
        Self {
            config,
            connection_manager,
            write_back,
            access_guard,
        }
    }

    /// 启动 WebSocket 服务端。只有监听器绑定失败是致命错误。
    pub async fn start(self: Arc<Self>) -> Result<(), AppError> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AppError::WebSocketService(format!("绑定 {} 失败: {}", bind_addr, e)))?;
        info!("[WS服务] 正在监听仪表板客户端连接: {}", bind_addr);

        self.accept_loop(listener).await
    }

    /// 在一个已绑定的监听器上运行接受循环。
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) -> Result<(), AppError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("[WS服务] 收到新的 TCP 连接: {}", peer_addr);
                    let service = Arc::clone(&self);
                    tokio::spawn(async move {
                        service.handle_connection(stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    error!("[WS服务] 接受 TCP 连接失败: {}。服务将继续运行。", e);
                }
            }
        }
    }

    /// 处理单条客户端连接的完整生命周期：握手、受理、读循环、清理。
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        // 握手回调在另一个调用栈中执行，通过共享槽位带出 User-Agent。
        let captured_user_agent = Arc::new(StdMutex::new(String::from("unknown")));
        let user_agent_slot = Arc::clone(&captured_user_agent);
        let access_guard = self.access_guard.clone();

        let handshake_callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get("Origin")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("");
            if origin.trim().is_empty() {
                warn!("[WS服务] 已拒绝 {} 的握手：Origin 请求头缺失或为空。", peer_addr);
                return Err(forbidden_response("Origin 请求头缺失"));
            }

            if let Some(guard) = &access_guard {
                if !guard(peer_addr, req.headers()) {
                    warn!("[WS服务] 已拒绝 {} 的握手：外部鉴权钩子未放行。", peer_addr);
                    return Err(forbidden_response("鉴权失败"));
                }
            }

            if let Some(user_agent) = req
                .headers()
                .get("User-Agent")
                .and_then(|value| value.to_str().ok())
            {
                let mut slot = user_agent_slot.lock().unwrap_or_else(|e| e.into_inner());
                *slot = user_agent.to_string();
            }

            Ok(response)
        };

        let ws_stream = match accept_hdr_async(stream, handshake_callback).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                warn!("[WS服务] 与 {} 的 WebSocket 握手失败: {}", peer_addr, e);
                return;
            }
        };
        info!("[WS服务] 与 {} 的 WebSocket 握手成功。", peer_addr);

        let (ws_sink, mut ws_receiver) = ws_stream.split();
        let user_agent = captured_user_agent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let (tx_to_client, rx_from_engine) =
            mpsc::channel::<String>(self.config.client_queue_capacity);
        let session = Arc::new(ClientSession::new(
            peer_addr,
            user_agent,
            tx_to_client,
            Some(ws_sink),
        ));

        match self
            .connection_manager
            .add_client(Arc::clone(&session), self.config.max_clients_per_ip)
            .await
        {
            AdmitResult::Accepted => {}
            AdmitResult::RejectedTooManyFromIp => {
                // 被拒绝的连接不进入注册表，直接关闭套接字。
                let mut writer = session.writer.lock().await;
                if let Some(mut sink) = writer.take() {
                    let _ = sink.close().await;
                }
                return;
            }
        }

        // 写任务独立运行，与心跳监视器共享会话内的写互斥锁。
        let writer_session = Arc::clone(&session);
        let writer_manager = Arc::clone(&self.connection_manager);
        let write_timeout = Duration::from_secs(self.config.write_timeout_seconds);
        tokio::spawn(async move {
            writer_task(writer_session, rx_from_engine, write_timeout, writer_manager).await;
        });

        // 读循环：滚动读超时 + 入站洪泛防护。
        let read_timeout = Duration::from_secs(self.config.client_read_timeout_seconds);
        let flood_window = Duration::from_millis(self.config.flood_window_ms);
        let mut window_start = Instant::now();
        let mut window_count: u32 = 0;

        loop {
            if session.is_closed() {
                debug!("[WS服务] 客户端 {} 已标记关闭，读循环退出。", session.client_id);
                break;
            }

            match timeout(read_timeout, ws_receiver.next()).await {
                Err(_) => {
                    warn!(
                        "[WS服务] 客户端 {} 超过 {:?} 无任何入站数据，连接将被关闭。",
                        session.client_id, read_timeout
                    );
                    break;
                }
                Ok(None) => {
                    info!("[WS服务] 客户端 {} 的连接流已结束。", session.client_id);
                    break;
                }
                Ok(Some(Err(e))) => {
                    warn!("[WS服务] 读取客户端 {} 失败: {}。连接将被关闭。", session.client_id, e);
                    break;
                }
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => {
                        let now = Instant::now();
                        if now.duration_since(window_start) > flood_window {
                            window_start = now;
                            window_count = 0;
                        }
                        window_count += 1;
                        if window_count > self.config.flood_max_messages {
                            warn!(
                                "[WS服务] 客户端 {} 在 {:?} 内发送超过 {} 条消息，判定为洪泛，连接将被关闭。",
                                session.client_id, flood_window, self.config.flood_max_messages
                            );
                            break;
                        }
                        message_router::handle_text(&session, &text, &self.write_back);
                    }
                    Message::Pong(_) => {
                        *session.last_pong.write().await = Utc::now();
                        debug!("[WS服务] 收到客户端 {} 的 Pong。", session.client_id);
                    }
                    Message::Close(close_frame) => {
                        info!(
                            "[WS服务] 客户端 {} 主动关闭连接: {:?}",
                            session.client_id, close_frame
                        );
                        break;
                    }
                    // Ping 由协议层自动回应，二进制帧不属于协议约定，一律忽略。
                    _ => {}
                },
            }
        }

        self.connection_manager.remove_client(&session.client_id).await;
    }
}

/// 构造 403 握手拒绝响应。
fn forbidden_response(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

/// 单客户端写任务：排空出站队列，每条消息带超时写出。
///
/// 队列关闭、写失败或会话被标记关闭时结束，并负责关闭套接字写半边。
async fn writer_task(
    session: Arc<ClientSession>,
    mut rx: mpsc::Receiver<String>,
    write_timeout: Duration,
    connection_manager: Arc<ConnectionManager>,
) {
    loop {
        if session.is_closed() {
            debug!("[写任务 {}] 会话已标记关闭，写任务退出。", session.client_id);
            break;
        }

        tokio::select! {
            biased;
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                // 周期性醒来检查关闭标志，避免在空队列上无限等待。
                continue;
            }
            maybe_text = rx.recv() => {
                let Some(text) = maybe_text else {
                    debug!("[写任务 {}] 出站队列已关闭，写任务退出。", session.client_id);
                    break;
                };

                let mut writer = session.writer.lock().await;
                let Some(sink) = writer.as_mut() else {
                    break;
                };
                match timeout(write_timeout, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("[写任务 {}] 向客户端写消息失败: {}。连接视为已断开。", session.client_id, e);
                        session.mark_unhealthy();
                        break;
                    }
                    Err(_) => {
                        warn!(
                            "[写任务 {}] 向客户端写消息超过 {:?} 未完成。连接视为已断开。",
                            session.client_id, write_timeout
                        );
                        session.mark_unhealthy();
                        break;
                    }
                }
            }
        }
    }

    // 写任务是套接字写半边的最终归属者，退出时关闭它。
    let mut writer = session.writer.lock().await;
    if let Some(mut sink) = writer.take() {
        let _ = sink.close().await;
    }
    drop(writer);
    connection_manager.remove_client(&session.client_id).await;
}
