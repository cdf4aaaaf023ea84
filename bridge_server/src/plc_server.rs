// bridge_server/src/plc_server.rs

//! PLC TCP 接入服务。
//!
//! 接受 PLC 的原始 TCP 连接，按可选的来源 IP 白名单过滤，
//! 每条链路在独立任务中带滚动读超时地读取消息，逐条解码后交给广播引擎。
//! 单条链路的任何读失败只影响该链路本身。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use plc_frame_codec::decode_frame;

use crate::broadcast::Broadcaster;
use crate::config::PlcServerConfig;
use crate::error::AppError;
use crate::plc_link::{PlcLink, PlcLinkRegistry};

/// PLC 接入服务结构体，封装了配置、链路注册表与广播引擎入口。
pub struct PlcServer {
    config: PlcServerConfig,
    registry: Arc<PlcLinkRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl PlcServer {
    pub fn new(
        config: PlcServerConfig,
        registry: Arc<PlcLinkRegistry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        info!("[PLC接入] PlcServer 实例已创建。");
        Self {
            config,
            registry,
            broadcaster,
        }
    }

    /// 启动 PLC 接入服务并开始监听。只有监听器绑定失败是致命错误。
    pub async fn start(&self) -> Result<(), AppError> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AppError::PlcServer(format!("绑定 {} 失败: {}", bind_addr, e)))?;
        info!("[PLC接入] 正在监听 PLC 连接: {}", bind_addr);

        self.accept_loop(listener).await
    }

    /// 在一个已绑定的监听器上运行接受循环。
    pub async fn accept_loop(&self, listener: TcpListener) -> Result<(), AppError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    info!("[PLC接入] 收到新的 PLC TCP 连接: {}", peer_addr);

                    if !self.source_allowed(&peer_addr) {
                        warn!(
                            "[PLC接入] 已拒绝未授权来源的 PLC 连接: {} (允许: {:?})",
                            peer_addr, self.config.allowed_plc_ip
                        );
                        // 直接丢弃 stream 即关闭连接，不进入注册表。
                        continue;
                    }

                    self.spawn_link_task(stream, peer_addr);
                }
                Err(e) => {
                    error!("[PLC接入] 接受 TCP 连接失败: {}。服务将继续运行。", e);
                }
            }
        }
    }

    /// 判断来源地址是否通过白名单过滤。
    fn source_allowed(&self, peer_addr: &SocketAddr) -> bool {
        match &self.config.allowed_plc_ip {
            Some(allowed) => peer_addr.ip().to_string() == *allowed,
            None => true,
        }
    }

    /// 为一条已通过过滤的 PLC 连接派生独立的读任务。
    fn spawn_link_task(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let link = Arc::new(PlcLink::new(peer_addr, writer));
        self.registry.add_link(Arc::clone(&link));

        let registry = Arc::clone(&self.registry);
        let broadcaster = Arc::clone(&self.broadcaster);
        let read_deadline = Duration::from_secs(self.config.read_deadline_seconds);
        let buffer_size = self.config.read_buffer_size;

        tokio::spawn(async move {
            read_link_loop(reader, peer_addr, broadcaster, read_deadline, buffer_size).await;
            registry.remove_link(&peer_addr);
        });
    }
}

/// 单条 PLC 链路的读循环：滚动读超时，每次读到的字节作为一条消息解码并广播。
async fn read_link_loop(
    mut reader: OwnedReadHalf,
    peer_addr: SocketAddr,
    broadcaster: Arc<Broadcaster>,
    read_deadline: Duration,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        match timeout(read_deadline, reader.read(&mut buffer)).await {
            Ok(Ok(0)) => {
                info!("[PLC接入] PLC {} 已关闭连接 (EOF)。", peer_addr);
                break;
            }
            Ok(Ok(n)) => {
                debug!("[PLC接入] 从 {} 收到 {} 字节。", peer_addr, n);
                // 从复用缓冲区复制出本条消息的数据。
                let data = buffer[..n].to_vec();
                let frame = decode_frame(&data);
                broadcaster.broadcast(frame);
            }
            Ok(Err(e)) => {
                warn!("[PLC接入] 读取 PLC {} 失败: {}。链路将被关闭。", peer_addr, e);
                break;
            }
            Err(_) => {
                warn!(
                    "[PLC接入] PLC {} 超过 {:?} 未上报数据，链路将被关闭。",
                    peer_addr, read_deadline
                );
                break;
            }
        }
    }
}
