use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

/// 套接字写半边的类型别名：WebSocket 流 split 后的发送端。
pub type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// 代表一个已连接的仪表板 WebSocket 客户端会话
#[derive(Debug)]
pub struct ClientSession {
    /// 由服务端生成的唯一客户端标识
    pub client_id: Uuid,
    /// 客户端的 IP 地址和端口
    pub addr: SocketAddr,
    /// 握手时捕获的 User-Agent 请求头，用于重复连接判定
    pub user_agent: String,
    /// 出站消息队列发送端，消息是预先序列化好的 JSON 文本
    pub sender: mpsc::Sender<String>,
    /// 会话创建的时间戳
    pub creation_time: DateTime<Utc>,
    /// 最近一次成功投递快照的时间戳，用于单客户端限速
    pub last_sent: RwLock<DateTime<Utc>>,
    /// 最近一次收到 Pong 的时间戳，由读循环更新、心跳监视器检查
    pub last_pong: RwLock<DateTime<Utc>>,
    /// 客户端健康标志，被判定不健康后将在下一轮派发中被踢出
    pub healthy: AtomicBool,
    /// 出站队列连续满的次数，超过阈值判定为慢客户端
    pub slow_responses: AtomicU32,
    /// 会话关闭标志，写任务与读循环据此退出
    pub closed: AtomicBool,
    /// 套接字写半边，由写任务与心跳监视器共享；`None` 表示已交还/关闭
    pub writer: Mutex<Option<WsSink>>,
}

impl ClientSession {
    /// 创建一个新的 ClientSession 实例
    pub fn new(
        addr: SocketAddr,
        user_agent: String,
        sender: mpsc::Sender<String>,
        writer: Option<WsSink>,
    ) -> Self {
        let now = Utc::now();
        Self {
            client_id: Uuid::new_v4(),
            addr,
            user_agent,
            sender,
            creation_time: now,
            last_sent: RwLock::new(now),
            last_pong: RwLock::new(now),
            healthy: AtomicBool::new(true),
            slow_responses: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            writer: Mutex::new(writer),
        }
    }

    /// 标记会话为已关闭；返回是否由本次调用完成首次关闭（幂等）。
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// 会话是否已被标记关闭。
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 标记会话为不健康，等待派发循环踢出。
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// 会话当前是否健康。
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
