// bridge_server/src/plc_link.rs

//! PLC 链路注册表。

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// 代表一条已建立的 PLC TCP 链路。
///
/// 读半边由接入任务独占；写半边放在异步互斥锁后面，供写回引擎使用。
#[derive(Debug)]
pub struct PlcLink {
    /// PLC 的远端地址，同时是注册表的键
    pub addr: SocketAddr,
    /// 套接字写半边，写回引擎写 240 字节帧时加锁
    pub writer: Mutex<OwnedWriteHalf>,
    /// 链路建立时间戳
    pub connected_at: DateTime<Utc>,
}

impl PlcLink {
    pub fn new(addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            addr,
            writer: Mutex::new(writer),
            connected_at: Utc::now(),
        }
    }
}

/// 管理所有活动的 PLC 链路
///
/// Key: 远端 SocketAddr，Value: Arc<PlcLink>，使用 DashMap 实现线程安全。
#[derive(Debug, Default)]
pub struct PlcLinkRegistry {
    links: DashMap<SocketAddr, Arc<PlcLink>>,
}

impl PlcLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条新的 PLC 链路。
    pub fn add_link(&self, link: Arc<PlcLink>) {
        info!("[PLC链路] 新 PLC 链路已注册: addr={}", link.addr);
        self.links.insert(link.addr, link);
        debug!("[PLC链路] 当前活动 PLC 链路总数: {}", self.links.len());
    }

    /// 移除一条 PLC 链路；链路不存在时安全地什么也不做。
    pub fn remove_link(&self, addr: &SocketAddr) -> Option<Arc<PlcLink>> {
        match self.links.remove(addr) {
            Some((_addr, link)) => {
                let uptime = Utc::now().signed_duration_since(link.connected_at);
                info!(
                    "[PLC链路] PLC 链路已断开并移除: addr={}, 在线时长={}秒",
                    link.addr,
                    uptime.num_seconds()
                );
                debug!("[PLC链路] 移除后当前活动 PLC 链路总数: {}", self.links.len());
                Some(link)
            }
            None => {
                warn!("[PLC链路] 尝试移除不存在的 PLC 链路: addr={}", addr);
                None
            }
        }
    }

    /// 当前活动链路数量。
    pub fn count(&self) -> usize {
        self.links.len()
    }

    /// 取当前所有链路的快照，供写回引擎遍历。
    pub fn links(&self) -> Vec<Arc<PlcLink>> {
        self.links.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    /// 测试链路注册表的增删生命周期，以及重复移除的安全性。
    async fn test_add_remove_link_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定随机端口");
        let addr = listener.local_addr().expect("无法获取监听地址");
        let client = TcpStream::connect(addr).await.expect("连接测试监听器失败");
        let _accepted = listener.accept().await.expect("接受测试连接失败");

        let link_addr = client.local_addr().expect("无法获取链路地址");
        let (_reader, writer) = client.into_split();

        let registry = PlcLinkRegistry::new();
        registry.add_link(Arc::new(PlcLink::new(link_addr, writer)));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.links()[0].addr, link_addr);

        let removed = registry.remove_link(&link_addr).expect("首次移除应返回链路");
        assert!(removed.connected_at <= Utc::now());
        assert_eq!(registry.count(), 0);
        assert!(registry.remove_link(&link_addr).is_none(), "二次移除应安全返回 None");
    }
}
