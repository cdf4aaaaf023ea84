// bridge_server/src/ws_server/connection_manager.rs

//! WebSocket 客户端连接管理。

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::ws_server::client_session::ClientSession;

/// 管理所有活动的仪表板客户端会话
///
/// Key: client_id (Uuid)，Value: Arc<ClientSession>，使用 DashMap 实现线程安全。
#[derive(Debug, Default)]
pub struct ConnectionManager {
    clients: DashMap<Uuid, Arc<ClientSession>>,
}

/// `add_client` 的受理结果。
#[derive(Debug, PartialEq, Eq)]
pub enum AdmitResult {
    /// 会话已注册
    Accepted,
    /// 同一远端 IP 的并发客户端数已达上限，连接被拒绝且未注册
    RejectedTooManyFromIp,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受理一个新的客户端会话。
    ///
    /// 先踢出完全重复的旧连接（相同远端 IP 且相同 User-Agent，视为同一
    /// 浏览器页签的重连残留），再检查该 IP 的并发上限；超限则拒绝，
    /// 连接由调用方关闭，不进入注册表。
    ///
    /// # 参数
    /// * `session` - 已完成握手的客户端会话。
    /// * `max_clients_per_ip` - 单个远端 IP 允许的最大并发客户端数。
    pub async fn add_client(
        &self,
        session: Arc<ClientSession>,
        max_clients_per_ip: usize,
    ) -> AdmitResult {
        let ip = session.addr.ip();

        // 踢出相同 IP + 相同 User-Agent 的旧会话。
        let duplicates: Vec<Uuid> = self
            .clients
            .iter()
            .filter(|entry| {
                entry.value().addr.ip() == ip && entry.value().user_agent == session.user_agent
            })
            .map(|entry| *entry.key())
            .collect();
        for old_id in duplicates {
            info!(
                "[连接管理] 检测到重复连接 (ip={}, user_agent={:?})，踢出旧会话: id={}",
                ip, session.user_agent, old_id
            );
            self.remove_client(&old_id).await;
        }

        if self.count_for_ip(&ip) >= max_clients_per_ip {
            warn!(
                "[连接管理] 已拒绝来自 {} 的新连接：该 IP 的并发客户端数已达上限 {}。",
                session.addr, max_clients_per_ip
            );
            return AdmitResult::RejectedTooManyFromIp;
        }

        info!(
            "[连接管理] 新客户端连接成功: id={}, addr={}, user_agent={:?}",
            session.client_id, session.addr, session.user_agent
        );
        self.clients.insert(session.client_id, session);
        debug!("[连接管理] 当前活动客户端总数: {}", self.clients.len());
        AdmitResult::Accepted
    }

    /// 根据 client_id 获取一个客户端会话的引用。
    pub fn get_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        self.clients.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 从管理器中移除一个客户端会话并标记关闭。
    ///
    /// 关闭标记是幂等的：重复移除同一会话是安全的，只有第一次生效。
    pub async fn remove_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        match self.clients.remove(client_id) {
            Some((_id, session)) => {
                session.mark_unhealthy();
                if session.mark_closed() {
                    let uptime = chrono::Utc::now().signed_duration_since(session.creation_time);
                    info!(
                        "[连接管理] 客户端断开连接: id={}, addr={}, 在线时长={}秒",
                        session.client_id,
                        session.addr,
                        uptime.num_seconds()
                    );
                }
                debug!("[连接管理] 移除后当前活动客户端总数: {}", self.clients.len());
                Some(session)
            }
            None => {
                debug!("[连接管理] 尝试移除不存在的客户端: id={}", client_id);
                None
            }
        }
    }

    /// 当前活动客户端数量。
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// 统计指定远端 IP 当前的活动客户端数量。
    pub fn count_for_ip(&self, ip: &IpAddr) -> usize {
        self.clients.iter().filter(|entry| entry.value().addr.ip() == *ip).count()
    }

    /// 取当前所有会话的快照，供派发循环与心跳监视器遍历。
    pub fn clients_snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.clients.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}
