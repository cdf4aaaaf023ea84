// bridge_server/src/write_back.rs

//! 写回引擎：把仪表板下发的写命令编码后写给所有在线 PLC。
//!
//! 提交端 (`submit`) 是即发即弃的：有界通道上的 `try_send`，
//! 满了就丢弃并记警告，绝不阻塞 WebSocket 读循环。
//! 派发循环对每条命令只编码一次，逐条链路带超时写出；
//! 写失败只关闭并移除出错的链路，其余链路不受影响。

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use plc_frame_codec::encode_write_command;
use plc_models::write_command::WriteCommand;

use crate::plc_link::PlcLinkRegistry;

/// 写回引擎的提交端。
pub struct WriteBackEngine {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriteBackEngine {
    /// 创建写回引擎及配套的接收端（由派发循环消费）。
    pub fn new(channel_capacity: usize) -> (Self, mpsc::Receiver<WriteCommand>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        (Self { tx }, rx)
    }

    /// 提交一条写命令。即发即弃：通道满或已关闭时丢弃并记警告。
    pub fn submit(&self, cmd: WriteCommand) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("[写回引擎] 写命令通道已满，本条命令被丢弃。");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("[写回引擎] 写命令通道已关闭，本条命令被丢弃。派发循环可能已退出。");
            }
        }
    }
}

/// 写回派发循环。通道关闭时结束。
pub async fn run_dispatch(
    mut rx: mpsc::Receiver<WriteCommand>,
    registry: Arc<PlcLinkRegistry>,
    write_timeout_seconds: u64,
) {
    let write_timeout = Duration::from_secs(write_timeout_seconds);
    info!("[写回引擎] 派发循环已启动。");

    while let Some(cmd) = rx.recv().await {
        if registry.count() == 0 {
            warn!("[写回引擎] 当前没有在线的 PLC 链路，写命令被丢弃。");
            continue;
        }

        // 每条命令只编码一次，所有链路共用同一份帧。
        let data = encode_write_command(&cmd);

        for link in registry.links() {
            let mut writer = link.writer.lock().await;
            match timeout(write_timeout, writer.write_all(&data)).await {
                Ok(Ok(())) => {
                    debug!("[写回引擎] 已向 PLC {} 写入 {} 字节。", link.addr, data.len());
                }
                Ok(Err(e)) => {
                    warn!("[写回引擎] 向 PLC {} 写入失败: {}。链路将被移除。", link.addr, e);
                    drop(writer);
                    registry.remove_link(&link.addr);
                }
                Err(_) => {
                    warn!(
                        "[写回引擎] 向 PLC {} 写入超过 {:?} 未完成。链路将被移除。",
                        link.addr, write_timeout
                    );
                    drop(writer);
                    registry.remove_link(&link.addr);
                }
            }
        }
    }
    info!("[写回引擎] 写命令通道已关闭，派发循环结束。");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use plc_models::write_command::WriteValue;

    fn cmd() -> WriteCommand {
        WriteCommand {
            words: vec![WriteValue { index: 0, value: json!(1) }],
            ..Default::default()
        }
    }

    #[tokio::test]
    /// 测试提交端永不阻塞：超出通道容量的命令被丢弃。
    async fn test_submit_drops_when_channel_full() {
        let (engine, mut rx) = WriteBackEngine::new(2);
        for _ in 0..5 {
            engine.submit(cmd());
        }

        let mut retained = 0;
        while rx.try_recv().is_ok() {
            retained += 1;
        }
        assert_eq!(retained, 2, "通道应恰好保留容量条命令");
    }

    #[tokio::test]
    /// 测试没有在线 PLC 链路时派发循环只丢弃命令，不会卡住或 panic。
    async fn test_dispatch_without_links_discards_commands() {
        let registry = Arc::new(PlcLinkRegistry::new());
        let (engine, rx) = WriteBackEngine::new(8);

        let dispatch = tokio::spawn(run_dispatch(rx, Arc::clone(&registry), 1));
        engine.submit(cmd());
        engine.submit(cmd());
        drop(engine);

        // 通道所有发送端释放后派发循环应自行结束。
        tokio::time::timeout(Duration::from_secs(2), dispatch)
            .await
            .expect("派发循环应在通道关闭后结束")
            .expect("派发任务不应 panic");
    }
}
