// bridge_server/src/ws_server/message_router.rs

//! 客户端入站消息路由。
//!
//! 仪表板客户端唯一的入站业务消息是 JSON 写命令。
//! 格式非法的消息记警告后忽略，永远不会导致连接被断开。

use std::sync::Arc;

use log::{debug, warn};

use plc_models::write_command::WriteCommand;

use crate::write_back::WriteBackEngine;
use crate::ws_server::client_session::ClientSession;

/// 处理一条来自客户端的文本消息。
pub fn handle_text(session: &Arc<ClientSession>, text: &str, write_back: &WriteBackEngine) {
    match serde_json::from_str::<WriteCommand>(text) {
        Ok(cmd) => {
            if cmd.is_empty() {
                debug!(
                    "[消息路由] 客户端 {} 发来空写命令，已忽略。",
                    session.client_id
                );
                return;
            }
            debug!(
                "[消息路由] 客户端 {} 提交写命令: words={}, ints={}, reals={}, strings={}",
                session.client_id,
                cmd.words.len(),
                cmd.ints.len(),
                cmd.reals.len(),
                cmd.strings.len()
            );
            write_back.submit(cmd);
        }
        Err(e) => {
            warn!(
                "[消息路由] 客户端 {} 发来无法解析的消息 ({})，已忽略: {:?}",
                session.client_id,
                e,
                text.chars().take(120).collect::<String>()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_session() -> Arc<ClientSession> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ClientSession::new(
            "10.0.0.1:5001".parse().unwrap(),
            "UA".to_string(),
            tx,
            None,
        ))
    }

    #[tokio::test]
    /// 测试合法写命令被提交到写回引擎。
    async fn test_valid_write_command_submitted() {
        let (engine, mut rx) = WriteBackEngine::new(8);
        let session = test_session();

        handle_text(&session, r#"{"words":[{"index":0,"value":7}]}"#, &engine);

        let cmd = rx.try_recv().expect("写命令应已进入通道");
        assert_eq!(cmd.words.len(), 1);
        assert_eq!(cmd.words[0].index, 0);
    }

    #[tokio::test]
    /// 测试非法 JSON 与空命令被忽略，不会进入写回通道。
    async fn test_malformed_and_empty_messages_ignored() {
        let (engine, mut rx) = WriteBackEngine::new(8);
        let session = test_session();

        handle_text(&session, "not json at all", &engine);
        handle_text(&session, r#"{"words": "oops"}"#, &engine);
        handle_text(&session, "{}", &engine);

        assert!(rx.try_recv().is_err(), "非法或空消息不应产生写命令");
    }
}
