// bridge_server/tests/bridge_integration_test.rs

//! 桥接服务端到端集成测试：真实套接字上的 PLC 接入、WebSocket 扇出与写回。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{info, LevelFilter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use bridge_server::broadcast::{BroadcastDispatcher, Broadcaster};
use bridge_server::config::{PlcServerConfig, WebSocketConfig};
use bridge_server::plc_link::PlcLinkRegistry;
use bridge_server::plc_server::PlcServer;
use bridge_server::stats::BroadcastStats;
use bridge_server::write_back::{self, WriteBackEngine};
use bridge_server::ws_server::connection_manager::ConnectionManager;
use bridge_server::ws_server::service::WsService;
use plc_models::labels::LabelTables;

// 辅助函数：初始化日志，仅用于测试，避免多次初始化
fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Info).is_test(true).try_init();
}

/// 测试用的 WebSocket 配置：限速与去抖关闭，避免测试时序抖动。
fn test_ws_config() -> WebSocketConfig {
    WebSocketConfig {
        client_rate_limit_ms: 0,
        ..WebSocketConfig::default()
    }
}

/// 一套完整的桥接服务端实例，运行在两个随机端口上。
struct TestBridge {
    ws_addr: SocketAddr,
    plc_addr: SocketAddr,
    manager: Arc<ConnectionManager>,
    registry: Arc<PlcLinkRegistry>,
    broadcaster: Arc<Broadcaster>,
    stats: Arc<BroadcastStats>,
}

async fn start_test_bridge() -> TestBridge {
    let stats = Arc::new(BroadcastStats::new());
    let manager = Arc::new(ConnectionManager::new());
    let registry = Arc::new(PlcLinkRegistry::new());

    let (broadcaster, broadcast_rx) = Broadcaster::new(64, 0, Arc::clone(&stats));
    let broadcaster = Arc::new(broadcaster);
    let dispatcher = BroadcastDispatcher::new(
        Arc::clone(&manager),
        Arc::new(LabelTables::default()),
        Arc::clone(&stats),
        0,
        100,
    );
    tokio::spawn(dispatcher.run(broadcast_rx));

    let (write_back_engine, write_back_rx) = WriteBackEngine::new(64);
    let write_back_engine = Arc::new(write_back_engine);
    tokio::spawn(write_back::run_dispatch(write_back_rx, Arc::clone(&registry), 5));

    // WebSocket 服务：绑定随机端口后在后台运行接受循环。
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定 WS 随机端口");
    let ws_addr = ws_listener.local_addr().expect("无法获取 WS 监听地址");
    let ws_service = Arc::new(WsService::new(
        test_ws_config(),
        Arc::clone(&manager),
        Arc::clone(&write_back_engine),
        None,
    ));
    tokio::spawn(async move {
        let _ = ws_service.accept_loop(ws_listener).await;
    });

    // PLC 接入服务：同样绑定随机端口。
    let plc_listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定 PLC 随机端口");
    let plc_addr = plc_listener.local_addr().expect("无法获取 PLC 监听地址");
    let plc_server = PlcServer::new(
        PlcServerConfig {
            read_deadline_seconds: 5,
            ..PlcServerConfig::default()
        },
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
    );
    tokio::spawn(async move {
        let _ = plc_server.accept_loop(plc_listener).await;
    });

    TestBridge {
        ws_addr,
        plc_addr,
        manager,
        registry,
        broadcaster,
        stats,
    }
}

/// 以带 Origin 请求头的合法客户端身份连接 WebSocket 服务。
async fn connect_dashboard_client(
    ws_addr: SocketAddr,
    user_agent: &str,
) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let mut request = format!("ws://{}", ws_addr)
        .into_client_request()
        .expect("无法构造客户端握手请求");
    request
        .headers_mut()
        .insert("Origin", "http://localhost".parse().expect("Origin 头非法"));
    request
        .headers_mut()
        .insert("User-Agent", user_agent.parse().expect("User-Agent 头非法"));

    let (ws_stream, response) = connect_async(request).await.expect("客户端连接失败");
    info!("[测试] 客户端连接成功，服务器响应状态: {}", response.status());
    ws_stream
}

/// 构造一条 words[0] = 0x1234、reals[0] = 1.5 的标称长度 PLC 上报帧。
fn sample_plc_frame() -> Vec<u8> {
    let mut data = vec![0u8; 888];
    data[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
    data[292..296].copy_from_slice(&1.5f32.to_be_bytes());
    data[880..882].copy_from_slice(&65u16.to_be_bytes());
    data
}

/// 等待条件成立，超时则 panic。
async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("等待超时: {}", what);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_bridge_plc_to_dashboard_and_back() {
    init_test_logger();
    let bridge = start_test_bridge().await;

    // 1. 仪表板客户端上线。
    let mut client = connect_dashboard_client(bridge.ws_addr, "IntegrationClient/1.0").await;
    wait_until("客户端注册", || bridge.manager.client_count() == 1).await;

    // 2. PLC 上线并上报一帧。
    let mut plc = TcpStream::connect(bridge.plc_addr).await.expect("PLC 连接失败");
    wait_until("PLC 链路注册", || bridge.registry.count() == 1).await;
    plc.write_all(&sample_plc_frame()).await.expect("PLC 上报失败");

    // 3. 客户端应收到包含该帧数据的快照。
    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("等待快照超时")
        .expect("连接不应关闭")
        .expect("读取快照失败");
    let Message::Text(text) = message else {
        panic!("快照应是文本帧，实际: {:?}", message);
    };
    let snapshot: serde_json::Value = serde_json::from_str(&text).expect("快照 JSON 非法");
    assert_eq!(snapshot["words"][0], 0x1234, "快照中的 words[0] 不正确");
    assert_eq!(snapshot["reals"][0], 1.5, "快照中的 reals[0] 不正确");
    assert_eq!(snapshot["counts"]["word_count"], 65);
    assert_eq!(snapshot["bytes_size"], 888);
    assert_eq!(
        snapshot["bit_data"]["status_bits"][0][2], true,
        "0x1234 的位 2 应为真"
    );
    assert!(snapshot.get("labeled").is_none(), "空标签表不应携带标注视图");
    assert!(bridge.stats.sent() >= 1, "发送统计应至少为 1");

    // 4. 客户端下发写命令，PLC 应收到 240 字节写回帧。
    client
        .send(Message::Text(r#"{"words":[{"index":0,"value":4660}]}"#.to_string()))
        .await
        .expect("写命令发送失败");

    let mut write_frame = vec![0u8; 240];
    tokio::time::timeout(Duration::from_secs(5), plc.read_exact(&mut write_frame))
        .await
        .expect("等待写回帧超时")
        .expect("读取写回帧失败");
    assert_eq!(&write_frame[0..2], &0x1234u16.to_be_bytes(), "写回帧 words[0] 不正确");
    assert_eq!(&write_frame[232..234], &1u16.to_be_bytes(), "写回帧 word 计数器应为 1");
    assert_eq!(&write_frame[234..236], &0u16.to_be_bytes(), "写回帧 int 计数器应为 0");
    // 空字符串槽位仍带最大长度前缀。
    assert_eq!(write_frame[72], 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_without_origin_is_rejected() {
    init_test_logger();
    let bridge = start_test_bridge().await;

    // tungstenite 客户端默认不携带 Origin 请求头。
    let result = connect_async(format!("ws://{}", bridge.ws_addr)).await;
    assert!(result.is_err(), "缺失 Origin 的握手应被拒绝");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.manager.client_count(), 0, "被拒绝的握手不应产生会话");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sixth_client_from_same_ip_is_disconnected() {
    init_test_logger();
    let bridge = start_test_bridge().await;

    // 同一 IP (127.0.0.1) 上先建立 5 个不同 User-Agent 的客户端。
    let mut clients = Vec::new();
    for i in 0..5 {
        let client = connect_dashboard_client(bridge.ws_addr, &format!("Client/{}", i)).await;
        clients.push(client);
    }
    wait_until("5 个客户端注册", || bridge.manager.client_count() == 5).await;

    // 第 6 个连接握手会成功，但受理阶段被拒绝并立即关闭。
    let mut sixth = connect_dashboard_client(bridge.ws_addr, "Client/6").await;
    let outcome = tokio::time::timeout(Duration::from_secs(5), sixth.next()).await;
    match outcome {
        Ok(None) | Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) => {}
        other => panic!("第 6 个客户端应被服务端关闭，实际: {:?}", other),
    }
    assert_eq!(bridge.manager.client_count(), 5, "第 6 个客户端不应进入注册表");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_flood_disconnects_client() {
    init_test_logger();
    let bridge = start_test_bridge().await;

    let mut client = connect_dashboard_client(bridge.ws_addr, "FloodSender/1.0").await;
    wait_until("客户端注册", || bridge.manager.client_count() == 1).await;

    // 在同一个 100 毫秒窗口内连发 11 条消息，超过默认上限 10 条。
    for i in 0..11 {
        let send_result = client
            .send(Message::Text(format!(r#"{{"words":[{{"index":0,"value":{}}}]}}"#, i)))
            .await;
        if send_result.is_err() {
            // 服务端可能在第 11 条之前已经断开。
            break;
        }
    }

    // 服务端应主动断开该连接。
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "消息洪泛的客户端应被服务端关闭");
    wait_until("洪泛客户端被移除", || bridge.manager.client_count() == 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_write_command_does_not_disconnect() {
    init_test_logger();
    let bridge = start_test_bridge().await;

    let mut client = connect_dashboard_client(bridge.ws_addr, "MalformedSender/1.0").await;
    wait_until("客户端注册", || bridge.manager.client_count() == 1).await;

    client
        .send(Message::Text("this is not json".to_string()))
        .await
        .expect("发送非法消息失败");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bridge.manager.client_count(), 1, "非法消息不应导致连接被断开");

    // 连接仍然可用：随后的广播仍应到达。
    bridge
        .broadcaster
        .broadcast(plc_frame_codec::decode_frame(&sample_plc_frame()));
    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("等待快照超时")
        .expect("连接不应关闭")
        .expect("读取快照失败");
    assert!(matches!(message, Message::Text(_)), "应收到文本快照");
}
