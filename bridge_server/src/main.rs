use anyhow::Context;
use log::{error, info, LevelFilter};
use std::sync::Arc;
use std::time::Duration;

use bridge_server::broadcast::{BroadcastDispatcher, Broadcaster};
use bridge_server::config;
use bridge_server::plc_link::PlcLinkRegistry;
use bridge_server::plc_server::PlcServer;
use bridge_server::stats::BroadcastStats;
use bridge_server::write_back::{self, WriteBackEngine};
use bridge_server::ws_server::connection_manager::ConnectionManager;
use bridge_server::ws_server::heartbeat_monitor::HeartbeatMonitor;
use bridge_server::ws_server::service::WsService;

#[tokio::main]
async fn main() {
    // 初始化日志记录器
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    // 初始化应用配置
    config::init_config();
    let app_config = config::get_config();
    info!(
        "[主程序] 应用配置已加载。PLC 接入: {}:{}，WebSocket: {}:{}",
        app_config.plc.host, app_config.plc.port, app_config.websocket.host, app_config.websocket.port
    );

    // 加载设备标签表（缺失时标注功能退化为空，不影响广播）
    let label_tables = Arc::new(config::load_label_tables(&app_config.label_table_path));

    // 创建共享状态：统计、客户端连接管理器、PLC 链路注册表
    let stats = Arc::new(BroadcastStats::new());
    let connection_manager = Arc::new(ConnectionManager::new());
    info!("[主程序] WebSocket 连接管理器 (ConnectionManager) 已创建。");
    let plc_registry = Arc::new(PlcLinkRegistry::new());
    info!("[主程序] PLC 链路注册表 (PlcLinkRegistry) 已创建。");

    // 创建广播引擎入口与派发循环
    let (broadcaster, broadcast_rx) = Broadcaster::new(
        app_config.broadcast.channel_capacity,
        app_config.broadcast.debounce_ms,
        Arc::clone(&stats),
    );
    let broadcaster = Arc::new(broadcaster);
    let dispatcher = BroadcastDispatcher::new(
        Arc::clone(&connection_manager),
        Arc::clone(&label_tables),
        Arc::clone(&stats),
        app_config.websocket.client_rate_limit_ms,
        app_config.websocket.slow_client_threshold,
    );
    tokio::spawn(async move {
        dispatcher.run(broadcast_rx).await;
        info!("[主程序] 警告：广播派发循环已意外结束。这可能表明存在问题。");
    });
    info!("[主程序] 广播派发循环已派生到后台异步执行。");

    // 创建写回引擎与派发循环
    let (write_back_engine, write_back_rx) =
        WriteBackEngine::new(app_config.write_back.channel_capacity);
    let write_back_engine = Arc::new(write_back_engine);
    {
        let registry = Arc::clone(&plc_registry);
        let write_timeout_seconds = app_config.write_back.write_timeout_seconds;
        tokio::spawn(async move {
            write_back::run_dispatch(write_back_rx, registry, write_timeout_seconds).await;
            info!("[主程序] 警告：写回派发循环已意外结束。这可能表明存在问题。");
        });
    }
    info!("[主程序] 写回派发循环已派生到后台异步执行。");

    // 创建并启动心跳监视器
    let heartbeat_monitor = HeartbeatMonitor::new(
        Arc::clone(&connection_manager),
        Duration::from_secs(app_config.websocket.ping_interval_seconds),
        Duration::from_secs(app_config.websocket.pong_timeout_seconds),
    );
    tokio::spawn(async move {
        info!("[主程序] 正在启动独立的心跳监视器 (HeartbeatMonitor) 异步任务...");
        heartbeat_monitor.run().await;
        info!("[主程序] 警告：心跳监视器 (HeartbeatMonitor) 任务已意外结束。这可能表明存在问题。");
    });

    // 启动 PLC TCP 接入服务
    let plc_server = PlcServer::new(
        app_config.plc.clone(),
        Arc::clone(&plc_registry),
        Arc::clone(&broadcaster),
    );
    tokio::spawn(async move {
        info!("[主程序] 正在启动 PLC TCP 接入服务...");
        if let Err(e) = plc_server.start().await {
            error!("[主程序] 致命错误：启动 PLC 接入服务时发生严重问题: {}", e);
        }
    });

    // 启动 WebSocket 服务（前台运行）
    let ws_service = Arc::new(WsService::new(
        app_config.websocket.clone(),
        Arc::clone(&connection_manager),
        Arc::clone(&write_back_engine),
        None,
    ));
    info!("[主程序] 正在启动 WebSocket 服务...");
    if let Err(e) = ws_service.start().await.context("WebSocket 服务启动失败") {
        error!("[主程序] 致命错误：启动 WebSocket 服务时发生严重问题: {:#}", e);
    }
}
