use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plc_models::labels::LabelTables;

/// PLC TCP 接入服务的默认监听端口
pub const DEFAULT_PLC_PORT: u16 = 8080;
/// WebSocket 服务的默认监听端口
pub const DEFAULT_WS_PORT: u16 = 8081;

/// PLC TCP 接入服务配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlcServerConfig {
    /// PLC 接入服务绑定的主机地址
    pub host: String,
    /// PLC 接入服务监听的端口号
    pub port: u16,
    /// 允许接入的 PLC 源 IP；为 None 时不做来源过滤
    pub allowed_plc_ip: Option<String>,
    /// 单次读取的滚动超时时间（单位：秒）
    pub read_deadline_seconds: u64,
    /// 读缓冲区大小（单位：字节）
    pub read_buffer_size: usize,
}

impl Default for PlcServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),       // 默认监听所有网络接口
            port: DEFAULT_PLC_PORT,            // 默认监听 8080 端口
            allowed_plc_ip: None,              // 默认不过滤来源 IP
            read_deadline_seconds: 120,        // 工业 PLC 上报间隔较长，读超时放宽到 120 秒
            read_buffer_size: 4096,            // 标称帧 888 字节，4096 足够容纳一条消息
        }
    }
}

/// WebSocket 服务端详细配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebSocketConfig {
    /// WebSocket 服务绑定的主机地址
    pub host: String,
    /// WebSocket 服务监听的端口号
    pub port: u16,
    /// 心跳 Ping 的发送间隔（单位：秒）
    pub ping_interval_seconds: u64,
    /// 客户端 Pong 响应超时时间（单位：秒），移动端网络较差，默认放宽
    pub pong_timeout_seconds: u64,
    /// 客户端读超时时间（单位：秒）
    pub client_read_timeout_seconds: u64,
    /// 向客户端写消息的超时时间（单位：秒）
    pub write_timeout_seconds: u64,
    /// 单个远端 IP 允许的最大并发客户端数
    pub max_clients_per_ip: usize,
    /// 每个客户端的出站消息队列容量
    pub client_queue_capacity: usize,
    /// 单个客户端的最小推送间隔（单位：毫秒）
    pub client_rate_limit_ms: u64,
    /// 慢客户端判定阈值：出站队列连续满多少次后踢出
    pub slow_client_threshold: u32,
    /// 入站消息洪泛判定窗口（单位：毫秒）
    pub flood_window_ms: u64,
    /// 洪泛窗口内允许的最大入站消息数
    pub flood_max_messages: u32,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_WS_PORT,
            ping_interval_seconds: 30,
            pong_timeout_seconds: 600,
            client_read_timeout_seconds: 300,
            write_timeout_seconds: 60,
            max_clients_per_ip: 5,
            client_queue_capacity: 2000,
            client_rate_limit_ms: 10,
            slow_client_threshold: 100,
            flood_window_ms: 100,
            flood_max_messages: 10,
        }
    }
}

/// 广播引擎配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BroadcastConfig {
    /// 广播通道容量（单位：帧）
    pub channel_capacity: usize,
    /// 全局去抖间隔（单位：毫秒），间隔内到达的帧被丢弃
    pub debounce_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 5000,
            debounce_ms: 2,
        }
    }
}

/// 写回引擎配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WriteBackConfig {
    /// 写命令通道容量（单位：条）
    pub channel_capacity: usize,
    /// 向 PLC 写帧的超时时间（单位：秒）
    pub write_timeout_seconds: u64,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 500,
            write_timeout_seconds: 60,
        }
    }
}

/// 默认的设备标签表文件路径（随服务一起发布的示例表）。
pub const DEFAULT_LABEL_TABLE_PATH: &str = "resources/equipment_labels.json";

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// PLC TCP 接入服务的相关配置
    pub plc: PlcServerConfig,
    /// WebSocket 服务的相关配置
    pub websocket: WebSocketConfig,
    /// 广播引擎的相关配置
    pub broadcast: BroadcastConfig,
    /// 写回引擎的相关配置
    pub write_back: WriteBackConfig,
    /// 设备标签表 JSON 文件路径，相对于服务的工作目录；
    /// 置空可关闭标注功能，文件缺失时标注自动退化为空表
    pub label_table_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plc: PlcServerConfig::default(),
            websocket: WebSocketConfig::default(),
            broadcast: BroadcastConfig::default(),
            write_back: WriteBackConfig::default(),
            label_table_path: DEFAULT_LABEL_TABLE_PATH.to_string(),
        }
    }
}

// 全局静态应用配置实例
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 加载或创建应用配置文件
fn load_or_create_config() -> AppConfig {
    let config_file_path = get_config_file_path();

    match fs::read_to_string(&config_file_path) {
        Ok(content) => {
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                    config
                }
                Err(e) => {
                    warn!(
                        "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                        config_file_path, e
                    );
                    let default_config = AppConfig::default();
                    save_config(&default_config, &config_file_path);
                    default_config
                }
            }
        }
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = AppConfig::default();
            save_config(&default_config, &config_file_path);
            default_config
        }
    }
}

/// 获取配置文件路径
fn get_config_file_path() -> PathBuf {
    // 首先尝试当前目录
    let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_file_path = current_dir.join("app_settings.json");

    // 检查当前目录是否可写
    if Path::new(&config_file_path).exists() || fs::metadata(&current_dir).map(|m| m.permissions().readonly()).unwrap_or(true) == false {
        return config_file_path;
    }

    // 如果当前目录不可写，则尝试使用用户主目录
    if let Ok(home) = env::var("HOME") {
        let home_config = PathBuf::from(home).join(".config").join("bridge_server");
        if !home_config.exists() {
            let _ = fs::create_dir_all(&home_config);
        }
        return home_config.join("app_settings.json");
    } else if let Ok(userprofile) = env::var("USERPROFILE") {
        // Windows环境
        let home_config = PathBuf::from(userprofile).join("AppData").join("Local").join("bridge_server");
        if !home_config.exists() {
            let _ = fs::create_dir_all(&home_config);
        }
        return home_config.join("app_settings.json");
    }

    // 最后返回当前目录的配置文件路径，即使可能写入失败
    config_file_path
}

/// 保存配置到文件
fn save_config(config: &AppConfig, path: &PathBuf) {
    // 确保目录存在
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[配置模块] 错误：创建配置目录 {:?} 失败: {}", parent, e);
                return;
            }
        }
    }

    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已成功将当前配置（可能是默认配置）保存到 {:?}.", path);
            }
        }
        Err(e) => {
            warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e);
        }
    }
}

/// 初始化全局应用配置
pub fn init_config() {
    let loaded_config = load_or_create_config();
    if APP_CONFIG.set(loaded_config).is_err() {
        warn!("[配置模块] 全局应用配置 APP_CONFIG 已被初始化，本次 init_config 调用未覆盖已有配置。请检查初始化流程。");
    }
    info!("[配置模块] 应用配置已成功初始化完毕。");
}

/// 获取已加载的全局应用配置
pub fn get_config() -> &'static AppConfig {
    APP_CONFIG.get().expect("[配置模块] 全局应用配置尚未初始化，请先调用 init_config()")
}

/// 从指定路径加载设备标签表。
///
/// 文件缺失或内容非法只会让标注功能退化为空表，解码与广播不受影响。
pub fn load_label_tables(path: &str) -> LabelTables {
    if path.is_empty() {
        info!("[配置模块] 未配置设备标签表路径，广播负载将不携带标注视图。");
        return LabelTables::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => match LabelTables::from_json_str(&content) {
            Ok(tables) => {
                info!("[配置模块] 已成功从 {:?} 加载设备标签表。", path);
                tables
            }
            Err(e) => {
                warn!("[配置模块] 警告：解析设备标签表 {:?} 失败: {}. 将使用空标签表。", path, e);
                LabelTables::default()
            }
        },
        Err(e) => {
            warn!("[配置模块] 警告：读取设备标签表 {:?} 失败: {}. 将使用空标签表。", path, e);
            LabelTables::default()
        }
    }
}
