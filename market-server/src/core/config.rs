use crate::auth::JwtConfig;
use std::path::PathBuf;

/// 服务器配置 - 市场节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/mercat/market | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | SWEEP_SECRET | (生成) | 清扫/回调共享密钥 |
/// | ORDER_EXPIRY_MINUTES | 10 | 待处理订单过期时间 |
/// | HOLD_MINUTES | 10 | 购物车锁定时长 |
/// | SELF_CANCEL_GRACE_MINUTES | 5 | 已接单自助取消宽限 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/mercat HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// JWT 认证配置
    pub jwt: JwtConfig,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 清扫与回调 ===
    /// Shared secret for sweep triggers and the payment callback
    pub sweep_secret: String,

    // === 订单生命周期 ===
    /// 待处理订单过期时间 (分钟)
    pub order_expiry_minutes: i64,
    /// 已接单自助取消宽限 (分钟)
    pub self_cancel_grace_minutes: i64,
    /// 称重复核阈值 (百分比)
    pub weight_review_threshold_pct: i64,

    // === 库存锁定 ===
    /// 购物车锁定时长 (分钟)
    pub hold_minutes: i64,

    // === 自动暂停 ===
    /// 窗口内自动取消次数阈值
    pub auto_pause_threshold: i64,
    /// 自动暂停统计窗口 (分钟)
    pub auto_pause_window_minutes: i64,

    // === 缓存 ===
    /// 店主查询缓存容量
    pub owner_cache_capacity: usize,
    /// 店主查询缓存 TTL (秒)
    pub owner_cache_ttl_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/mercat/market".into()),
            http_port: env_parse("HTTP_PORT", 3000),
            jwt: JwtConfig::default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            sweep_secret: std::env::var("SWEEP_SECRET").unwrap_or_default(),

            order_expiry_minutes: env_parse("ORDER_EXPIRY_MINUTES", 10),
            self_cancel_grace_minutes: env_parse("SELF_CANCEL_GRACE_MINUTES", 5),
            weight_review_threshold_pct: env_parse("WEIGHT_REVIEW_THRESHOLD_PCT", 10),

            hold_minutes: env_parse("HOLD_MINUTES", 10),

            auto_pause_threshold: env_parse("AUTO_PAUSE_THRESHOLD", 3),
            auto_pause_window_minutes: env_parse("AUTO_PAUSE_WINDOW_MINUTES", 60),

            owner_cache_capacity: env_parse("OWNER_CACHE_CAPACITY", 1024),
            owner_cache_ttl_secs: env_parse("OWNER_CACHE_TTL_SECS", 300),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 数据库目录
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 日志目录
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
