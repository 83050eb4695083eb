use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::auth::JwtService;
use crate::core::Config;
use crate::db::DbService;
use crate::inventory::HoldManager;
use crate::notify::{LogNotifier, NotifierHandle};
use crate::orders::{LifecyclePolicy, OrderLifecycle};
use crate::sweeper::{SweepPolicy, Sweeper};
use crate::utils::TtlCache;

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是市场节点的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | SqlitePool | SQLite 连接池 |
/// | jwt_service | Arc<JwtService> | JWT 认证服务 |
/// | orders | OrderLifecycle | 订单状态机 |
/// | holds | HoldManager | 库存锁定 |
/// | sweeper | Sweeper | 对账清扫 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// SQLite 连接池
    pub db: SqlitePool,
    /// JWT 认证服务 (Arc 共享所有权)
    pub jwt_service: Arc<JwtService>,
    /// 订单生命周期管理
    pub orders: OrderLifecycle,
    /// 库存锁定管理
    pub holds: HoldManager,
    /// 对账清扫
    pub sweeper: Sweeper,
    /// 通知分发
    pub notifier: NotifierHandle,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构 (确保目录存在)
    /// 2. 数据库 (work_dir/database/market.db，自动迁移)
    /// 3. 各服务 (JWT, 订单, 库存, 清扫)
    pub async fn initialize(config: &Config) -> Result<Self, shared::error::AppError> {
        config
            .ensure_work_dir_structure()
            .map_err(|e| shared::error::AppError::internal(format!("Work dir setup failed: {e}")))?;

        let db_path = config.database_dir().join("market.db");
        let db_service = DbService::new(&db_path.to_string_lossy()).await?;
        let pool = db_service.pool;

        let notifier: NotifierHandle = Arc::new(LogNotifier);
        Ok(Self::with_pool(config.clone(), pool, notifier))
    }

    /// 基于现有连接池构造 (测试与内嵌场景)
    pub fn with_pool(config: Config, pool: SqlitePool, notifier: NotifierHandle) -> Self {
        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));

        let owner_cache = Arc::new(TtlCache::new(
            config.owner_cache_capacity,
            Duration::from_secs(config.owner_cache_ttl_secs),
        ));

        let orders = OrderLifecycle::new(
            pool.clone(),
            LifecyclePolicy {
                order_expiry_minutes: config.order_expiry_minutes,
                self_cancel_grace_minutes: config.self_cancel_grace_minutes,
                weight_review_threshold_pct: config.weight_review_threshold_pct,
            },
            notifier.clone(),
            owner_cache,
        );

        let holds = HoldManager::new(pool.clone(), config.hold_minutes);

        let sweeper = Sweeper::new(
            pool.clone(),
            SweepPolicy {
                auto_pause_threshold: config.auto_pause_threshold,
                auto_pause_window_minutes: config.auto_pause_window_minutes,
            },
            orders.clone(),
        );

        Self {
            config,
            db: pool,
            jwt_service,
            orders,
            holds,
            sweeper,
            notifier,
        }
    }

    /// 获取数据库连接池
    pub fn get_db(&self) -> SqlitePool {
        self.db.clone()
    }

    /// 获取 JWT 服务
    pub fn get_jwt_service(&self) -> Arc<JwtService> {
        self.jwt_service.clone()
    }
}
