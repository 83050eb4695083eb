//! Mercat Market Server - 到店自提市场节点
//!
//! # 架构概述
//!
//! 本模块是 Market Server 的主入口，提供以下核心功能：
//!
//! - **订单生命周期** (`orders`): 状态机、部分拒单恢复、称重复核
//! - **库存锁定** (`inventory`): 限时特价的购物车短时锁定
//! - **序号生成** (`sequence`): 每日单号与永久客户号
//! - **对账清扫** (`sweeper`): 过期订单/下架/促销/锁定的幂等清理
//! - **数据库** (`db`): SQLite (WAL) + sqlx
//! - **认证** (`auth`): JWT 校验 + 服务间共享密钥
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! market-server/src/
//! ├── core/       # 配置、状态、服务器
//! ├── auth/       # JWT 校验、服务密钥
//! ├── db/         # 数据库层
//! ├── orders/     # 订单状态机
//! ├── inventory/  # 库存锁定
//! ├── sequence/   # 序号生成
//! ├── sweeper/    # 对账清扫
//! ├── notify/     # 通知分发
//! ├── api/        # HTTP 路由和处理器
//! └── utils/      # 工具函数
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod inventory;
pub mod notify;
pub mod orders;
pub mod sequence;
pub mod sweeper;
pub mod utils;

// Re-export 公共类型
pub use auth::{CurrentUser, JwtService, Role};
pub use core::{Config, Server, ServerState};
pub use inventory::HoldManager;
pub use orders::{LifecyclePolicy, OrderLifecycle};
pub use sweeper::{SweepPolicy, Sweeper};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    __  ___                     __
   /  |/  /__  ______________ _/ /_
  / /|_/ / _ \/ ___/ ___/ __ `/ __/
 / /  / /  __/ /  / /__/ /_/ / /_
/_/  /_/\___/_/   \___/\__,_/\__/
    "#
    );
}
