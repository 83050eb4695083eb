//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`orders`] - 订单生命周期接口
//! - [`offers`] - 限时特价与购物车锁定接口
//! - [`products`] - 商品上下架与促销接口
//! - [`shops`] - 店铺状态与客户号接口
//! - [`sweeps`] - 对账清扫触发接口 (共享密钥)

pub mod health;
pub mod offers;
pub mod orders;
pub mod products;
pub mod shops;
pub mod sweeps;

use crate::core::ServerState;
use axum::Router;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};

/// Build the Axum router (without state)
pub fn build_app() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(offers::router())
        .merge(products::router())
        .merge(shops::router())
        .merge(sweeps::router())
}
