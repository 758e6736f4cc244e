// ==========================================
// 餐饮门店损耗事件根因推理引擎 - 服务主入口
// ==========================================
// 技术栈: Rust + SQLite + Tokio
// 系统定位: 决策支持系统
// 说明: REST 传输壳层由外部网关承载,本进程提供引擎与 API 装配
// ==========================================

use waste_rca_engine::app::{get_default_db_path, AppState};
use waste_rca_engine::logging;

#[tokio::main]
async fn main() {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", waste_rca_engine::APP_NAME);
    tracing::info!("系统版本: {}", waste_rca_engine::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = std::env::var("WASTE_RCA_DB").unwrap_or_else(|_| get_default_db_path());
    tracing::info!("使用数据库: {}", db_path);

    // 创建AppState
    tracing::info!("正在初始化AppState...");
    let app_state = AppState::new(db_path).expect("无法初始化AppState");

    tracing::info!("AppState初始化成功,引擎就绪");
    tracing::info!(
        "事件表可用: store 聚合查询自检 = {:?}",
        app_state
            .waste_event_api
            .get_store_summary("_startup_probe", 1)
            .map(|rows| rows.len())
    );
}
