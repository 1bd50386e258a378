// ==========================================
// 志愿者配对系统 - 主入口
// ==========================================
// 用法: volunteer-match [数据库路径]
// 职责: 初始化日志与数据库，输出项目概况
// ==========================================

use anyhow::Context;
use volunteer_match::app::{get_default_db_path, AppState};
use volunteer_match::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", volunteer_match::APP_NAME);
    tracing::info!("系统版本: {}", volunteer_match::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    let projects = state.project_api.list_projects()?;
    tracing::info!(count = projects.len(), "已加载项目");
    for project in &projects {
        tracing::info!(
            project_id = %project.project_id,
            name = %project.name,
            finalized = project.is_finalized(),
            "项目"
        );
    }

    Ok(())
}
