use anyhow::{Context, Result};
use sea_orm::{Database, DatabaseConnection};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::info;

/// SQLite 文件所在目录 (内存数据库或非 SQLite 地址返回 None)
fn sqlite_dir(url: &str) -> Option<PathBuf> {
    let path = url.strip_prefix("sqlite:")?;
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }

    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// 初始化数据库连接
pub async fn init(url: &str) -> Result<DatabaseConnection> {
    if let Some(dir) = sqlite_dir(url) {
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("创建数据目录失败: {}", dir.display()))?;
    }

    let db = Database::connect(url)
        .await
        .with_context(|| format!("连接数据库失败: {}", url))?;

    info!(target: "Database", "连接成功: {}", url);

    Ok(db)
}
