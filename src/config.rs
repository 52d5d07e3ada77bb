use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    // NapCat (OneBot v11) 连接配置
    #[serde(default)]
    pub napcat_server: NapcatServerConfig,

    // MaiBot 消息总线连接配置
    #[serde(default)]
    pub maibot_server: MaibotServerConfig,

    // 聊天过滤与功能开关
    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NapcatServerConfig {
    #[serde(default = "default_napcat_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for NapcatServerConfig {
    fn default() -> Self {
        Self {
            url: default_napcat_url(),
            access_token: None,
        }
    }
}

fn default_napcat_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MaibotServerConfig {
    #[serde(default = "default_maibot_url")]
    pub url: String,

    // 发往 MaiBot 的平台名称
    #[serde(default = "default_platform")]
    pub platform_name: String,
}

impl Default for MaibotServerConfig {
    fn default() -> Self {
        Self {
            url: default_maibot_url(),
            platform_name: default_platform(),
        }
    }
}

fn default_maibot_url() -> String {
    "ws://127.0.0.1:8000/ws".to_string()
}

fn default_platform() -> String {
    "qq".to_string()
}

/// 名单类型
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Whitelist,
    #[default]
    Blacklist,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_true")]
    pub enable_poke: bool,

    #[serde(default)]
    pub group_list_type: ListType,
    #[serde(default)]
    pub group_list: Vec<i64>,

    #[serde(default)]
    pub private_list_type: ListType,
    #[serde(default)]
    pub private_list: Vec<i64>,

    // 全局屏蔽的用户
    #[serde(default)]
    pub ban_user_id: Vec<i64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enable_poke: true,
            group_list_type: ListType::Blacklist,
            group_list: Vec::new(),
            private_list_type: ListType::Blacklist,
            private_list: Vec::new(),
            ban_user_id: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    // debug | info | warn | error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

fn default_db_url() -> String {
    // mode=rwc 允许 读/写/创建
    "sqlite:data/napcat_adapter.db?mode=rwc".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// 加载配置，如果文件不存在则写入并返回默认配置
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let cfg = AppConfig::default();
            cfg.save(path).await?;
            return Ok(cfg);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(cfg)
    }

    /// 原子写入配置（写临时文件 -> Rename 覆盖）
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let path: PathBuf = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("tmp");

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await??;

        Ok(())
    }
}
