use anyhow::{bail, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::{thread, time::Duration};
use tracing::warn;

use crate::models::AppConfig;
use crate::transport::TransportSettings;

pub const DEFAULT_DB_PATH: &str = "inkrelay.db";
pub const DB_PATH_ENV: &str = "INKRELAY_DB";

const API_CONFIG_KEY: &str = "api_config";
const TRANSPORT_KEY: &str = "transport_settings";
const TELEMETRY_KEY: &str = "telemetry_enabled";

/**
 * \brief 本地配置存储：`app_config(key, value)` 表中的若干 JSON 块。
 */
pub struct ConfigStore {
    conn: Connection,
}

impl ConfigStore {
    /**
     * \brief 打开默认数据库文件（`INKRELAY_DB` 或当前目录下的 inkrelay.db）。
     */
    pub fn open_default() -> Result<Self> {
        let path = std::env::var(DB_PATH_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        Self::open(path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self { conn })
    }

    /**
     * \brief 读取应用配置。缺失或损坏时回落到内置默认值，只记日志不报错。
     */
    pub fn load(&self) -> AppConfig {
        let mut config = self
            .load_json::<AppConfig>(API_CONFIG_KEY)
            .unwrap_or_default();
        config.fill_defaults();
        config
    }

    /**
     * \brief 整体覆盖保存，不支持按字段更新。
     */
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        self.save_json(API_CONFIG_KEY, config)
    }

    pub fn load_transport(&self) -> TransportSettings {
        self.load_json::<TransportSettings>(TRANSPORT_KEY)
            .unwrap_or_default()
    }

    pub fn save_transport(&self, settings: &TransportSettings) -> Result<()> {
        self.save_json(TRANSPORT_KEY, settings)
    }

    /**
     * \brief 切换当前具名代理；名称必须存在于代理表中。
     */
    pub fn set_current_proxy(&self, name: &str) -> Result<TransportSettings> {
        let mut settings = self.load_transport();
        if settings.proxy(name).is_none() {
            bail!("unknown proxy: {}", name);
        }
        settings.current_proxy = name.to_string();
        self.save_transport(&settings)?;
        Ok(settings)
    }

    pub fn set_simulation_mode(&self, enabled: bool) -> Result<TransportSettings> {
        let mut settings = self.load_transport();
        settings.simulation_mode = enabled;
        self.save_transport(&settings)?;
        Ok(settings)
    }

    pub fn telemetry_enabled(&self) -> Result<bool> {
        get_bool_config(&self.conn, TELEMETRY_KEY, false)
    }

    pub fn set_telemetry_enabled(&self, enabled: bool) -> Result<()> {
        set_bool_config(&self.conn, TELEMETRY_KEY, enabled)
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match get_config(&self.conn, key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, error = %err, "failed to read stored config, using defaults");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "malformed stored config, using defaults");
                None
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        set_config(&self.conn, key, &serde_json::to_string(value)?)
    }
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val)
}

fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )
    })?;
    Ok(())
}

fn set_bool_config(conn: &Connection, key: &str, value: bool) -> Result<()> {
    set_config(conn, key, if value { "1" } else { "0" })
}

fn get_bool_config(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get_config(conn, key)?
        .map(|s| s == "1")
        .unwrap_or(default))
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并线性退避，最多尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderConfig, ProviderId};
    use crate::registry;

    fn mem_store() -> ConfigStore {
        ConfigStore::in_memory().expect("open in-memory store")
    }

    #[test]
    fn test_load_without_saved_config_returns_defaults() {
        let store = mem_store();
        assert_eq!(store.load(), registry::default_app_config());
        assert_eq!(store.load_transport(), TransportSettings::default());
        assert!(!store.telemetry_enabled().expect("telemetry flag"));
    }

    #[test]
    fn test_save_then_load_keeps_set_fields_and_defaults_rest() {
        let store = mem_store();
        let mut cfg = AppConfig::default();
        cfg.active_provider = ProviderId::DeepSeek;
        *cfg.provider_mut(ProviderId::DeepSeek) = ProviderConfig {
            api_key: "test-key".into(),
            temperature: Some(1.2),
            ..Default::default()
        };
        store.save(&cfg).expect("save");

        let loaded = store.load();
        assert_eq!(loaded.active_provider, ProviderId::DeepSeek);
        let ds = loaded.provider(ProviderId::DeepSeek);
        assert_eq!(ds.api_key, "test-key");
        assert_eq!(ds.temperature, Some(1.2));
        assert_eq!(ds.text_model, "deepseek-chat");
        assert_eq!(ds.max_tokens, Some(registry::DEFAULT_MAX_TOKENS));
        assert_eq!(
            loaded.provider(ProviderId::OpenAI),
            registry::defaults_for(ProviderId::OpenAI)
        );
    }

    #[test]
    fn test_malformed_blob_falls_back_to_defaults() {
        let store = mem_store();
        set_config(&store.conn, API_CONFIG_KEY, "{not json").expect("write garbage");
        set_config(&store.conn, TRANSPORT_KEY, "[1,2").expect("write garbage");
        assert_eq!(store.load(), registry::default_app_config());
        assert_eq!(store.load_transport(), TransportSettings::default());
    }

    #[test]
    fn test_unknown_provider_in_blob_falls_back() {
        let store = mem_store();
        set_config(&store.conn, API_CONFIG_KEY, r#"{"provider":"mistral"}"#)
            .expect("write blob");
        assert_eq!(store.load().active_provider, ProviderId::OpenAI);
    }

    #[test]
    fn test_stray_entry_keeps_saved_keys() {
        let store = mem_store();
        set_config(
            &store.conn,
            API_CONFIG_KEY,
            r#"{"provider":"deepseek","deepseek":{"apiKey":"ds-key"},"gemini":{"apiKey":"g"}}"#,
        )
        .expect("write blob");
        let loaded = store.load();
        assert_eq!(loaded.active_provider, ProviderId::DeepSeek);
        assert_eq!(loaded.provider(ProviderId::DeepSeek).api_key, "ds-key");
        assert_eq!(loaded.provider(ProviderId::DeepSeek).text_model, "deepseek-chat");
    }

    #[test]
    fn test_set_current_proxy_validates_name() {
        let store = mem_store();
        let s = store.set_current_proxy("thingproxy").expect("known proxy");
        assert_eq!(s.current_proxy, "thingproxy");
        assert_eq!(store.load_transport().current_proxy, "thingproxy");
        assert!(store.set_current_proxy("nope").is_err());
        assert_eq!(store.load_transport().current_proxy, "thingproxy");
    }

    #[test]
    fn test_flags_round_trip() {
        let store = mem_store();
        store.set_telemetry_enabled(true).expect("set telemetry");
        assert!(store.telemetry_enabled().expect("get telemetry"));
        store.set_simulation_mode(true).expect("simulate on");
        assert!(store.load_transport().simulation_mode);
    }

    #[test]
    fn test_on_disk_store_persists_across_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("inkrelay.db");
        {
            let store = ConfigStore::open(&path).expect("open");
            let mut cfg = store.load();
            cfg.provider_mut(ProviderId::Baidu).secret_key = "s3cret".into();
            store.save(&cfg).expect("save");
        }
        let store = ConfigStore::open(&path).expect("reopen");
        assert_eq!(store.load().provider(ProviderId::Baidu).secret_key, "s3cret");
    }
}
