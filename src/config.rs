//! Configuração do vmwork carregada a partir de `vmwork.toml`.
//!
//! A struct [`AppConfig`] contém os parâmetros de processo (log, barramento
//! de eventos, webhook). Valores não presentes no arquivo usam defaults
//! sensíveis. A variável de ambiente `VMWORK_LOG` tem precedência sobre o
//! nível de log do arquivo.
//!
//! A tabela `[settings]` alimenta o [`ConfigStore`] consultado em tempo de
//! execução, por exemplo o toggle `publish.resource.state.events`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Nome padrão do arquivo de configuração.
pub const CONFIG_FILE: &str = "vmwork.toml";

/// Variável de ambiente que sobrescreve `log_level`.
pub const LOG_ENV: &str = "VMWORK_LOG";

/// Formato da saída de log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuração de nível superior carregada de `vmwork.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Filtro de log no formato do `EnvFilter` (ex.: "info", "vmwork=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Capacidade do canal broadcast do barramento de eventos.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// URL opcional para onde os eventos de estado são enviados via POST.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Timeout em milissegundos para cada entrega de webhook.
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    /// Valores do configuration store, lidos em tempo de execução.
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

// Valor padrão para a capacidade do barramento: 1024 eventos.
fn default_event_bus_capacity() -> usize {
    1024
}

// Valor padrão para o timeout do webhook: 5000ms.
fn default_webhook_timeout_ms() -> u64 {
    5000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            event_bus_capacity: default_event_bus_capacity(),
            webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
            settings: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Carrega a configuração de `vmwork.toml` no diretório atual.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração do caminho informado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<AppConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para o nível de log.
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(LOG_ENV).filter(|l| !l.is_empty()) {
            self.log_level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "event_bus_capacity",
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    /// Cria o store de tempo de execução semeado com a tabela `[settings]`.
    pub fn config_store(&self) -> InMemoryConfigStore {
        InMemoryConfigStore::from_map(self.settings.clone())
    }
}

/// Fonte de valores de configuração consultados em tempo de execução.
pub trait ConfigStore: Send + Sync {
    fn get_value(&self, key: &str) -> Option<String>;
}

/// Store em memória; os valores podem ser alterados com o processo rodando.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get_value(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}
