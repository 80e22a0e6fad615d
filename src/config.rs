//! Configuração do transferjob carregada a partir de `transferjob.toml`.
//!
//! A struct [`TransferJobConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TRANSFERJOB_STORE` tem precedência sobre o arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::state_machine::TransitionPolicy;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "transferjob.toml";

/// Configuração de nível superior carregada de `transferjob.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferJobConfig {
    /// Caminho do documento JSON usado pelo store de jobs.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Filtro de log padrão quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Rejeita autorizações cujo estágio regride.
    #[serde(default)]
    pub forward_only: bool,
}

// Valor padrão para o store: "jobs.json".
fn default_store_path() -> PathBuf {
    PathBuf::from("jobs.json")
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TransferJobConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            log_level: default_log_level(),
            forward_only: false,
        }
    }
}

impl TransferJobConfig {
    /// Carrega a configuração de `transferjob.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<TransferJobConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para o caminho do store.
        if let Ok(store) = std::env::var("TRANSFERJOB_STORE")
            && !store.is_empty()
        {
            config.store_path = PathBuf::from(store);
        }

        Ok(config)
    }

    /// Política de transição derivada de `forward_only`.
    pub fn policy(&self) -> TransitionPolicy {
        if self.forward_only {
            TransitionPolicy::ForwardOnly
        } else {
            TransitionPolicy::Lenient
        }
    }
}
