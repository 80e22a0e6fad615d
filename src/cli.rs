//! Interface de linha de comando do transferjob baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (create, show,
//! advance, demo) e flags globais (--store, --forward-only, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use transferjob::state_machine::{AuthField, AuthorizationFields, Stage};

/// transferjob — Registros de jobs de transferência com custódia de credenciais.
#[derive(Debug, Parser)]
#[command(name = "transferjob", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do store JSON (sobrepõe a configuração).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Rejeita autorizações cujo estágio regride.
    #[arg(long, global = true, default_value_t = false)]
    pub forward_only: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Estágio aceito pela CLI, mapeado para [`Stage`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Initial,
    CredsAvailable,
    CredsEncryptionKeyGenerated,
    CredsEncrypted,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Initial => Stage::Initial,
            StageArg::CredsAvailable => Stage::CredsAvailable,
            StageArg::CredsEncryptionKeyGenerated => Stage::CredsEncryptionKeyGenerated,
            StageArg::CredsEncrypted => Stage::CredsEncrypted,
        }
    }
}

/// Artefatos criptografados informados para um avanço de estágio.
#[derive(Debug, Args)]
pub struct AdvanceArgs {
    /// Estágio solicitado.
    #[arg(long, value_enum)]
    pub stage: StageArg,

    #[arg(long)]
    pub session_key: Option<String>,

    #[arg(long)]
    pub public_key: Option<String>,

    #[arg(long)]
    pub private_key: Option<String>,

    /// Credenciais do serviço de origem, criptografadas.
    #[arg(long)]
    pub export_auth: Option<String>,

    /// Credenciais do serviço de destino, criptografadas.
    #[arg(long)]
    pub import_auth: Option<String>,
}

impl AdvanceArgs {
    /// Monta os campos brutos da autorização; a validação fica com o builder.
    pub fn to_fields(&self) -> AuthorizationFields {
        let mut fields = AuthorizationFields::new(self.stage.into());
        let given = [
            (AuthField::SessionKey, &self.session_key),
            (AuthField::PublicKey, &self.public_key),
            (AuthField::PrivateKey, &self.private_key),
            (AuthField::ExportAuthData, &self.export_auth),
            (AuthField::ImportAuthData, &self.import_auth),
        ];
        for (field, value) in given {
            if let Some(value) = value {
                fields = fields.with(field, value.as_str());
            }
        }
        fields
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria um job novo no store e imprime seu id.
    Create {
        /// Serviço de origem.
        #[arg(long = "export")]
        export_service: String,

        /// Serviço de destino.
        #[arg(long = "import")]
        import_service: String,

        /// Tipo de dado transferido.
        #[arg(long)]
        data_type: String,
    },

    /// Mostra o registro armazenado de um job.
    Show { id: Uuid },

    /// Submete uma nova autorização para um job.
    Advance {
        id: Uuid,

        #[command(flatten)]
        args: AdvanceArgs,
    },

    /// Executa a demonstração embutida do handshake.
    Demo,
}
