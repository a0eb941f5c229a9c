//! Interface de linha de comando do vmwork baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (dispatch, sample,
//! snapshot, work-types) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vmwork: despacho de jobs de VM e notificação de mudanças de estado.
#[derive(Debug, Parser)]
#[command(name = "vmwork", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./vmwork.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Despacha os jobs de um arquivo JSON contra os handlers simulados.
    Dispatch {
        /// Arquivo JSON com um array de jobs.
        file: PathBuf,

        /// Número máximo de jobs executados em paralelo.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Publica eventos de estado independentemente da configuração.
        #[arg(long, default_value_t = false)]
        publish: bool,
    },

    /// Gera um arquivo de jobs de exemplo no stdout.
    Sample,

    /// Conduz um snapshot pelo seu ciclo de vida e mostra os eventos.
    Snapshot {
        /// Volume de origem do snapshot.
        #[arg(long, default_value_t = 1)]
        volume_id: u64,

        /// Simula uma falha durante o backup para o storage secundário.
        #[arg(long, default_value_t = false)]
        fail_backup: bool,

        /// Publica eventos de estado independentemente da configuração.
        #[arg(long, default_value_t = false)]
        publish: bool,
    },

    /// Lista os tipos de trabalho registrados.
    WorkTypes,
}
