//! Saída de terminal do transferjob com cores.
//!
//! Usa a crate `console` para estilização. O [`Printer`] formata registros
//! de jobs, transições aceitas e rejeições.

use console::Style;

use transferjob::state_machine::{AuthField, Job, JobMap};
use transferjob::store::JobId;

/// Impressora de mensagens coloridas para a CLI.
pub struct Printer {
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para rejeições.
    red: Style,
    // Estilo ciano para rótulos.
    cyan: Style,
    // Estilo esmaecido para detalhes.
    dim: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
        }
    }
}

impl Printer {
    /// Confirma a criação de um job.
    pub fn created(&self, id: JobId) {
        println!("  {} Job created: {id}", self.green.apply_to("✓"));
    }

    /// Confirma uma transição aceita e persistida.
    pub fn advanced(&self, id: JobId, job: &Job) {
        println!(
            "  {} Job {id} now at {}",
            self.green.apply_to("✓"),
            self.cyan.apply_to(job.authorization().stage())
        );
    }

    /// Exibe o motivo de uma rejeição.
    pub fn rejected(&self, reason: &str) {
        eprintln!("  {} Rejected: {reason}", self.red.apply_to("✗"));
    }

    /// Imprime o job decodificado. Artefatos aparecem só como presentes/ausentes.
    pub fn job(&self, job: &Job) {
        let auth = job.authorization();
        println!("{}", self.cyan.apply_to("─── Job ───"));
        println!("  state:       {}", job.state());
        println!("  export:      {}", job.export_service());
        println!("  import:      {}", job.import_service());
        println!("  data type:   {}", job.transfer_data_type());
        println!("  stage:       {}", auth.stage());
        for field in AuthField::ALL {
            let mark = if auth.field(field).is_some() {
                self.green.apply_to("present")
            } else {
                self.dim.apply_to("empty")
            };
            println!("  {:<24} {mark}", field.name());
        }
    }

    /// Imprime o registro armazenado em JSON.
    pub fn record(&self, entries: &JobMap) -> Result<(), serde_json::Error> {
        let rendered = render_record(entries)?;
        println!("{}", self.cyan.apply_to("─── Stored record ───"));
        println!("{rendered}");
        Ok(())
    }
}

/// Formata o registro como JSON indentado.
fn render_record(entries: &JobMap) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(entries)
}
