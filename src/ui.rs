//! Saída de terminal do vmwork com estilização via `console`.
//!
//! O [`Report`] imprime conclusões de jobs, eventos de estado e o resumo
//! final de um lote despachado.

use console::Style;

use crate::events::{ResourceStateEvent, TransitionPhase};
use crate::job::{JobCompletion, JobStatus};

/// Formatação colorida para o terminal.
///
/// Sucesso em verde, falha em vermelho, eventos em ciano.
pub struct Report {
    green: Style,
    red: Style,
    cyan: Style,
    dim: Style,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
        }
    }

    /// Imprime a conclusão de um job.
    pub fn completion(&self, completion: &JobCompletion) {
        match completion.status {
            JobStatus::Succeeded => println!(
                "  {} job-{} {}",
                self.green.apply_to("✓"),
                completion.job_id,
                completion.message
            ),
            _ => println!(
                "  {} job-{} {}",
                self.red.apply_to("✗"),
                completion.job_id,
                completion.message
            ),
        }
    }

    /// Imprime um evento de mudança de estado.
    pub fn event(&self, event: &ResourceStateEvent) {
        let marker = match event.phase {
            TransitionPhase::PreStateTransitionEvent => "→",
            TransitionPhase::PostStateTransitionEvent => "⇒",
        };
        println!(
            "  {} {} {} {} -> {} {}",
            self.cyan.apply_to(marker),
            event.resource_type,
            event.event_type,
            event.old_state().unwrap_or("?"),
            event.new_state().unwrap_or("?"),
            self.dim.apply_to(&event.resource_uuid),
        );
    }

    /// Imprime uma linha de cabeçalho.
    pub fn heading(&self, title: &str) {
        println!();
        println!("{}", self.cyan.apply_to(format!("─── {title} ───")));
    }

    /// Resumo final de um lote: quantos jobs tiveram sucesso e quantos falharam.
    pub fn summary(&self, completions: &[JobCompletion]) {
        let succeeded = completions
            .iter()
            .filter(|c| c.status == JobStatus::Succeeded)
            .count();
        let failed = completions.len() - succeeded;
        println!();
        println!(
            "{} succeeded, {} failed",
            self.green.apply_to(succeeded),
            self.red.apply_to(failed)
        );
    }
}
