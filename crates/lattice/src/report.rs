//! Traceability health report

use lattice_core::{LinkStatus, Store};
use owo_colors::OwoColorize;

/// Health summary over the persisted store.
#[derive(Debug)]
pub struct HealthReport {
    pub total_links: usize,
    pub valid_links: usize,
    pub broken_links: usize,
    pub unlinked_sources: usize,
}

impl HealthReport {
    pub fn compute(store: &Store) -> Self {
        let total_links = store.links.len();
        let valid_links = store.count_status(LinkStatus::Valid);
        Self {
            total_links,
            valid_links,
            broken_links: total_links - valid_links,
            unlinked_sources: store.orphans.unlinked_sources.len(),
        }
    }

    /// Integrity percentage (0 - 100); an empty store scores 0.
    pub fn integrity_percent(&self) -> f64 {
        if self.total_links == 0 {
            return 0.0;
        }
        (self.valid_links as f64 / self.total_links as f64) * 100.0
    }

    pub fn render(&self) -> String {
        let mut output = String::new();

        let percent = self.integrity_percent();
        let percent_str = format!("{percent:.0}%");
        let color_percent = if percent >= 80.0 {
            percent_str.green().to_string()
        } else if percent >= 50.0 {
            percent_str.yellow().to_string()
        } else {
            percent_str.red().to_string()
        };

        output.push('\n');
        output.push_str(&format!(
            "{} Traceability Health Report\n\n",
            "##".bold()
        ));
        output.push_str(&format!("Integrity: {color_percent}\n"));
        output.push_str(&format!("  Total links:    {}\n", self.total_links));
        output.push_str(&format!(
            "  Validated:      {}\n",
            self.valid_links.to_string().green()
        ));
        output.push_str(&format!(
            "  Broken/pending: {}\n",
            self.broken_links.to_string().red()
        ));
        if self.unlinked_sources > 0 {
            output.push_str(&format!(
                "  {} {} requirements without code\n",
                "!".yellow().bold(),
                self.unlinked_sources
            ));
        }
        output.push('\n');
        output
    }
}
