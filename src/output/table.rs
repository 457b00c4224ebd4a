//! Workflow status table.

use std::path::Path;

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use ckup::checkpoint::StepStatus;

/// Row for the step status table.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "STEP")]
    id: String,
    #[tabled(rename = "STATE")]
    state: String,
}

/// Print the completion state of every step of `workflow`.
pub fn print_status(workflow: &str, checkpoint: &Path, statuses: &[StepStatus]) {
    let completed = statuses.iter().filter(|s| s.completed).count();
    println!(
        "{} (checkpoint: {}, {}/{} completed):",
        format!("Workflow/{}", workflow).bold(),
        checkpoint.display(),
        completed,
        statuses.len()
    );

    println!("{}", render_table(statuses));

    if completed == statuses.len() && !statuses.is_empty() {
        println!();
        println!(
            "  {} All steps completed. Run reset to start over.",
            "✓".green()
        );
    }
}

fn render_table(statuses: &[StepStatus]) -> String {
    let next = statuses.iter().position(|s| !s.completed);

    let rows: Vec<StepRow> = statuses
        .iter()
        .map(|s| {
            let state = if s.completed {
                "Completed".green().to_string()
            } else if Some(s.position) == next {
                "Next".yellow().to_string()
            } else {
                "Pending".dimmed().to_string()
            };
            StepRow {
                position: s.position,
                id: s.id.clone(),
                state,
            }
        })
        .collect();

    render_rows(&rows)
}

fn render_rows(rows: &[StepRow]) -> String {
    let mut table = Table::new(rows);
    apply_table_style(&mut table);
    table.to_string()
}

/// kubectl-style table: no borders, two spaces between columns.
fn apply_table_style(table: &mut Table) {
    use tabled::settings::object::Columns;
    use tabled::settings::themes::Theme;
    use tabled::settings::{Modify, Padding};

    let mut theme = Theme::from_style(Style::empty());
    theme.remove_horizontal_lines();
    table.with(theme);
    table.with(Modify::new(Columns::new(..)).with(Padding::new(0, 2, 0, 0)));
}
