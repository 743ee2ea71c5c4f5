//! Work item commands.

use anyhow::Result;
use console::style;
use stagegate::config::StagegateConfig;
use stagegate::pipeline::WorkItem;

use super::super::ItemCommands;
use super::{OutputFormat, emit, open_store};

pub fn cmd_item(config: &StagegateConfig, output: OutputFormat, command: ItemCommands) -> Result<()> {
    let store = open_store(config);

    match command {
        ItemCommands::Add {
            id,
            title,
            goals,
            constraints,
        } => {
            let item = WorkItem::new(id, title)
                .with_goals(goals)
                .with_constraints(constraints);
            store.create_work_item(&item)?;
            emit(output, &item, |item| {
                println!("{} Added {}: {}", style("✓").green().bold(), item.id, item.title);
            })
        }
        ItemCommands::Approve { id, revoke } => {
            let item = store.set_human_gate(&id, !revoke)?;
            emit(output, &item, |item| {
                if item.human_gate {
                    println!(
                        "{} {} approved for dispatch",
                        style("✓").green().bold(),
                        item.id
                    );
                } else {
                    println!("{} approval withdrawn", item.id);
                }
            })
        }
        ItemCommands::List => {
            let items = store.work_items()?;
            emit(output, &items, |items| {
                if items.is_empty() {
                    println!("No work items. Add one with 'stagegate item add <id> <title>'.");
                    return;
                }
                println!("{:<16} {:<8} Title", "Id", "Gate");
                println!("{:<16} {:<8} -----", "----------------", "--------");
                for item in items {
                    let gate = if item.human_gate { "approved" } else { "pending" };
                    println!("{:<16} {:<8} {}", item.id, gate, item.title);
                }
            })
        }
    }
}
