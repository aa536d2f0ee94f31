use super::Context;
use crate::output::{print_json, print_table, relative_time};
use anyhow::Context as _;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum StateSubcommand {
    /// Print recorded execution history
    Show,
    /// Forget all recorded history
    Reset,
}

pub fn run(ctx: &Context, subcmd: StateSubcommand) -> anyhow::Result<()> {
    match subcmd {
        StateSubcommand::Show => show(ctx),
        StateSubcommand::Reset => reset(ctx),
    }
}

fn show(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store();
    let state = store.state();

    if ctx.json {
        return print_json(&state);
    }

    println!("State file:     {}", store.path().display());
    println!(
        "Last execution: {}",
        state
            .last_execution
            .map(relative_time)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();

    let mut rows: Vec<Vec<String>> = state
        .services
        .iter()
        .map(|(name, rec)| {
            vec![
                "-".to_string(),
                name.clone(),
                rec.last_result.clone(),
                rec.success_count.to_string(),
                rec.failure_count.to_string(),
                rec.last_duration.clone(),
            ]
        })
        .collect();
    for (tenant, record) in &state.tenants {
        for (name, rec) in &record.services {
            rows.push(vec![
                tenant.clone(),
                name.clone(),
                rec.last_result.clone(),
                rec.success_count.to_string(),
                rec.failure_count.to_string(),
                rec.last_duration.clone(),
            ]);
        }
    }

    if rows.is_empty() {
        println!("No executions recorded.");
    } else {
        print_table(
            &["TENANT", "SERVICE", "RESULT", "SUCCESS", "FAILURES", "LAST DURATION"],
            rows,
        );
    }
    Ok(())
}

fn reset(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store();
    store.reset().context("failed to reset state")?;
    if ctx.json {
        print_json(&serde_json::json!({ "reset": store.path() }))
    } else {
        println!("State reset: {}", store.path().display());
        Ok(())
    }
}
