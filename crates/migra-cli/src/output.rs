use chrono::{DateTime, Utc};
use migra_core::engine::ExecutionSummary;
use migra_core::types::{format_duration, ServiceResult, TenantResult};
use serde::Serialize;

const SEPARATOR: &str = "============================================================";

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// `just now`, `12 min ago`, `3 hours ago`, `2 days ago`.
pub fn relative_time(at: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(at);
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{} min ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{} hours ago", elapsed.num_hours())
    } else {
        format!("{} days ago", elapsed.num_days())
    }
}

fn outcome(success: bool) -> String {
    let label = if success { "ok" } else { "failed" };
    label.to_string()
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

fn print_summary(title: &str, unit: &str, summary: &ExecutionSummary) {
    println!();
    println!("{SEPARATOR}");
    println!("{title}");
    println!("{SEPARATOR}");
    println!("{:<17}{}", format!("Total {unit}:"), summary.total);
    println!("{:<17}{}", "Successful:", summary.succeeded);
    println!("{:<17}{}", "Failed:", summary.failed);
    if summary.skipped > 0 {
        println!("{:<17}{}", "Skipped:", summary.skipped);
    }
    println!("{:<17}{}", "Total Duration:", format_duration(summary.duration));
    println!("{SEPARATOR}");
}

pub fn print_service_report(
    summary: &ExecutionSummary,
    results: &[ServiceResult],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "summary": summary,
            "results": results,
        }));
    }

    let rows = results
        .iter()
        .map(|r| {
            vec![
                r.service_name.clone(),
                outcome(r.success),
                format_duration(r.duration),
                if r.success {
                    first_line(&r.output)
                } else {
                    first_line(&r.error)
                },
            ]
        })
        .collect();
    print_table(&["SERVICE", "RESULT", "DURATION", "DETAIL"], rows);
    print_summary("MIGRATION SUMMARY", "Services", summary);
    Ok(())
}

pub fn print_tenant_report(
    summary: &ExecutionSummary,
    results: &[TenantResult],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "summary": summary,
            "results": results,
        }));
    }

    let rows = results
        .iter()
        .map(|r| {
            vec![
                r.tenant_id.clone(),
                outcome(r.success),
                format!("{}/{}", r.succeeded, r.service_count),
                format_duration(r.duration),
                r.error.clone(),
            ]
        })
        .collect();
    print_table(&["TENANT", "RESULT", "SERVICES", "DURATION", "ERROR"], rows);
    print_summary("TENANT MIGRATION SUMMARY", "Tenants", summary);
    Ok(())
}
