//! `notemerge prs`: inspect pull requests straight from the database.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;

use notemerge_core::db::Database;
use notemerge_core::models::PrStatus;
use notemerge_core::PullRequestService;

use crate::style;

pub fn list(db: &Database, status: Option<&str>, limit: u32) -> Result<()> {
    let status = status
        .map(|s| {
            PrStatus::parse(s)
                .ok_or_else(|| anyhow::anyhow!("invalid status '{s}': use open, merged or closed"))
        })
        .transpose()?;

    let prs = db
        .list_pull_requests(status, limit)
        .context("failed to list pull requests")?;
    debug!(status = ?status, limit, count = prs.len(), "pull requests loaded");

    if prs.is_empty() {
        println!("No pull requests found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Title", "Author", "Target", "Status", "Created"]);

    for pr in &prs {
        table.add_row(vec![
            Cell::new(&pr.id),
            Cell::new(&pr.title),
            Cell::new(&pr.author_id),
            Cell::new(&pr.target.document_id),
            style::status_cell(pr.status),
            Cell::new(pr.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!("{table}");
    println!("{} pull request(s) shown", prs.len());
    Ok(())
}

pub fn show(service: &PullRequestService, db: &Database, id: &str) -> Result<()> {
    let details = service
        .get_details(id)
        .with_context(|| format!("failed to load pull request '{id}'"))?;
    let pr = &details.pr;
    debug!(pr_id = %pr.id, status = %pr.status, mergeable = ?details.mergeable, "pull request loaded");

    println!("{}", style::header(&format!("Pull request {}", pr.id)));
    println!();
    println!("  Title      : {}", pr.title);
    println!("  Author     : {}", pr.author_id);
    println!("  Status     : {}", pr.status);
    println!("  Source     : {}", pr.source.document_id);
    println!("  Target     : {}", pr.target.document_id);
    println!("  Created at : {}", pr.created_at.to_rfc3339());
    if let Some(at) = pr.merged_at {
        println!("  Merged at  : {}", at.to_rfc3339());
    }
    if let Some(at) = pr.closed_at {
        println!("  Closed at  : {}", at.to_rfc3339());
    }
    match details.mergeable {
        Some(true) => println!("  Mergeable  : yes"),
        Some(false) => println!("  Mergeable  : no (conflicts)"),
        None if details.current_target_content.is_none() => {
            println!("  Mergeable  : target document deleted")
        }
        None => {}
    }
    if !pr.description.is_empty() {
        println!();
        println!("{}", pr.description);
    }

    if let Some(conflicts) = &pr.merge_conflicts {
        println!();
        println!(
            "{}",
            style::header(&format!("Last recorded conflicts ({})", conflicts.len()))
        );
        for (i, hunk) in conflicts.iter().enumerate() {
            println!("  #{}", i + 1);
            for line in &hunk.source_lines {
                println!("    {} {}", style::dim("source |"), line);
            }
            for line in &hunk.target_lines {
                println!("    {} {}", style::dim("target |"), line);
            }
        }
    }

    let history = db
        .list_audit_for_pull_request(&pr.id)
        .context("failed to read pull request history")?;
    if !history.is_empty() {
        println!();
        println!("{}", style::header("History"));
        for entry in history {
            println!("  {}  {:<16} {}", entry.created_at, entry.action, entry.actor_id);
        }
    }

    Ok(())
}
