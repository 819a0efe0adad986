mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use reqflow_core::{
    apply, determine_store_path, reorder, session_path_for, AiClient, ApplyCounts, IncomingItem,
    Planner, PlannerConfig, ProjectStore, ResolutionSession, Section, Storage,
};

use crate::cli::{Cli, Command};

/// Input format for a meeting's extracted items
#[derive(Debug, Deserialize)]
struct MeetingFile {
    #[serde(default)]
    meeting_id: Option<Uuid>,
    items: Vec<MeetingItemInput>,
}

#[derive(Debug, Deserialize)]
struct MeetingItemInput {
    section: Section,
    content: String,
    #[serde(default)]
    source_quote: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let store_path = determine_store_path(cli.file.as_deref())?;
    let storage = Storage::new(&store_path);
    let session_path = session_path_for(&store_path);

    match &cli.command {
        Command::Init { name } => {
            init_project(&storage, name.as_deref())?;
        }
        Command::Plan {
            meeting,
            concurrency,
        } => {
            plan_meeting(&storage, &session_path, meeting, *concurrency)?;
        }
        Command::Status => {
            show_status(&session_path)?;
        }
        Command::Resolve { accept_recommended } => {
            resolve_session(&session_path, *accept_recommended)?;
        }
        Command::Apply => {
            apply_session(&storage, &session_path)?;
        }
        Command::Discard { yes } => {
            discard_session(&session_path, *yes)?;
        }
        Command::List { section } => {
            list_items(&storage, section.as_deref())?;
        }
        Command::Show { id } => {
            show_item(&storage, id)?;
        }
        Command::Edit { id, content } => {
            edit_item(&storage, id, content.as_deref())?;
        }
        Command::Del { id, yes } => {
            delete_item(&storage, id, *yes)?;
        }
        Command::Reorder { section, ids } => {
            reorder_section(&storage, section, ids)?;
        }
    }

    Ok(())
}

fn init_project(storage: &Storage, name: Option<&str>) -> Result<()> {
    if storage.path().exists() {
        anyhow::bail!("Project store already exists: {}", storage.path().display());
    }
    let mut store = ProjectStore::new();
    if let Some(name) = name {
        store.name = name.to_string();
    }
    storage.save(&store)?;
    println!(
        "{} {}",
        "Created project store".green(),
        storage.path().display()
    );
    Ok(())
}

fn plan_meeting(
    storage: &Storage,
    session_path: &Path,
    meeting_path: &PathBuf,
    concurrency: usize,
) -> Result<()> {
    if session_path.exists() {
        anyhow::bail!(
            "A pending session already exists ({}). Apply or discard it before planning again.",
            session_path.display()
        );
    }

    let content = std::fs::read_to_string(meeting_path)
        .with_context(|| format!("Failed to read meeting file: {}", meeting_path.display()))?;
    let meeting: MeetingFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse meeting file: {}", meeting_path.display()))?;

    let items: Vec<IncomingItem> = meeting
        .items
        .into_iter()
        .map(|input| {
            let mut item = IncomingItem::new(input.section, input.content);
            item.source_quote = input.source_quote;
            item.speaker = input.speaker;
            item
        })
        .collect();

    let client = AiClient::new();
    if !client.is_available() {
        anyhow::bail!(
            "AI integration not available ({}). Planning needs the semantic matcher.",
            client.mode_description()
        );
    }

    let store = storage.load()?;
    let planner = Planner::with_config(
        &client,
        PlannerConfig {
            max_concurrency: concurrency,
        },
    );
    let meeting_id = meeting.meeting_id.unwrap_or_else(Uuid::new_v4);
    let plan = planner.plan(meeting_id, &items, &store.items)?;

    let session = ResolutionSession::new(plan);
    save_session(session_path, &session)?;

    print_plan_summary(&session);
    if session.plan().conflicts.is_empty() {
        println!("{}", "No conflicts - run `reqflow apply` to commit.".green());
    } else {
        println!(
            "{}",
            "Run `reqflow resolve` to decide the conflicts, then `reqflow apply`.".yellow()
        );
    }
    Ok(())
}

fn print_plan_summary(session: &ResolutionSession) {
    let plan = session.plan();
    println!(
        "Planned {} item(s): {} to add, {} skipped as duplicates, {} conflicting",
        plan.total_items(),
        plan.added.len().to_string().green(),
        plan.skipped.len().to_string().cyan(),
        plan.conflicts.len().to_string().yellow(),
    );
    for skipped in &plan.skipped {
        println!("  {} {} ({})", "skip:".cyan(), skipped.item.content, skipped.reason);
    }
    for (idx, conflict) in plan.conflicts.iter().enumerate() {
        prompts::print_conflict(conflict, idx, plan.conflicts.len());
    }
}

fn show_status(session_path: &Path) -> Result<()> {
    let session = load_session(session_path)?;
    print_plan_summary(&session);
    let unresolved = session.unresolved().len();
    if unresolved == 0 {
        println!("{}", "All conflicts resolved - ready to apply.".green());
    } else {
        println!("{} conflict(s) still unresolved.", unresolved.to_string().yellow());
    }
    Ok(())
}

fn resolve_session(session_path: &Path, accept_recommended: bool) -> Result<()> {
    let mut session = load_session(session_path)?;

    if accept_recommended {
        let filled = session.bulk_accept_recommended();
        println!("Accepted {} recommendation(s).", filled);
    } else {
        let client = AiClient::new();
        let total = session.plan().conflicts.len();
        loop {
            let unresolved: Vec<_> = session.unresolved().iter().map(|c| (*c).clone()).collect();
            let Some(conflict) = unresolved.first() else {
                break;
            };
            let resolved_so_far = total - unresolved.len();
            prompts::print_conflict(conflict, resolved_so_far, total);
            match prompts::prompt_conflict_decision(conflict, &client)? {
                Some(decision) => {
                    session.set_decision(conflict.item.id, decision)?;
                }
                None => break, // user deferred; stop prompting
            }
        }
    }

    save_session(session_path, &session)?;
    if session.is_complete() {
        println!("{}", "All conflicts resolved - run `reqflow apply`.".green());
    } else {
        println!(
            "{} conflict(s) still unresolved.",
            session.unresolved().len().to_string().yellow()
        );
    }
    Ok(())
}

fn apply_session(storage: &Storage, session_path: &Path) -> Result<()> {
    let session = load_session(session_path)?;
    let decisions = session.to_decision_list()?;
    let plan = session.plan().clone();

    let (_, counts) = storage.update_atomically(|store| apply(&plan, &decisions, store))?;

    // The session is spent once the commit succeeded
    std::fs::remove_file(session_path)
        .with_context(|| format!("Failed to remove session file: {}", session_path.display()))?;

    print_counts(&counts);
    Ok(())
}

fn print_counts(counts: &ApplyCounts) {
    println!("{}", "Applied.".green().bold());
    println!("  added:         {}", counts.added);
    println!("  skipped:       {}", counts.skipped);
    println!("  kept existing: {}", counts.kept_existing);
    println!("  replaced:      {}", counts.replaced);
    println!("  kept both:     {}", counts.kept_both);
    println!("  merged:        {}", counts.merged);
}

fn discard_session(session_path: &Path, yes: bool) -> Result<()> {
    if !session_path.exists() {
        println!("No pending session.");
        return Ok(());
    }
    if !yes && !prompts::confirm("Discard the pending session?")? {
        return Ok(());
    }
    std::fs::remove_file(session_path)?;
    println!("{}", "Session discarded - nothing was applied.".yellow());
    Ok(())
}

fn list_items(storage: &Storage, section_filter: Option<&str>) -> Result<()> {
    let store = storage.load()?;
    let filter = match section_filter {
        Some(s) => Some(parse_section(s)?),
        None => None,
    };

    for section in Section::all() {
        if filter.is_some_and(|f| f != *section) {
            continue;
        }
        let items = store.items_in_section(*section);
        if items.is_empty() {
            continue;
        }
        println!("{}", section.title().bold().underline());
        for item in items {
            let short_id = &item.id.to_string()[..8];
            let history = if item.history_count > 0 {
                format!(" (revised x{})", item.history_count).dimmed().to_string()
            } else {
                String::new()
            };
            println!("  {}. [{}] {}{}", item.order, short_id, item.content, history);
        }
        println!();
    }
    Ok(())
}

fn show_item(storage: &Storage, id: &str) -> Result<()> {
    let store = storage.load()?;
    let item = resolve_item_id(&store, id)?;
    let item = store.find_item(item).context("Item disappeared")?;

    println!("{}", item.content.bold());
    println!("  id:       {}", item.id);
    println!("  section:  {}", item.section);
    println!("  order:    {}", item.order);
    println!("  revised:  {} time(s)", item.history_count);
    for sref in &item.source_refs {
        let speaker = sref.speaker.as_deref().unwrap_or("unknown speaker");
        match &sref.quote {
            Some(quote) => println!("  source:   {} - \"{}\"", speaker, quote),
            None => println!("  source:   {} (meeting {})", speaker, sref.meeting_id),
        }
    }
    if !item.history.is_empty() {
        println!("  {}", "history:".underline());
        for entry in item.history.iter().rev() {
            println!(
                "    {} {} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.action,
                entry.previous_content.dimmed()
            );
        }
    }
    Ok(())
}

fn edit_item(storage: &Storage, id: &str, content: Option<&str>) -> Result<()> {
    let store = storage.load()?;
    let item_id = resolve_item_id(&store, id)?;

    let new_content = match content {
        Some(c) => c.to_string(),
        None => {
            let current = store
                .find_item(item_id)
                .map(|i| i.content.clone())
                .unwrap_or_default();
            inquire::Editor::new("Content:")
                .with_predefined_text(&current)
                .prompt()?
        }
    };
    if new_content.trim().is_empty() {
        anyhow::bail!("Content cannot be empty");
    }

    storage.update_atomically(|store| {
        if store.edit_content(item_id, new_content.clone()) {
            Ok(())
        } else {
            Err(reqflow_core::ReconcileError::Validation(format!(
                "item {} not found",
                item_id
            )))
        }
    })?;
    println!("{}", "Updated.".green());
    Ok(())
}

fn delete_item(storage: &Storage, id: &str, yes: bool) -> Result<()> {
    let store = storage.load()?;
    let item_id = resolve_item_id(&store, id)?;
    let content = store
        .find_item(item_id)
        .map(|i| i.content.clone())
        .unwrap_or_default();

    if !yes && !prompts::confirm(&format!("Delete \"{}\"?", content))? {
        return Ok(());
    }

    storage.update_atomically(|store| {
        if store.delete_item(item_id) {
            Ok(())
        } else {
            Err(reqflow_core::ReconcileError::Validation(format!(
                "item {} not found",
                item_id
            )))
        }
    })?;
    println!("{}", "Deleted.".green());
    Ok(())
}

fn reorder_section(storage: &Storage, section: &str, ids: &[String]) -> Result<()> {
    let section = parse_section(section)?;
    let store = storage.load()?;
    let id_order: Vec<Uuid> = ids
        .iter()
        .map(|id| resolve_item_id(&store, id))
        .collect::<Result<_>>()?;

    storage.update_atomically(|store| reorder(store, section, &id_order))?;
    println!("{}", "Reordered.".green());
    Ok(())
}

fn parse_section(s: &str) -> Result<Section> {
    Section::from_str(s).ok_or_else(|| {
        let valid: Vec<String> = Section::all().iter().map(|s| s.to_string()).collect();
        anyhow::anyhow!("Unknown section '{}'. Valid sections: {}", s, valid.join(", "))
    })
}

/// Accepts a full UUID or an unambiguous id prefix
fn resolve_item_id(store: &ProjectStore, id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        if store.find_item(uuid).is_some() {
            return Ok(uuid);
        }
        anyhow::bail!("No item with id {}", uuid);
    }

    let matches: Vec<Uuid> = store
        .items
        .iter()
        .filter(|i| i.id.to_string().starts_with(id))
        .map(|i| i.id)
        .collect();
    match matches.as_slice() {
        [unique] => Ok(*unique),
        [] => anyhow::bail!("No item with id prefix '{}'", id),
        _ => anyhow::bail!("Id prefix '{}' is ambiguous ({} matches)", id, matches.len()),
    }
}

fn load_session(session_path: &Path) -> Result<ResolutionSession> {
    if !session_path.exists() {
        anyhow::bail!("No pending session. Run `reqflow plan <meeting.yaml>` first.");
    }
    let content = std::fs::read_to_string(session_path)
        .with_context(|| format!("Failed to read session file: {}", session_path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse session file: {}", session_path.display()))
}

fn save_session(session_path: &Path, session: &ResolutionSession) -> Result<()> {
    if let Some(parent) = session_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(session)?;
    std::fs::write(session_path, yaml)
        .with_context(|| format!("Failed to write session file: {}", session_path.display()))
}
