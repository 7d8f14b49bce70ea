use super::Context;
use anyhow::{Result, bail};
use chrono::{Local, TimeZone};
use parley_application::SessionSummary;
use parley_core::listing::{RecencyBucket, SessionGroups};
use parley_core::record::{ChatResponse, DbObject, SessionConfig};
use strum::IntoEnumIterator;

const UNAVAILABLE: &str = "Session store unavailable; see the log for details";

fn format_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

pub async fn list(ctx: &Context, json: bool) -> Result<()> {
    let Some(groups) = ctx.services.chats().list_sorted().await else {
        bail!(UNAVAILABLE);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    print_groups(&groups);
    Ok(())
}

/// Prints non-empty buckets in display order.
pub(crate) fn print_groups(groups: &SessionGroups<SessionSummary>) {
    if groups.is_empty() {
        println!("No sessions yet.");
        return;
    }

    for bucket in RecencyBucket::iter() {
        let sessions = groups.bucket(bucket);
        if sessions.is_empty() {
            continue;
        }
        println!("{}", bucket.title());
        for session in sessions {
            println!(
                "  {}  {}  {} msgs  {} tokens  {}",
                session.id,
                format_time(session.last_edited),
                session.message_count,
                session.total_tokens,
                session.name
            );
        }
    }
}

fn print_session(ctx: &Context, record: &DbObject<ChatResponse, SessionConfig>) {
    let placeholder = ctx.settings.stream.placeholder_name.as_str();
    println!("# {}", record.display_name(placeholder));
    println!(
        "id: {}  edited: {}  favorite: {}",
        record.id,
        format_time(record.last_edited),
        record.is_favorite()
    );
    for message in &record.messages {
        println!();
        println!("> {}", message.user);
        println!("{}", message.response.answer);
    }
}

pub async fn show(ctx: &Context, id: &str) -> Result<()> {
    match ctx.services.chats().get(id).await {
        Some(record) => {
            print_session(ctx, &record);
            Ok(())
        }
        None => bail!("Session '{id}' not found"),
    }
}

pub async fn newest(ctx: &Context) -> Result<()> {
    match ctx.services.chats().newest().await {
        Some(record) => print_session(ctx, &record),
        None => println!("No sessions yet."),
    }
    Ok(())
}

pub async fn rename(ctx: &Context, id: &str, name: &str) -> Result<()> {
    let Some(record) = ctx.services.chats().rename_session(id, name).await else {
        bail!("Could not rename session '{id}'");
    };
    println!(
        "Renamed to \"{}\"",
        record.display_name(&ctx.settings.stream.placeholder_name)
    );
    Ok(())
}

pub async fn favorite(ctx: &Context, id: &str, favorite: bool) -> Result<()> {
    if ctx.services.chats().set_favorite(id, favorite).await.is_none() {
        bail!("Could not update session '{id}'");
    }
    println!("{}", if favorite { "Marked as favorite" } else { "Unmarked" });
    Ok(())
}

pub async fn delete(ctx: &Context, id: &str) -> Result<()> {
    if ctx.services.chats().clear(id).await.is_none() {
        bail!("Could not delete session '{id}'");
    }
    println!("Deleted {id}");
    Ok(())
}

pub async fn rollback(ctx: &Context, id: &str, user: &str) -> Result<()> {
    let Some(record) = ctx.services.chats().rollback(id, user).await else {
        bail!("Could not roll back session '{id}'");
    };
    println!("{} messages remain", record.messages.len());
    Ok(())
}

pub async fn pop(ctx: &Context, id: &str) -> Result<()> {
    match ctx.services.chats().pop(id).await {
        Some(message) => println!("Removed \"{}\"", message.user),
        None => println!("Nothing removed"),
    }
    Ok(())
}
