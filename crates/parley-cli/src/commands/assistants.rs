use super::Context;
use super::ask::Relay;
use super::sessions::print_groups;
use anyhow::{Result, bail};
use parley_core::record::{AssistantConfig, SessionConfig};

pub async fn list(ctx: &Context) -> Result<()> {
    let Some(owners) = ctx.services.assistants.list_owners().await else {
        bail!("Assistant store unavailable; see the log for details");
    };
    if owners.is_empty() {
        println!("No assistants yet.");
    }
    for (owner, config) in owners {
        println!("{owner}  {}  {}", config.name, config.description);
    }
    Ok(())
}

pub async fn save(
    ctx: &Context,
    owner: &str,
    name: String,
    description: String,
    system_prompt: String,
) -> Result<()> {
    let backend = &ctx.settings.backend;
    let config = AssistantConfig {
        name,
        description,
        session: SessionConfig {
            system_prompt,
            model_id: backend.default_model.clone(),
            temperature: backend.temperature,
            max_tokens: backend.max_tokens,
        },
    };
    if ctx.services.assistants.save_config(owner, config).await.is_none() {
        bail!("Could not save assistant '{owner}'");
    }
    println!("Saved assistant {owner}");
    Ok(())
}

pub async fn sessions(ctx: &Context, owner: &str) -> Result<()> {
    let Some(groups) = ctx.services.assistants.list_sorted_for_owner(owner).await else {
        bail!("Assistant store unavailable; see the log for details");
    };
    print_groups(&groups);
    Ok(())
}

pub async fn delete(ctx: &Context, owner: &str) -> Result<()> {
    let Some(report) = ctx.services.assistants.delete_owner_and_sessions(owner).await else {
        bail!("Could not read the sessions of '{owner}'; nothing was deleted");
    };
    println!("Deleted {} sessions", report.sessions_deleted);
    if !report.is_complete() {
        bail!(
            "{} sessions could not be deleted; assistant '{owner}' was kept",
            report.failed.len()
        );
    }
    Ok(())
}

/// Asks assistant `owner`, continuing `session` or its active session.
pub async fn ask(
    ctx: &Context,
    owner: &str,
    question: &str,
    session: Option<&str>,
    stream: bool,
) -> Result<()> {
    let assistants = &ctx.services.assistants;
    if let Some(session) = session {
        if assistants.resume_session(owner, session).await.is_none() {
            bail!("'{session}' is not a session of assistant '{owner}'");
        }
    }

    let relay = Relay::start();
    let result = ctx
        .services
        .conversation
        .ask_assistant(
            owner,
            question,
            stream && ctx.settings.backend.stream,
            &relay.updates,
            &relay.cancel,
        )
        .await;
    relay.finish(result).await
}

pub async fn pop(ctx: &Context, owner: &str, session: &str) -> Result<()> {
    match ctx.services.assistants.pop(owner, session).await {
        Some(message) => println!("Removed: {}", message.user),
        None => println!("Nothing to remove."),
    }
    Ok(())
}

pub async fn rollback(ctx: &Context, owner: &str, session: &str, user: &str) -> Result<()> {
    let Some(record) = ctx.services.assistants.rollback(owner, session, user).await else {
        bail!("'{session}' is not a session of assistant '{owner}'");
    };
    println!("{} messages left", record.messages.len());
    Ok(())
}
