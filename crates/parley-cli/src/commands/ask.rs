use super::Context;
use anyhow::{Result, bail};
use parley_application::AskOutcome;
use parley_core::record::SessionConfig;
use parley_core::stream::{AssemblerState, StreamSnapshot};
use std::io::Write;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct AskOptions {
    pub question: String,
    pub session: Option<String>,
    pub stream: bool,
    pub model: Option<String>,
    pub system: Option<String>,
}

/// Request settings: the session's own config when continuing one, the
/// backend defaults otherwise, with flags on top.
async fn request_config(ctx: &Context, options: &AskOptions) -> Result<SessionConfig> {
    let backend = &ctx.settings.backend;
    let mut config = SessionConfig {
        model_id: backend.default_model.clone(),
        temperature: backend.temperature,
        max_tokens: backend.max_tokens,
        ..SessionConfig::default()
    };

    if let Some(id) = &options.session {
        let Some(record) = ctx.services.chats().get(id).await else {
            bail!("Session '{id}' not found");
        };
        config = record.config;
    }
    if let Some(model) = &options.model {
        config.model_id = Some(model.clone());
    }
    if let Some(system) = &options.system {
        config.system_prompt = system.clone();
    }
    Ok(config)
}

/// Writes the part of each snapshot's answer not written yet to `out`.
///
/// Returns how many bytes of the answer were handed to `out`. Write and
/// flush failures are logged; the caller still prints what is missing once
/// the answer is complete.
async fn echo<W: Write>(mut updates: watch::Receiver<StreamSnapshot>, mut out: W) -> usize {
    let mut printed = 0;
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        if let Some(fresh) = snapshot.answer.get(printed..) {
            match out.write_all(fresh.as_bytes()) {
                Ok(()) => printed = snapshot.answer.len(),
                Err(e) => tracing::debug!(error = %e, "Failed to write answer to stdout"),
            }
            if let Err(e) = out.flush() {
                tracing::debug!(error = %e, "Failed to flush stdout");
            }
        }
        if snapshot.state == AssemblerState::Failed {
            break;
        }
    }
    printed
}

/// Streams snapshots to stdout while a question is in flight; Ctrl-C
/// cancels it.
pub(crate) struct Relay {
    pub updates: watch::Sender<StreamSnapshot>,
    pub cancel: CancellationToken,
    printer: JoinHandle<usize>,
}

impl Relay {
    pub fn start() -> Self {
        let (updates, rx) = watch::channel(StreamSnapshot::default());
        let printer = tokio::spawn(echo(rx, std::io::stdout()));

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        Self {
            updates,
            cancel,
            printer,
        }
    }

    /// Waits for the printer, then prints what it missed and a status line.
    pub async fn finish(self, result: parley_core::error::Result<AskOutcome>) -> Result<()> {
        drop(self.updates);
        let printed = self.printer.await.unwrap_or(0);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                println!();
                bail!("Cancelled; nothing was saved");
            }
            Err(e) => {
                println!();
                return Err(e.into());
            }
        };

        if let Some(rest) = outcome.response.answer.get(printed..) {
            print!("{rest}");
        }
        println!();
        eprintln!(
            "[{} {} | {} tokens]",
            if outcome.created { "new session" } else { "session" },
            outcome.session_id,
            outcome.response.tokens + outcome.response.user_tokens
        );
        Ok(())
    }
}

pub async fn run(ctx: &Context, options: AskOptions) -> Result<()> {
    let config = request_config(ctx, &options).await?;
    ctx.services.chats().set_active(options.session.clone()).await;

    let relay = Relay::start();
    let result = ctx
        .services
        .conversation
        .ask(
            &options.question,
            &config,
            options.stream && ctx.settings.backend.stream,
            &relay.updates,
            &relay.cancel,
        )
        .await;
    relay.finish(result).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Keeps what is written and fails every flush, like a closed pipe.
    #[derive(Default)]
    struct BrokenFlush {
        written: Vec<u8>,
        flushes: usize,
    }

    impl Write for BrokenFlush {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    fn streaming(answer: &str) -> StreamSnapshot {
        StreamSnapshot {
            state: AssemblerState::Streaming,
            answer: answer.to_string(),
            ..StreamSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_echo_survives_failed_flush() {
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let mut out = BrokenFlush::default();

        let writer = async {
            tx.send_replace(streaming("Hel"));
            tokio::task::yield_now().await;
            tx.send_replace(streaming("Hello"));
            tokio::task::yield_now().await;
            drop(tx);
        };
        let (printed, ()) = tokio::join!(echo(rx, &mut out), writer);

        assert_eq!(printed, "Hello".len());
        assert_eq!(String::from_utf8(out.written).unwrap(), "Hello");
        assert!(out.flushes >= 1);
    }
}
