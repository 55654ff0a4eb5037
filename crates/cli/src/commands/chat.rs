use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use scoop_agent::{AgentRuntime, IntentRecognizer, NoopRecognizer};
use scoop_core::audit::TracingAuditSink;
use scoop_core::config::{AppConfig, NluConfig};
use scoop_core::domain::conversation::ConversationId;
use scoop_db::{DialogStateRepository, InMemoryDialogStateRepository, SqlDialogStateRepository};
use tracing::{info, warn};

use crate::commands::{
    current_thread_runtime, load_config, open_migrated_pool, CommandResult, StepFailure,
};

pub const DEFAULT_CONVERSATION: &str = "local";
const EXIT_COMMANDS: [&str; 2] = ["/exit", "/quit"];
const USER_PROMPT: &str = "you> ";
const BOT_PREFIX: &str = "bot> ";

#[derive(Clone, Debug)]
pub struct ChatArgs {
    pub conversation: String,
    pub in_memory: bool,
}

pub fn run(args: ChatArgs) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    crate::init_logging(&config.logging);

    let runtime = match current_thread_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let repository = open_repository(&config, args.in_memory).await?;
        let recognizer = build_recognizer(&config.nlu);
        let agent = AgentRuntime::new(repository, recognizer, Arc::new(TracingAuditSink));
        let conversation_id = ConversationId::new(args.conversation);

        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        run_session(&agent, &conversation_id, stdin.lock(), stdout.lock())
            .await
            .map_err(|error| ("session_io", error.to_string(), 6u8))
    });

    match result {
        Ok(turns) => {
            info!(
                event_name = "cli.chat.finished",
                correlation_id = "chat",
                turns,
                "chat session finished"
            );
            CommandResult { exit_code: 0, output: String::new() }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

async fn open_repository(
    config: &AppConfig,
    in_memory: bool,
) -> Result<Arc<dyn DialogStateRepository>, StepFailure> {
    if in_memory {
        return Ok(Arc::new(InMemoryDialogStateRepository::default()));
    }

    let pool = open_migrated_pool(config).await?;
    Ok(Arc::new(SqlDialogStateRepository::new(pool)))
}

/// Falls back to the no-op recognizer when the endpoint cannot be set up.
pub fn build_recognizer(config: &NluConfig) -> Arc<dyn IntentRecognizer> {
    match scoop_agent::build_recognizer(config) {
        Ok(recognizer) => recognizer,
        Err(error) => {
            warn!(
                event_name = "cli.chat.recognizer_unavailable",
                correlation_id = "chat",
                error = %error,
                "order recognition disabled"
            );
            Arc::new(NoopRecognizer)
        }
    }
}

/// Reads one turn per line until EOF or an exit command. Returns the number of turns sent.
pub async fn run_session<R, W>(
    agent: &AgentRuntime,
    conversation_id: &ConversationId,
    input: R,
    mut output: W,
) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut turns = 0;
    write!(output, "{USER_PROMPT}").context("failed to write prompt")?;
    output.flush().context("failed to flush output")?;

    for line in input.lines() {
        let line = line.context("failed to read input")?;
        let text = line.trim();
        if EXIT_COMMANDS.contains(&text) {
            break;
        }
        if !text.is_empty() {
            turns += 1;
            match agent.handle_turn(conversation_id, text).await {
                Ok(reply) => {
                    for message in &reply.messages {
                        writeln!(output, "{BOT_PREFIX}{message}")
                            .context("failed to write reply")?;
                    }
                }
                Err(failure) => {
                    let correlation_id = failure.correlation_id.clone();
                    let error = failure.into_interface();
                    warn!(
                        event_name = "cli.chat.turn_failed",
                        correlation_id = %correlation_id,
                        conversation_id = %conversation_id,
                        error = %error,
                        "turn failed"
                    );
                    writeln!(output, "{BOT_PREFIX}{}", error.user_message())
                        .context("failed to write reply")?;
                }
            }
        }
        write!(output, "{USER_PROMPT}").context("failed to write prompt")?;
        output.flush().context("failed to flush output")?;
    }

    writeln!(output).context("failed to write output")?;
    Ok(turns)
}
