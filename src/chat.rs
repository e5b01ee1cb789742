// Terminal front end: ask for goals one line at a time and print each plan.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::controller::ActionController;

const COPY_COMMAND: &str = "/copy";

/// Runs until an empty line or end of input. Returns the last plan produced.
pub async fn run_planning_chat<R, W>(
    controller: &ActionController,
    input: R,
    mut output: W,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Starting planning chat...");
    let mut lines = input.lines();
    let mut last_plan = None;

    loop {
        output
            .write_all(b"Your goal (/copy to copy the last plan, empty line to quit):\n> ")
            .await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        if line == COPY_COMMAND {
            let message = if controller.copy_result() {
                "Plan copied to clipboard.\n"
            } else {
                "Nothing to copy yet.\n"
            };
            output.write_all(message.as_bytes()).await?;
            continue;
        }

        controller.update_goal(line);
        output.write_all(b"Processing...\n").await?;
        match controller.generate().await {
            Ok(plan) => {
                output.write_all(format!("\n{}\n\n", plan).as_bytes()).await?;
                last_plan = Some(plan);
            }
            Err(e) => {
                output.write_all(format!("Error: {}\n", e).as_bytes()).await?;
            }
        }
    }

    output.flush().await?;
    info!("Planning chat finished.");
    Ok(last_plan)
}
