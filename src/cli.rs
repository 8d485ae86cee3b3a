//! Client-side commands: spawn the server binary as an MCP child process,
//! call one tool and print the result as JSON.

use anyhow::{Context, Result, bail};
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Map, Value};
use tokio::process::Command;

async fn run_tool(tool: &'static str, arguments: Option<Map<String, Value>>) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate the server binary")?;
    let transport = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
        cmd.arg("serve");
    }))?;
    let service = ()
        .serve(transport)
        .await
        .context("failed to start the MCP server process")?;

    let result = service
        .call_tool(CallToolRequestParam {
            name: tool.into(),
            arguments,
        })
        .await
        .with_context(|| format!("tool call {} failed", tool))?;

    let failed = result.is_error.unwrap_or(false);
    println!("{}", serde_json::to_string_pretty(&result)?);

    service.cancel().await?;
    if failed {
        bail!("tool {} reported an error", tool);
    }
    Ok(())
}

pub async fn calendars() -> Result<()> {
    run_tool("get_calendars", None).await
}

pub async fn events(calendar_id: &str) -> Result<()> {
    let args = serde_json::json!({ "calendar_id": calendar_id });
    run_tool("get_events", args.as_object().cloned()).await
}
