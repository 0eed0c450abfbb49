pub mod app;
pub mod cli;
pub mod filter;
pub mod llm;
pub mod models;
pub mod store;
pub mod tree;
pub mod views;

use app::ChatApp;
use cli::Args;
use log::{ info, warn };
use std::error::Error;
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };

const HELP: &str = "\
Commands:
  /tree                 show the conversation tree
  /branch [node]        start a new branch under a node (default: active)
  /switch <node>        focus a node (id or unique prefix)
  /rename <title>       rename the active node
  /collapse <node>      toggle collapse on a node
  /delete <node>        delete a node and its subtree
  /undo                 restore the most recently deleted subtree
  /search <text>        show nodes matching text
  /export               print the tree as JSON
  /backup               write a backup of the current workspace
  /help                 this text
  /quit                 exit
Anything else is sent to the model on the active branch.";

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Store Type: {}", args.store_type);
    info!("Store Path: {}", args.store_path);
    info!("Workspace: {}", args.workspace);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("-------------------------");

    let mut app = ChatApp::new(&args).await?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(format!("{}\n", HELP).as_bytes()).await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        let output = match command {
            "/quit" | "/exit" => {
                break;
            }
            "/help" => HELP.to_string(),
            "/tree" => app.outline(),
            "/branch" => {
                let parent = if rest.is_empty() { None } else { Some(rest) };
                if app.branch(parent).await? {
                    app.outline()
                } else {
                    format!("No such node: {}", rest)
                }
            }
            "/switch" => {
                if app.switch(rest).await? {
                    format!("Focused {}", rest)
                } else {
                    format!("No such node: {}", rest)
                }
            }
            "/rename" => {
                app.rename(rest).await?;
                app.outline()
            }
            "/collapse" => {
                if app.toggle_collapse(rest).await? {
                    app.outline()
                } else {
                    format!("No such node: {}", rest)
                }
            }
            "/delete" => {
                if app.delete(rest).await? {
                    app.outline()
                } else {
                    format!("Cannot delete: {}", rest)
                }
            }
            "/undo" => {
                if app.undo().await? {
                    app.outline()
                } else {
                    "Nothing to undo".to_string()
                }
            }
            "/search" => app.search(rest),
            "/export" => app.export()?,
            "/backup" => {
                app.backup().await?;
                format!("Backed up workspace '{}'", app.workspace())
            }
            _ => {
                // Everything that is not a command is chat input.
                match app.send_message(line).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Chat completion failed: {}", e);
                        format!("[error] {}", e)
                    }
                }
            }
        };

        stdout.write_all(format!("{}\n", output).as_bytes()).await?;
    }

    info!("Session ended for workspace '{}'", app.workspace());
    Ok(())
}
