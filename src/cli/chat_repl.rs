use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::app::App;
use crate::core::dispatcher::{SendOutcome, StreamMessage, UploadFile, UploadOutcome};

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Quit,
    Upload {
        paths: Vec<PathBuf>,
        knowledge_base: bool,
    },
    Message(String),
}

pub fn parse_repl_line(line: &str) -> Result<ReplInput, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ReplInput::Empty);
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(ReplInput::Message(trimmed.to_string()));
    };

    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("quit") | Some("exit") => Ok(ReplInput::Quit),
        Some("upload") => {
            let mut paths = Vec::new();
            let mut knowledge_base = false;
            for part in parts {
                if part == "--kb" {
                    knowledge_base = true;
                } else {
                    paths.push(PathBuf::from(part));
                }
            }
            if paths.is_empty() {
                return Err("Usage: /upload <path>... [--kb]".to_string());
            }
            Ok(ReplInput::Upload {
                paths,
                knowledge_base,
            })
        }
        Some(other) => Err(format!("Unknown command: /{other}")),
        None => Ok(ReplInput::Message(trimmed.to_string())),
    }
}

/// Best-effort MIME type from the file extension.
pub fn mime_for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub async fn run_chat(
    app: &App,
    space_name: &str,
    model: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    app.settings.wait_for_background().await;

    let space = app.store.create_space(space_name);
    let conversation = app
        .store
        .create_conversation(&space.id, None)
        .ok_or("failed to create a conversation")?;
    let model_token = app.pick_model(model).unwrap_or_default();

    println!("Space: {}", space.name);
    match model_token.as_str() {
        "" => println!("Model: (none selected)"),
        token => println!("Model: {token}"),
    }
    println!("{}\n", conversation.messages[0].content);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_repl_line(&line) {
            Ok(ReplInput::Empty) => continue,
            Ok(ReplInput::Quit) => break,
            Ok(ReplInput::Message(text)) => {
                send_and_print(app, &space.id, &conversation.id, &text, &model_token).await?;
            }
            Ok(ReplInput::Upload {
                paths,
                knowledge_base,
            }) => {
                upload_and_print(app, &space.id, &conversation.id, paths, knowledge_base).await?;
            }
            Err(message) => eprintln!("{message}"),
        }
    }

    Ok(())
}

async fn send_and_print(
    app: &App,
    space_id: &str,
    conversation_id: &str,
    text: &str,
    model_token: &str,
) -> Result<(), Box<dyn Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let printer = async {
        let mut stdout = std::io::stdout();
        while let Some(message) = rx.recv().await {
            match message {
                StreamMessage::Chunk(chunk) => {
                    print!("{chunk}");
                    let _ = stdout.flush();
                }
                StreamMessage::Error(_) | StreamMessage::End => println!(),
            }
        }
    };

    let (outcome, ()) = tokio::join!(
        app.dispatcher
            .send_with_events(space_id, conversation_id, text, model_token, tx),
        printer
    );
    debug!(?outcome, "send finished");

    match outcome {
        SendOutcome::Completed { .. } => {}
        SendOutcome::Busy => eprintln!("Still waiting for the previous reply."),
        SendOutcome::NoConversation => eprintln!("The conversation no longer exists."),
        // The transcript already carries the explanation; show it.
        SendOutcome::NoModel | SendOutcome::NoKey { .. } | SendOutcome::Failed { .. } => {
            print_last_message(app, space_id, conversation_id);
        }
    }
    Ok(())
}

async fn upload_and_print(
    app: &App,
    space_id: &str,
    conversation_id: &str,
    paths: Vec<PathBuf>,
    knowledge_base: bool,
) -> Result<(), Box<dyn Error>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                eprintln!("❌ Cannot read {}: {err}", path.display());
                continue;
            }
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut file = UploadFile::new(name, mime_for_path(path), bytes);
        if knowledge_base {
            file = file.into_knowledge_base();
        }
        files.push(file);
    }
    if files.is_empty() {
        return Ok(());
    }

    match app
        .dispatcher
        .upload_files(space_id, conversation_id, files)
        .await
    {
        UploadOutcome::Done(report) => {
            for name in &report.failed {
                eprintln!("⚠️  Upload failed for {name}");
            }
            print_last_message(app, space_id, conversation_id);
        }
        UploadOutcome::Busy => eprintln!("Still waiting for the previous reply."),
        UploadOutcome::NoConversation => eprintln!("The conversation no longer exists."),
    }
    Ok(())
}

fn print_last_message(app: &App, space_id: &str, conversation_id: &str) {
    if let Some(message) = app
        .store
        .conversation(space_id, conversation_id)
        .and_then(|conversation| conversation.last_message().cloned())
    {
        println!("{}", message.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse_repl_line("  what is RAG?  "),
            Ok(ReplInput::Message("what is RAG?".to_string()))
        );
        assert_eq!(parse_repl_line("   "), Ok(ReplInput::Empty));
    }

    #[test]
    fn upload_collects_paths_and_kb_flag() {
        assert_eq!(
            parse_repl_line("/upload a.pdf --kb notes.txt"),
            Ok(ReplInput::Upload {
                paths: vec![PathBuf::from("a.pdf"), PathBuf::from("notes.txt")],
                knowledge_base: true,
            })
        );
        assert!(parse_repl_line("/upload --kb").is_err());
    }

    #[test]
    fn quit_and_unknown_commands() {
        assert_eq!(parse_repl_line("/quit"), Ok(ReplInput::Quit));
        assert_eq!(
            parse_repl_line("/bogus"),
            Err("Unknown command: /bogus".to_string())
        );
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_for_path(Path::new("Report.PDF")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("data")), "application/octet-stream");
        assert_eq!(mime_for_path(Path::new("scan.jpeg")), "image/jpeg");
    }
}
