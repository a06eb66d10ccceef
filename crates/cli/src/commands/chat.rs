//! `codeloop chat` — Interactive or single-query mode.

use std::io::Write;

use codeloop_agent::{RequestSettings, Session, TurnEvent};
use codeloop_config::AppConfig;
use tokio::io::{self, AsyncBufReadExt, BufReader};

/// What one line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Skip,
    Query(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        Input::Skip
    } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        Input::Exit
    } else {
        Input::Query(line)
    }
}

/// Echo turn progress to the terminal.
fn print_event(event: TurnEvent) {
    match event {
        TurnEvent::Chunk { content } => {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        TurnEvent::NoCode { notice } => println!("\n{notice}"),
        TurnEvent::ExecutionStarted { index, total } => {
            println!("\n\nExecuting code ({}/{total})...\n", index + 1);
        }
        TurnEvent::ExecutionFinished { output, .. } => println!("{output}"),
        TurnEvent::Retrieved { count } => tracing::debug!(count, "Retrieved context"),
        TurnEvent::Persisted { entries } => tracing::debug!(entries, "Store saved"),
    }
}

/// The interactive-mode header, naming the model turns are actually sent to.
fn banner(provider: &str, settings: &RequestSettings, runner: &str, stored: usize) -> String {
    format!(
        "\n  codeloop — interactive mode\n\n  \
         Provider:  {provider}\n  \
         Model:     {}\n  \
         Runner:    {runner}\n  \
         Memory:    {stored} stored chunks\n\n  \
         Type 'exit' or 'quit' to leave.\n",
        settings.model
    )
}

async fn turn(session: &mut Session, query: &str) -> Result<(), codeloop_core::Error> {
    session.run_turn(query, print_event).await?;
    println!();
    Ok(())
}

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let mut session = super::session::build(&config).await?;

    if let Some(query) = message {
        // Single query mode
        turn(&mut session, &query).await?;
        return Ok(());
    }

    println!(
        "{}",
        banner(
            &config.default_provider,
            session.settings(),
            session.runner().name(),
            session.store().len(),
        )
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("Enter your request: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify(&line) {
            Input::Exit => break,
            Input::Skip => continue,
            Input::Query(query) => {
                if let Err(e) = turn(&mut session, query).await {
                    eprintln!("\n  [Error] {e}");
                }
            }
        }
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_are_case_insensitive() {
        assert_eq!(classify("exit"), Input::Exit);
        assert_eq!(classify("  QUIT \n"), Input::Exit);
        assert_eq!(classify("Exit"), Input::Exit);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(classify(""), Input::Skip);
        assert_eq!(classify("   \t"), Input::Skip);
    }

    #[test]
    fn banner_names_the_provider_model_override() {
        let mut config = AppConfig::default();
        config.providers.insert(
            config.default_provider.clone(),
            codeloop_config::ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: Some("qwen2.5-coder".into()),
            },
        );

        let text = banner("ollama", &RequestSettings::from_config(&config), "python3", 3);
        assert!(text.contains("Model:     qwen2.5-coder\n"), "got: {text}");
        assert!(!text.contains(&config.default_model));
        assert!(text.contains("Memory:    3 stored chunks"));
    }

    #[test]
    fn anything_else_is_a_query() {
        assert_eq!(classify(" print 1 to 5 "), Input::Query("print 1 to 5"));
        assert_eq!(classify("exit now"), Input::Query("exit now"));
    }
}
