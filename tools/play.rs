/// Play — interactive console player for RON stories.
///
/// Usage: play --story <file_or_dir> [--config <path>] [--seed <n>] [--start <passage>]
///
/// Commands:
///   <n>          — follow link number n
///   resume       — continue after a wait
///   undo [n]     — rewind to history entry n (default: the previous one)
///   history      — list visited passages
///   vars         — show variables
///   help         — list commands
///   quit         — exit
///
/// Set RUST_LOG=passage_engine=debug to trace engine decisions.

use passage_engine::core::engine::{Story, StoryError, StoryState};
use passage_engine::schema::output::{Link, Output, OutputKind};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut config_path = None;
    let mut seed = None;
    let mut start = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(story_path) = story_path else {
        eprintln!("Missing --story");
        print_usage();
        std::process::exit(1);
    };

    let mut builder = Story::builder();
    builder = if Path::new(&story_path).is_dir() {
        builder.script_dir(&story_path)
    } else {
        builder.script_file(&story_path)
    };
    if let Some(ref path) = config_path {
        builder = builder.config_file(path);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }

    let mut story = match builder.build() {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    println!("Loaded {} passages", story.passages().len());
    println!("Type 'help' for commands.\n");

    let started = match start {
        Some(ref name) => story.begin(name),
        None => story.begin_default(),
    };
    report(&story, started);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "resume" | "r" => {
                let result = story.resume();
                report(&story, result);
            }
            "undo" | "u" => {
                let len = story.history().len();
                let target = match parts.get(1) {
                    Some(n) => match n.parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => {
                            println!("Invalid history index: {}", n);
                            continue;
                        }
                    },
                    None => len.saturating_sub(2),
                };
                let result = story.rewind(target);
                report(&story, result);
            }
            "history" => {
                for (i, name) in story.history_names().iter().enumerate() {
                    println!("  {}: {}", i, name);
                }
            }
            "vars" => {
                let vars = story.variables();
                if vars.is_empty() {
                    println!("  (no variables)");
                }
                for name in vars.names() {
                    println!("  {} = {}", name, story.registry().to_text(&vars.get(name)));
                }
            }
            number => {
                let links = passage_links(&story);
                match number.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= links.len() => {
                        let result = story.advance(&links[n - 1]);
                        report(&story, result);
                    }
                    _ => println!("Unknown command: {}. Type 'help' for commands.", number),
                }
            }
        }
    }
}

/// Redraw the current passage's live output, then the available links.
/// Enchantments rewrite earlier records, so the passage is drawn whole.
fn report(story: &Story, result: Result<(), StoryError>) {
    if let Err(e) = result {
        println!("ERROR: {}", e);
    }

    let mut text = String::new();
    for record in current_passage(story) {
        match &record.kind {
            OutputKind::Text { text: t } => text.push_str(t),
            OutputKind::Link(link) => {
                text.push('[');
                text.push_str(&link.text);
                text.push(']');
            }
            OutputKind::LineBreak => text.push('\n'),
            OutputKind::PassageEntry { name, .. } => {
                text.push_str(&format!("--- {} ---\n", name));
            }
            OutputKind::StyleMarker { .. } | OutputKind::Embed(_) => {}
        }
    }
    println!("\n{}\n", text);

    let links = passage_links(story);
    for (i, link) in links.iter().enumerate() {
        let marker = if link.enchantment.is_some() { "*" } else { " " };
        println!(" {}{}. {}", marker, i + 1, link.text);
    }
    match story.state() {
        StoryState::Paused => println!("(waiting; type 'resume')"),
        StoryState::Complete if links.is_empty() => println!("(the end)"),
        _ => {}
    }
}

fn current_passage(story: &Story) -> impl Iterator<Item = &Output> {
    let from = story.history().last().map_or(0, |entry| entry.output_start);
    story.output()[from..].iter().filter(|record| !record.removed)
}

fn passage_links(story: &Story) -> Vec<Link> {
    current_passage(story).filter_map(Output::as_link).cloned().collect()
}

fn print_usage() {
    println!("Usage: play --story <file_or_dir> [--config <path>] [--seed <n>] [--start <passage>]");
}

fn print_help() {
    println!("Commands:");
    println!("  <n>          follow link number n (* marks clickable text)");
    println!("  resume       continue after a wait");
    println!("  undo [n]     rewind to history entry n (default: previous passage)");
    println!("  history      list visited passages");
    println!("  vars         show variables");
    println!("  help         list commands");
    println!("  quit         exit");
}
