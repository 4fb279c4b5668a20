/// Story Linter — static checks on RON story files.
///
/// Usage: story_linter <story_file_or_dir> [--start <passage>]

use passage_engine::core::script::{nested_steps, ScriptSet, ScriptStep};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story_file_or_dir> [--start <passage>]");
        process::exit(0);
    }

    let story_path = Path::new(&args[1]);
    let mut start = "Start".to_string();

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--start" && i + 1 < args.len() {
            i += 1;
            start = args[i].clone();
        }
        i += 1;
    }

    // Files are kept apart so names repeated across files can be reported
    let mut files: Vec<(String, ScriptSet)> = Vec::new();
    if story_path.is_file() {
        match ScriptSet::load_from_ron(story_path) {
            Ok(set) => files.push((story_path.display().to_string(), set)),
            Err(e) => {
                eprintln!("ERROR: Failed to load story file: {}", e);
                process::exit(1);
            }
        }
    } else if story_path.is_dir() {
        load_stories_recursive(story_path, &mut files);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", story_path.display());
        process::exit(1);
    }

    let passage_count: usize = files.iter().map(|(_, set)| set.passages.len()).sum();
    println!("Loaded {} passages from {} files", passage_count, files.len());

    let (errors, warnings) = lint_stories(&files, &start);

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_stories_recursive(dir: &Path, files: &mut Vec<(String, ScriptSet)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            load_stories_recursive(&path, files);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            match ScriptSet::load_from_ron(&path) {
                Ok(set) => {
                    println!("  Loaded: {}", path.display());
                    files.push((path.display().to_string(), set));
                }
                Err(e) => {
                    eprintln!("  ERROR loading {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Passages a step list can lead to, by link, embed or go-to.
fn collect_targets<'a>(steps: &'a [ScriptStep], targets: &mut Vec<(&'static str, &'a str)>) {
    for step in steps {
        match step {
            ScriptStep::Link { target, .. } => targets.push(("link", target.as_str())),
            ScriptStep::Embed { passage, .. } => targets.push(("embed", passage.as_str())),
            ScriptStep::GoTo(passage) => targets.push(("go-to", passage.as_str())),
            _ => {}
        }
        for nested in nested_steps(step) {
            collect_targets(nested, targets);
        }
    }
}

fn lint_stories(files: &[(String, ScriptSet)], start: &str) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Check 1: duplicate passage names across files
    let mut owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (file, set) in files {
        for name in set.passages.keys() {
            owners.entry(name.as_str()).or_default().push(file.as_str());
        }
    }
    for (name, in_files) in &owners {
        if in_files.len() > 1 {
            errors.push(format!(
                "Passage '{}' is defined {} times ({})",
                name,
                in_files.len(),
                in_files.join(", ")
            ));
        }
    }

    // Check 2: targets that name no passage
    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (_, set) in files {
        for (name, passage) in &set.passages {
            if passage.steps.is_empty() {
                warnings.push(format!("Passage '{}' has no steps", name));
            }
            let mut targets = Vec::new();
            collect_targets(&passage.steps, &mut targets);
            for (via, target) in &targets {
                if !owners.contains_key(target) {
                    errors.push(format!(
                        "Passage '{}' has a {} to unknown passage '{}'",
                        name, via, target
                    ));
                }
            }
            edges
                .entry(name.as_str())
                .or_default()
                .extend(targets.into_iter().map(|(_, target)| target));
        }
    }

    // Check 3: passages that cannot be reached from the start passage
    if !owners.contains_key(start) {
        errors.push(format!("Start passage '{}' is not defined", start));
        return (errors, warnings);
    }
    let mut reached: BTreeSet<&str> = BTreeSet::new();
    let mut frontier = vec![start];
    while let Some(name) = frontier.pop() {
        if !reached.insert(name) {
            continue;
        }
        if let Some(next) = edges.get(name) {
            frontier.extend(next.iter().copied());
        }
    }
    for name in owners.keys() {
        if !reached.contains(name) {
            warnings.push(format!("Passage '{}' is unreachable from '{}'", name, start));
        }
    }

    (errors, warnings)
}
