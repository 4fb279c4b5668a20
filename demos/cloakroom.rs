/// Cloakroom example — a tiny story built in code.
///
/// Foyer → Cloakroom (hang the cloak) → Bar, where a hidden message is
/// revealed by clicking on the hook-styled sawdust. Exercises links, inline
/// continuations, variables, embeds with parameters and enchantment.
///
/// Run with: cargo run --example cloakroom

use passage_engine::core::enchant::{EnchantCommand, EnchantTarget, Enchantment};
use passage_engine::core::engine::{Story, StoryEvent};
use passage_engine::core::library;
use passage_engine::core::thread::{Continuation, OutputEvent, Sequence, Thread};
use passage_engine::schema::output::{Link, OutputKind};
use passage_engine::schema::passage::{Passage, PassageTable};
use passage_engine::schema::value::Value;

fn main() {
    let mut passages = PassageTable::new();

    // --- Foyer: two exits and a remark that depends on the cloak ---
    passages.insert(Passage::new("Foyer", vec!["start".to_string()], || {
        Box::new(
            Sequence::new()
                .text("You are standing in a spacious hall. ")
                .run(|ctx| {
                    let worn = ctx.variables().get("cloak") == Value::Bool(true);
                    let remark = if worn {
                        "Your velvet cloak drinks the light."
                    } else {
                        "Without the cloak the hall looks brighter."
                    };
                    Ok(vec![OutputEvent::text(remark), OutputEvent::line_break()])
                })
                .link("West", "Cloakroom")
                .event(OutputEvent::text(" "))
                .link("South", "Bar"),
        ) as Box<dyn Thread>
    }));

    // --- Cloakroom: an inline link hangs the cloak ---
    passages.insert(Passage::new("Cloakroom", Vec::new(), || {
        let hang = Continuation::new(|| {
            Box::new(Sequence::new().run(|ctx| {
                ctx.variables_mut().set("cloak", Value::Bool(false));
                Ok(vec![OutputEvent::text(" The cloak now hangs on the brass hook.")])
            })) as Box<dyn Thread>
        });
        Box::new(
            Sequence::new()
                .text("A small cloakroom. There is a brass hook here.")
                .event(OutputEvent::link_then(" Hang the cloak.", hang))
                .event(OutputEvent::line_break())
                .link("East", "Foyer"),
        ) as Box<dyn Thread>
    }));

    // --- Bar: embeds a sign with parameters and enchants the sawdust ---
    passages.insert(Passage::new("Bar", Vec::new(), || {
        let read = Continuation::from_events(vec![OutputEvent::text("You have won.")]);
        Box::new(
            Sequence::new()
                .event(OutputEvent::embed_passage("Sign", vec![Value::text("The Bar")]))
                .event(OutputEvent::hook("sawdust"))
                .text("There is a message scrawled in the sawdust.")
                .event(OutputEvent::EndStyle)
                .event(OutputEvent::Enchant(Enchantment::new(
                    EnchantTarget::Hook("sawdust".to_string()),
                    EnchantCommand::Replace,
                    read,
                ))),
        ) as Box<dyn Thread>
    }));

    passages.insert(Passage::new("Sign", Vec::new(), || {
        Box::new(Sequence::new().run(|ctx| {
            let title = library::parameter(ctx, 0);
            Ok(vec![
                OutputEvent::text(format!("[{}] ", ctx.registry().to_text(&title))),
            ])
        })) as Box<dyn Thread>
    }));

    // --- Build and play ---
    let mut story = Story::builder()
        .passages(passages)
        .seed(2026)
        .build()
        .expect("Failed to build story");
    story.variables_mut().set("cloak", Value::Bool(true));
    story.subscribe(|event| {
        if let StoryEvent::StateChanged { from, to } = event {
            println!("  ({:?} -> {:?})", from, to);
        }
    });

    story.begin("Foyer").expect("Failed to begin");
    print_passage(&story);

    for choice in ["West", " Hang the cloak.", "East", "South", "There is a message scrawled in the sawdust."] {
        let link = find_link(&story, choice);
        println!("> {}", choice.trim());
        story.advance(&link).expect("Failed to advance");
        print_passage(&story);
    }

    println!("\nVisited: {}", story.history_names().join(" → "));
}

fn find_link(story: &Story, text: &str) -> Link {
    story
        .links()
        .into_iter()
        .rev()
        .find(|link| link.text == text)
        .cloned()
        .unwrap_or_else(|| panic!("no link '{}'", text))
}

fn print_passage(story: &Story) {
    let from = story.history().last().map_or(0, |entry| entry.output_start);
    let mut line = String::new();
    for record in story.output()[from..].iter().filter(|record| !record.removed) {
        match &record.kind {
            OutputKind::Text { text } => line.push_str(text),
            OutputKind::Link(link) => line.push_str(&format!("[{}]", link.text)),
            OutputKind::LineBreak => line.push('\n'),
            OutputKind::PassageEntry { name, .. } => line.push_str(&format!("\n== {} ==\n", name)),
            _ => {}
        }
    }
    println!("{}\n", line);
}
