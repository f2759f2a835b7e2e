use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::resolve::ContextBundle;
use crate::template::{PromptSegment, Role};

fn gauge(label: &str, value: &str) -> String {
    if value.is_empty() {
        format!("  {}: {}", label, "missing".dimmed())
    } else {
        format!("  {}: {} chars", label.bold(), value.chars().count())
    }
}

/// Compact dashboard of what the resolvers actually found, so the user can
/// tell a thin prompt from a rich one before spending a generation call.
pub fn show_context(bundle: &ContextBundle) {
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━ Resolved Context ━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!("{}", gauge("World info (before)", &bundle.world_info_before));
    println!("{}", gauge("World info (after)", &bundle.world_info_after));
    println!("{}", gauge("Character description", &bundle.character_description));
    println!("{}", gauge("Character personality", &bundle.character_personality));
    println!("{}", gauge("Character scenario", &bundle.character_scenario));
    println!("{}", gauge("Chat history", &bundle.chat_history));
    println!("{}", gauge("System prompt", &bundle.system_prompt));
    println!("{}", gauge("Memory summary", &bundle.memory_summary));
    println!("{}", gauge("Author's note", &bundle.authors_note));
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());
}

pub fn show_segments(segments: &[PromptSegment]) {
    println!("\n=== PROMPT ===");
    for (i, s) in segments.iter().enumerate() {
        let tag = match s.role {
            Role::System => "[SYSTEM]".cyan().bold(),
            Role::User => "[USER]".green().bold(),
        };
        println!("{}. {}\n{}\n", i + 1, tag, s.content);
    }
}

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_result_dashboard(text: &str, attempts: u32, elapsed: Duration) {
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━ Outline ━━━━━━━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!(
        "  {}: {}   {}: {:.1}s   {}: {} chars",
        "Attempts".bold(),
        attempts,
        "Time".bold(),
        elapsed.as_secs_f32(),
        "Length".bold(),
        text.chars().count()
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());
    println!("\n{text}\n");
}
