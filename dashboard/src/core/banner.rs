//! Startup banner and step printing

use agentmark::{EvaluationResult, Step, StepType, TrackState, Trajectory};

use super::constants::APP_NAME;
use crate::domain::ErasureView;
use crate::domain::scenarios::is_pinned;
use crate::utils::string::{one_line, truncate_preview};
use crate::utils::terminal::{Style, paint, terminal_link};

// Label width: "Auto-play:" padded for alignment
const W: usize = 12;

/// Print the banner shown before a live run
pub fn print_banner(backend_url: &str, scope: &str, erasure_rate: u32, interval_ms: u64) {
    println!();
    println!(
        "  {} {}",
        paint(Style::Bold, &paint(Style::Cyan, APP_NAME)),
        paint(Style::Dim, &format!("v{}", env!("CARGO_PKG_VERSION")))
    );
    println!();
    println!(
        "  {}  {} {}",
        paint(Style::Green, "➜"),
        paint(Style::Bold, &format!("{:<W$}", "Backend:")),
        terminal_link(backend_url)
    );
    println!(
        "  {}  {} {}",
        paint(Style::Yellow, "➜"),
        paint(Style::Bold, &format!("{:<W$}", "History:")),
        scope
    );
    println!(
        "  {}  {} {}%",
        paint(Style::Yellow, "➜"),
        paint(Style::Bold, &format!("{:<W$}", "Erasure:")),
        erasure_rate
    );
    println!(
        "  {}",
        paint(Style::Dim, &format!("➜  {:<W$} every {} ms", "Auto-play:", interval_ms))
    );
    println!();
}

fn track_line(label: &str, track: &TrackState) -> Option<String> {
    if track.is_hidden {
        return None;
    }
    let body = match track.step_type {
        StepType::Finish => format!(
            "{} {}",
            paint(Style::Green, "finish"),
            one_line(track.final_answer.as_deref().unwrap_or_default())
        ),
        _ if !track.action.is_empty() => format!(
            "{} {}",
            paint(Style::Cyan, &one_line(&track.action)),
            paint(Style::Dim, &truncate_preview(&one_line(&track.tool_details), 80))
        ),
        _ => paint(Style::Dim, &truncate_preview(&one_line(&track.thought), 80)),
    };
    Some(format!("      {:<9} {}", label, body))
}

/// Print one revealed step. Erased steps are struck through.
pub fn print_step(step: &Step, erasure: &ErasureView) {
    let index = format!("#{:<3}", step.step_index);
    let index = if erasure.is_erased(step.step_index) {
        paint(Style::Strike, &paint(Style::Red, &index))
    } else {
        paint(Style::Bold, &index)
    };
    let time = step.timestamp.as_deref().unwrap_or("--:--:--");

    if step.is_user_input() {
        println!(
            "  {} {} {} {}",
            index,
            paint(Style::Dim, time),
            paint(Style::Magenta, "user"),
            one_line(&step.primary.thought)
        );
        return;
    }

    println!("  {} {}", index, paint(Style::Dim, time));
    if let Some(line) = track_line("primary", &step.primary) {
        println!("{}", line);
    }
    if !step.watermark.bits.is_empty() {
        println!("      {:<9} {}", "bits", paint(Style::Yellow, &step.watermark.bits));
    }
    if let Some(line) = step.baseline.as_ref().and_then(|b| track_line("baseline", b)) {
        println!("{}", line);
    }
}

/// Print the erased set for the current cursor
pub fn print_erasure(erasure: &ErasureView) {
    if erasure.rate == 0 {
        return;
    }
    let erased: Vec<String> = erasure.erased.iter().map(|i| i.to_string()).collect();
    println!(
        "  {}",
        paint(
            Style::Dim,
            &format!(
                "erased at {}% through #{}: [{}]",
                erasure.rate,
                erasure.cursor,
                erased.join(", ")
            )
        )
    );
}

/// Print the saved-history list
pub fn print_history(trajectories: &[Trajectory]) {
    if trajectories.is_empty() {
        println!("No saved trajectories.");
        return;
    }
    for trajectory in trajectories {
        let pin = if is_pinned(trajectory) { "*" } else { " " };
        let created = trajectory
            .created_at()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".repeat(16));
        println!(
            "{} {:<40} {} {:>4} steps  {}",
            pin,
            trajectory.id,
            paint(Style::Dim, &created),
            trajectory.steps.len(),
            truncate_preview(&trajectory.title.en, 40)
        );
    }
}

/// Print judge scores for both agents
pub fn print_evaluation(result: &EvaluationResult) {
    println!();
    println!(
        "  {}  {} {:.1}",
        paint(Style::Green, "➜"),
        paint(Style::Bold, &format!("{:<W$}", "Primary:")),
        result.primary_score
    );
    println!(
        "  {}  {} {:.1}",
        paint(Style::Yellow, "➜"),
        paint(Style::Bold, &format!("{:<W$}", "Baseline:")),
        result.baseline_score
    );
    if !result.reason.trim().is_empty() {
        println!();
        println!("  {}", result.reason.trim());
    }
    println!();
}
