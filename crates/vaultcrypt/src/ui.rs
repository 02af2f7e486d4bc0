//! Terminal UI helpers for styled CLI output.
//!
//! Degrades gracefully on non-TTY terminals. Commands that write payload
//! data to stdout only use the stderr helpers.

use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};

pub static CHECK: Emoji<'_, '_> = Emoji("✔ ", "ok ");
pub static CROSS: Emoji<'_, '_> = Emoji("✖ ", "!! ");
pub static KEY: Emoji<'_, '_> = Emoji("🔑 ", "** ");

// ---------------------------------------------------------------------------
// Message helpers
// ---------------------------------------------------------------------------

/// Print a green success message.
pub fn success(msg: &str) {
    println!("{} {}", style(CHECK).green(), style(msg).green().bold());
}

/// Print a red error message to stderr.
pub fn error(msg: &str) {
    eprintln!("{} {}", style(CROSS).red(), style(msg).red().bold());
}

/// Print a section header.
pub fn header(title: &str) {
    println!("\n{} {}", style(KEY).dim(), style(title).bold().underlined());
}

/// Print a key-value pair with styled key.
pub fn kv(key: &str, value: &str) {
    println!("  {:<16} {}", style(format!("{key}:")).dim(), value);
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress bar over `len` chunks, drawn on stderr.
pub fn chunk_progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    // Template is static; a parse failure only loses styling.
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:32.cyan/blue}] {pos}/{len} chunks {msg}")
    {
        pb.set_style(bar_style.progress_chars("=> "));
    }
    pb
}

/// Finish a progress bar with an error message.
///
/// Falls back to direct stderr output when the bar is hidden (piped output).
pub fn progress_error(pb: &ProgressBar, msg: &str) {
    if pb.is_hidden() {
        pb.finish_and_clear();
        error(msg);
    } else {
        pb.abandon_with_message(format!("{} {}", style(CROSS).red(), style(msg).red().bold()));
    }
}
