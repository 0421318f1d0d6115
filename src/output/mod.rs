//! Styled terminal output for cloudport
//!
//! Messages go to stdout, errors to stderr. Logs are separate and always go
//! to stderr through `tracing`.

use owo_colors::OwoColorize;

/// Print a success message with a green checkmark
pub fn success(message: &str) {
    // Pastel mint green: RGB(152, 225, 152)
    println!(
        "{} {}",
        "✓".truecolor(152, 225, 152).bold(),
        message.bright_white()
    );
}

/// Print an error message with a red X
pub fn error(message: &str) {
    // Pastel coral/salmon: RGB(255, 160, 160)
    eprintln!(
        "{} {}",
        "✗".truecolor(255, 160, 160).bold(),
        message.bright_white()
    );
}

/// Print a warning message with a yellow warning symbol
pub fn warning(message: &str) {
    // Pastel cream/yellow: RGB(255, 230, 160)
    println!(
        "{} {}",
        "⚠".truecolor(255, 230, 160).bold(),
        message.bright_white()
    );
}

/// Print an info message with a blue info symbol
pub fn info(message: &str) {
    // Pastel sky blue: RGB(160, 200, 255)
    println!(
        "{} {}",
        "ℹ".truecolor(160, 200, 255).bold(),
        message.bright_white()
    );
}

/// Print a section header with a separator line
pub fn section(title: &str) {
    // Pastel lavender: RGB(181, 174, 254)
    println!("\n{}", title.truecolor(181, 174, 254).bold());
    println!("{}", "─".repeat(50).truecolor(160, 160, 160));
}

/// Print a key-value pair with styled key and value
pub fn key_value(key: &str, value: &str) {
    println!(
        "  {} {}",
        format!("{}:", key).truecolor(160, 160, 160),
        value.bright_white()
    );
}

/// Print a dimmed/muted message
pub fn dimmed(message: &str) {
    println!("{}", message.truecolor(160, 160, 160));
}

/// Print a blank line for spacing
pub fn blank() {
    println!();
}

/// Print one item line, colored by its status
pub fn item_status(status: &str, text: &str) {
    let badge = format!("{:<11}", status);
    let styled = match status {
        "imported" => badge.truecolor(152, 225, 152).bold().to_string(),
        "errored" => badge.truecolor(255, 160, 160).bold().to_string(),
        "skipped" => badge.truecolor(160, 160, 160).to_string(),
        "validated" | "importing" => badge.truecolor(160, 200, 255).bold().to_string(),
        _ => badge.truecolor(255, 230, 160).to_string(),
    };
    println!("  {} {}", styled, text.bright_white());
}

/// Print a tool availability check
pub fn status_check(item: &str, available: bool) {
    if available {
        println!(
            "  {} {} {}",
            "✓".truecolor(152, 225, 152).bold(),
            item.bright_white(),
            "available".truecolor(160, 160, 160)
        );
    } else {
        println!(
            "  {} {} {}",
            "✗".truecolor(255, 160, 160).bold(),
            item.bright_white(),
            "not found".truecolor(160, 160, 160)
        );
    }
}
