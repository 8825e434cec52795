//! Terminal output helpers

use tabled::{settings::Style, Table, Tabled};

use pt_session::SessionHandle;

/// Format open tunnels as a table
pub fn format_tunnels(handles: &[SessionHandle]) -> String {
    if handles.is_empty() {
        return "No tunnels open".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "NAMESPACE")]
        namespace: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "REMOTE")]
        remote: u16,
    }

    let rows: Vec<TunnelRow> = handles
        .iter()
        .map(|h| TunnelRow {
            namespace: h.key().namespace.clone(),
            target: h.key().target.clone(),
            local: h
                .ready()
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "-".to_string()),
            remote: h.ports().remote,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a check mark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix, to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
