use pins_db::MigrationLog;

const VERSION_W: usize = 12;
const STATUS_W: usize = 9;
const MIN_NAME_W: usize = 24;

/// Render migration log rows as a boxed table of version, name and status.
pub fn render_migration_table(logs: &[MigrationLog]) -> String {
    let name_w = logs
        .iter()
        .map(|l| l.name().chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_NAME_W);
    let version_w = logs
        .iter()
        .map(|l| l.version().chars().count())
        .max()
        .unwrap_or(0)
        .max(VERSION_W);

    let status_w = STATUS_W;

    let rule = |l: &str, m: &str, r: &str| {
        format!(
            "{l}{}{m}{}{m}{}{r}",
            "─".repeat(version_w + 2),
            "─".repeat(name_w + 2),
            "─".repeat(status_w + 2)
        )
    };
    let row = |v: &str, n: &str, s: &str| {
        format!("│ {v:<version_w$} │ {n:<name_w$} │ {s:<status_w$} │")
    };

    let mut lines = vec![
        rule("╭", "┬", "╮"),
        row("Version", "Name", "Status"),
        rule("├", "┼", "┤"),
    ];
    if logs.is_empty() {
        lines.push(row("", "no migrations applied", ""));
    }
    for log in logs {
        lines.push(row(log.version(), log.name(), log.status.as_str()));
    }
    lines.push(rule("╰", "┴", "╯"));
    lines.join("\n")
}
