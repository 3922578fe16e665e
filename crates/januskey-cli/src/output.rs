//! Terminal output styling for jk

use colored::{ColoredString, Colorize};
use januskey::{OpKind, OpRecord};

/// Prefix used for all jk status output
pub fn prefix() -> ColoredString {
    "[jk]".truecolor(0, 153, 153)
}

/// Kind marker, colored by effect direction.
pub fn kind_marker(kind: OpKind) -> ColoredString {
    match kind {
        OpKind::Create | OpKind::Mkdir | OpKind::Symlink => "+".green(),
        OpKind::Delete | OpKind::Rmdir => "-".red(),
        OpKind::Modify | OpKind::Append | OpKind::Truncate | OpKind::Chmod | OpKind::Touch => {
            "~".yellow()
        }
        OpKind::Move | OpKind::Copy => ">".cyan(),
    }
}

/// One history line: id, marker, kind, path(s), undone flag.
pub fn history_line(op: &OpRecord) -> String {
    let id = format!("{:>6}", op.id).white().bold();
    let kind = format!("{:<8}", op.kind.to_string()).truecolor(150, 150, 150);
    let marker = kind_marker(op.kind);

    let mut path = op.path.display().to_string();
    if let Some(secondary) = &op.secondary {
        path.push_str(&format!(" -> {}", secondary.display()));
    }

    let undone = if op.undone {
        " (undone)".truecolor(150, 150, 150).to_string()
    } else {
        String::new()
    };

    format!(
        "  {}  {} {}  {}  {}{}",
        id,
        marker,
        kind,
        op.timestamp.format("%Y-%m-%d %H:%M:%S"),
        path,
        undone
    )
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
