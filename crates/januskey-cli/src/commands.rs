//! Verb implementations for the jk CLI
//!
//! Each function takes an opened engine (except `init`) and renders
//! its result with the shared output helpers. Anything machine-facing
//! goes to stdout; status chatter goes to stderr.

use crate::cli::{ContentArgs, HistoryArgs, ObliterateArgs, StatusArgs};
use crate::output::{format_bytes, history_line, prefix};
use colored::Colorize;
use januskey::{ContentHash, Engine, JanusError, OpKind, OpRecord, Result};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub fn run_init(root: &Path) -> Result<()> {
    let already = Engine::is_initialized(root);
    let engine = Engine::init(root)?;
    if already {
        eprintln!(
            "{} {} is already managed",
            prefix(),
            engine.root().display()
        );
    } else {
        eprintln!("{} initialized {}", prefix(), engine.root().display());
    }
    Ok(())
}

pub fn run_status(engine: &Engine, args: &StatusArgs) -> Result<()> {
    let status = engine.status();

    if args.json {
        let json = serde_json::json!({
            "root": engine.root(),
            "tracked_entries": status.tracked_entries,
            "store_objects": status.store_objects,
            "store_bytes": status.store_bytes,
            "history_len": status.history_len,
            "obliterations": status.obliterations,
            "active_txn": status.active_txn,
        });
        println!("{json:#}");
        return Ok(());
    }

    eprintln!("{} {}", prefix(), engine.root().display());
    eprintln!("  tracked entries   {}", status.tracked_entries);
    eprintln!(
        "  content store     {} objects, {}",
        status.store_objects,
        format_bytes(status.store_bytes)
    );
    eprintln!("  history           {} operations", status.history_len);
    eprintln!("  obliterations     {}", status.obliterations);
    match status.active_txn {
        Some(id) => eprintln!("  transaction       {} {}", id, "(active)".yellow()),
        None => eprintln!("  transaction       none"),
    }
    Ok(())
}

pub fn run_history(engine: &Engine, args: &HistoryArgs) -> Result<()> {
    let kind = args.kind.as_deref().map(parse_kind).transpose()?;

    let mut records: Vec<&OpRecord> = engine
        .history()
        .ops()
        .iter()
        .filter(|op| kind.map(|k| op.kind == k).unwrap_or(true))
        .filter(|op| {
            args.path
                .as_deref()
                .map(|p| op.paths().contains(&p))
                .unwrap_or(true)
        })
        .collect();

    records.reverse();
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records).map_err(|e| {
            JanusError::InvalidState(format!("history serialization: {e}"))
        })?);
        return Ok(());
    }

    if records.is_empty() {
        eprintln!("{} no matching operations", prefix());
        return Ok(());
    }

    eprintln!("{} {} operation(s)\n", prefix(), records.len());
    for op in records {
        eprintln!("{}", history_line(op));
    }
    Ok(())
}

pub fn run_create(engine: &mut Engine, args: &ContentArgs) -> Result<()> {
    let content = content_or_stdin(args)?;
    let record = engine.apply_create(&args.path, &content)?;
    eprintln!(
        "{} created {} (op {})",
        prefix(),
        record.path.display(),
        record.id
    );
    Ok(())
}

pub fn run_delete(engine: &mut Engine, path: &Path) -> Result<()> {
    let record = engine.apply_delete(path)?;
    eprintln!(
        "{} deleted {} (op {}, undo with 'jk undo {}')",
        prefix(),
        record.path.display(),
        record.id,
        record.id
    );
    Ok(())
}

pub fn run_modify(engine: &mut Engine, args: &ContentArgs) -> Result<()> {
    let content = content_or_stdin(args)?;
    let record = engine.apply_modify(&args.path, &content)?;
    eprintln!(
        "{} modified {} (op {})",
        prefix(),
        record.path.display(),
        record.id
    );
    Ok(())
}

pub fn run_move(engine: &mut Engine, source: &Path, destination: &Path) -> Result<()> {
    let record = engine.apply_move(source, destination)?;
    eprintln!(
        "{} moved {} -> {} (op {})",
        prefix(),
        record.path.display(),
        record
            .secondary
            .as_deref()
            .unwrap_or_else(|| Path::new("?"))
            .display(),
        record.id
    );
    Ok(())
}

pub fn run_copy(engine: &mut Engine, source: &Path, destination: &Path) -> Result<()> {
    let record = engine.apply_copy(source, destination)?;
    eprintln!(
        "{} copied {} -> {} (op {})",
        prefix(),
        record.path.display(),
        record
            .secondary
            .as_deref()
            .unwrap_or_else(|| Path::new("?"))
            .display(),
        record.id
    );
    Ok(())
}

pub fn run_undo(engine: &mut Engine, id: Option<u64>) -> Result<()> {
    let undone = match id {
        Some(id) => {
            engine.undo(id)?;
            id
        }
        None => engine.undo_last()?,
    };
    eprintln!("{} undid operation {}", prefix(), undone);
    Ok(())
}

pub fn run_begin(engine: &mut Engine) -> Result<()> {
    let id = engine.begin()?;
    eprintln!("{} began transaction {}", prefix(), id);
    Ok(())
}

pub fn run_commit(engine: &mut Engine) -> Result<()> {
    let info = engine.commit()?;
    eprintln!(
        "{} committed transaction {} ({} operation(s))",
        prefix(),
        info.id,
        info.op_ids.len()
    );
    Ok(())
}

pub fn run_rollback(engine: &mut Engine) -> Result<()> {
    let info = engine.rollback()?;
    eprintln!(
        "{} rolled back transaction {} ({} operation(s))",
        prefix(),
        info.id,
        info.op_ids.len()
    );
    Ok(())
}

pub fn run_preview(engine: &Engine) -> Result<()> {
    let pending = engine.preview()?;
    if pending.is_empty() {
        eprintln!("{} transaction is empty", prefix());
        return Ok(());
    }
    eprintln!(
        "{} {} pending operation(s) in the active transaction\n",
        prefix(),
        pending.len()
    );
    for op in &pending {
        eprintln!("{}", history_line(op));
    }
    Ok(())
}

pub fn run_obliterate(engine: &mut Engine, args: &ObliterateArgs) -> Result<()> {
    let mut hashes = Vec::with_capacity(args.hashes.len());
    for raw in &args.hashes {
        let hash = ContentHash::from_str(raw).map_err(|e| {
            JanusError::InvalidState(format!("'{raw}' is not a content digest: {e}"))
        })?;
        hashes.push(hash);
    }

    if hashes.len() == 1 {
        let record = engine.obliterate(
            &hashes[0],
            args.reason.clone(),
            args.legal_basis.clone(),
        )?;
        eprintln!(
            "{} obliterated {} ({} passes, record {})",
            prefix(),
            record.content_hash,
            record.proof.overwrite_passes,
            record.id
        );
        eprintln!("  commitment {}", record.proof.commitment);
        return Ok(());
    }

    let (count, all_ok) = engine.obliterate_batch(
        &hashes,
        args.reason.clone(),
        args.legal_basis.clone(),
    );
    eprintln!(
        "{} obliterated {} of {} digest(s)",
        prefix(),
        count,
        hashes.len()
    );
    if !all_ok {
        return Err(JanusError::Io {
            path: engine.root().to_path_buf(),
            source: std::io::Error::other("one or more obliterations failed"),
        });
    }
    Ok(())
}

fn parse_kind(s: &str) -> Result<OpKind> {
    let kind = match s.to_ascii_lowercase().as_str() {
        "create" => OpKind::Create,
        "delete" => OpKind::Delete,
        "modify" => OpKind::Modify,
        "move" => OpKind::Move,
        "copy" => OpKind::Copy,
        "chmod" => OpKind::Chmod,
        "mkdir" => OpKind::Mkdir,
        "rmdir" => OpKind::Rmdir,
        "symlink" => OpKind::Symlink,
        "append" => OpKind::Append,
        "truncate" => OpKind::Truncate,
        "touch" => OpKind::Touch,
        other => {
            return Err(JanusError::NotFound(format!("operation kind '{other}'")));
        }
    };
    Ok(kind)
}

fn content_or_stdin(args: &ContentArgs) -> Result<Vec<u8>> {
    match &args.content {
        Some(text) => Ok(text.clone().into_bytes()),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|e| JanusError::io(&args.path, e))?;
            Ok(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_case_insensitively() {
        assert_eq!(parse_kind("delete").expect("delete"), OpKind::Delete);
        assert_eq!(parse_kind("MODIFY").expect("modify"), OpKind::Modify);
        assert!(parse_kind("explode").is_err());
    }
}
