/// Line commands for the interactive shell.
use std::io::Write;
use std::path::PathBuf;

use nestboard_core::snapshot::{load_from_file, save_to_file};
use nestboard_core::types::{CardDraft, CardPatch, ROOT_PATH};
use nestboard_core::{BoardError, Workspace};

pub const HELP: &str = "\
commands:
  add <title>                 create a card on the root board
  child <parent> <title>      create a card on a card's sub-board
  edit <id> <title>           rename a card
  status <id> <status>        change a card's status
  mv <id> <status> [index]    move a card within its board
  rm <id>                     delete a card and its sub-cards
  dup <id>                    duplicate a card
  sel <id> | unsel <id>       change the selection
  bulk-mv <status>            move every selected card
  bulk-rm                     delete every selected card
  undo | redo
  ls [path]                   show a board (default: root)
  show <id>                   show one card and where it sits
  history                     list undo and redo steps
  stats                       history memory and counters
  save <file> | load <file>
  help | quit";

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("invalid index: {0}")]
    BadIndex(String),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { title: String },
    Child { parent: String, title: String },
    Edit { id: String, title: String },
    Status { id: String, status: String },
    Move { id: String, status: String, index: Option<usize> },
    Remove { id: String },
    Duplicate { id: String },
    Select { id: String },
    Deselect { id: String },
    BulkMove { status: String },
    BulkRemove,
    Undo,
    Redo,
    List { path: String },
    Show { id: String },
    History,
    Stats,
    Save { file: PathBuf },
    Load { file: PathBuf },
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ShellError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = split_word(line);

    let command = match verb {
        "add" => Command::Add {
            title: required(rest, "add <title>")?,
        },
        "child" => {
            let (parent, title) = two_args(rest, "child <parent> <title>")?;
            Command::Child { parent, title }
        }
        "edit" => {
            let (id, title) = two_args(rest, "edit <id> <title>")?;
            Command::Edit { id, title }
        }
        "status" => {
            let (id, status) = two_args(rest, "status <id> <status>")?;
            Command::Status { id, status }
        }
        "mv" => {
            let words: Vec<&str> = rest.split_whitespace().collect();
            let (id, status, index) = match words.as_slice() {
                [id, status] => (id, status, None),
                [id, status, index] => {
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| ShellError::BadIndex(index.to_string()))?;
                    (id, status, Some(index))
                }
                _ => return Err(ShellError::Usage("mv <id> <status> [index]")),
            };
            Command::Move {
                id: id.to_string(),
                status: status.to_string(),
                index,
            }
        }
        "rm" => Command::Remove {
            id: required(rest, "rm <id>")?,
        },
        "dup" => Command::Duplicate {
            id: required(rest, "dup <id>")?,
        },
        "sel" => Command::Select {
            id: required(rest, "sel <id>")?,
        },
        "unsel" => Command::Deselect {
            id: required(rest, "unsel <id>")?,
        },
        "bulk-mv" => Command::BulkMove {
            status: required(rest, "bulk-mv <status>")?,
        },
        "bulk-rm" => Command::BulkRemove,
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "ls" => Command::List {
            path: if rest.is_empty() {
                ROOT_PATH.to_string()
            } else {
                rest.to_string()
            },
        },
        "show" => Command::Show {
            id: required(rest, "show <id>")?,
        },
        "history" => Command::History,
        "stats" => Command::Stats,
        "save" => Command::Save {
            file: PathBuf::from(required(rest, "save <file>")?),
        },
        "load" => Command::Load {
            file: PathBuf::from(required(rest, "load <file>")?),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ShellError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required(rest: &str, usage: &'static str) -> Result<String, ShellError> {
    if rest.is_empty() {
        Err(ShellError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

fn two_args(rest: &str, usage: &'static str) -> Result<(String, String), ShellError> {
    let (first, second) = split_word(rest);
    if first.is_empty() || second.is_empty() {
        return Err(ShellError::Usage(usage));
    }
    Ok((first.to_string(), second.to_string()))
}

/// Run a command against the workspace, writing feedback to `out`.
pub fn execute(
    ws: &mut Workspace,
    command: Command,
    out: &mut impl Write,
) -> Result<Flow, ShellError> {
    match command {
        Command::Add { title } => {
            let id = ws.create_card(CardDraft::new(title))?;
            writeln!(out, "created {}", id)?;
        }
        Command::Child { parent, title } => {
            let id = ws.create_child_card(&parent, CardDraft::new(title))?;
            writeln!(out, "created {}", id)?;
        }
        Command::Edit { id, title } => {
            report(out, ws.update_card(&id, &CardPatch::title(title)), "updated", &id)?;
        }
        Command::Status { id, status } => {
            report(out, ws.update_card(&id, &CardPatch::status(status)), "updated", &id)?;
        }
        Command::Move { id, status, index } => {
            report(out, ws.move_card(&id, &status, index), "moved", &id)?;
        }
        Command::Remove { id } => {
            report(out, ws.delete_card(&id), "deleted", &id)?;
        }
        Command::Duplicate { id } => match ws.duplicate_card(&id) {
            Some(copy) => writeln!(out, "created {}", copy)?,
            None => writeln!(out, "no change for {}", id)?,
        },
        Command::Select { id } => {
            ws.select(&id);
            writeln!(out, "{} selected", ws.selection().len())?;
        }
        Command::Deselect { id } => {
            ws.deselect(&id);
            writeln!(out, "{} selected", ws.selection().len())?;
        }
        Command::BulkMove { status } => {
            let ids = ws.selected_ids();
            writeln!(out, "moved {} cards", ws.bulk_move(&ids, &status))?;
        }
        Command::BulkRemove => {
            let ids = ws.selected_ids();
            writeln!(out, "deleted {} cards", ws.bulk_delete(&ids))?;
        }
        Command::Undo => {
            let description = ws.undo_description().map(str::to_string);
            match description {
                Some(d) if ws.undo() => writeln!(out, "undid {}", d)?,
                _ => writeln!(out, "nothing to undo")?,
            }
        }
        Command::Redo => {
            let description = ws.redo_description().map(str::to_string);
            match description {
                Some(d) if ws.redo() => writeln!(out, "redid {}", d)?,
                _ => writeln!(out, "nothing to redo")?,
            }
        }
        Command::List { path } => print_board(ws, &path, out)?,
        Command::Show { id } => print_card(ws, &id, out)?,
        Command::History => {
            for action in ws.history().undo_actions() {
                writeln!(out, "  undo  {}", action.description)?;
            }
            for action in ws.history().redo_actions() {
                writeln!(out, "  redo  {}", action.description)?;
            }
        }
        Command::Stats => {
            let stats = serde_json::json!({
                "memory": ws.memory_usage(),
                "history": ws.stats(),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
        }
        Command::Save { file } => {
            save_to_file(&ws.snapshot(), &file)?;
            writeln!(out, "saved {} cards to {}", ws.store().len(), file.display())?;
        }
        Command::Load { file } => {
            ws.restore(load_from_file(&file)?)?;
            writeln!(out, "loaded {} cards from {}", ws.store().len(), file.display())?;
        }
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn report(out: &mut impl Write, changed: bool, verb: &str, id: &str) -> std::io::Result<()> {
    if changed {
        writeln!(out, "{} {}", verb, id)
    } else {
        writeln!(out, "no change for {}", id)
    }
}

fn print_board(ws: &Workspace, path: &str, out: &mut impl Write) -> std::io::Result<()> {
    let columns = ws.store().cards_on(path);
    if columns.is_empty() {
        return writeln!(out, "{}: empty", path);
    }
    writeln!(out, "{}", path)?;
    for (status, cards) in columns {
        writeln!(out, "  [{}]", status)?;
        for card in cards {
            let marker = if ws.selection().contains(&card.id) { '*' } else { ' ' };
            let children = ws.store().children_of(&card.id).len();
            let sub = if children == 0 {
                String::new()
            } else {
                format!(" (+{})", children)
            };
            writeln!(out, "   {}{}  {}{}", marker, card.id, card.title, sub)?;
        }
    }
    Ok(())
}

fn print_card(ws: &Workspace, id: &str, out: &mut impl Write) -> Result<(), ShellError> {
    let card = ws.store().require_card(id)?;
    writeln!(out, "{}  {}", card.id, card.title)?;
    if let Some((path, status, index)) = ws.store().position_of(id) {
        writeln!(out, "  at {} [{}] #{}", path, status, index)?;
    }
    for child in ws.store().children_of(id) {
        writeln!(out, "  - {}  {}", child.id, child.title)?;
    }
    Ok(())
}
