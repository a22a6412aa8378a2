//! Plain-text rendering of board state

use std::fmt::Write as _;

use taskboard_core::board::{Board, BoardState, Task};

pub fn boards(boards: &[Board]) -> String {
    if boards.is_empty() {
        return "No boards yet\n".to_string();
    }
    let mut out = String::new();
    for board in boards {
        let _ = writeln!(out, "{}  {} ({})", board.id, board.name, board.color);
    }
    out
}

/// The current board with its columns and tasks in display order
pub fn board(state: &BoardState) -> String {
    let Some(board) = &state.current_board else {
        return "No board selected\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", board.name, board.color);
    if let Some(description) = &board.description {
        let _ = writeln!(out, "{}", description);
    }
    for column in state.sorted_columns() {
        let tasks = state.column_tasks(column.id);
        let _ = writeln!(
            out,
            "\n[{}] {} ({})  {}",
            column.position,
            column.title,
            tasks.len(),
            column.id
        );
        for task in tasks {
            let _ = writeln!(out, "  {}", task_line(task));
        }
    }
    out
}

fn task_line(task: &Task) -> String {
    let mut line = format!("{}. {} [{}]", task.position, task.title, task.priority.as_str());
    if !task.labels.is_empty() {
        let _ = write!(line, " #{}", task.labels.join(" #"));
    }
    if let Some(due) = task.due_date {
        let _ = write!(line, " due {}", due.format("%Y-%m-%d"));
    }
    let _ = write!(line, "  {}", task.id);
    line
}
