//! ANSI terminal control sequences for notices shown in the user's terminal.

const ESC: &str = "\x1b[";

/// Clears the screen and homes the cursor.
pub fn clear_screen() -> String {
    format!("{ESC}2J{}", goto_xy(1, 1))
}

/// Moves the cursor to a 1-based column/row.
pub fn goto_xy(x: u16, y: u16) -> String {
    format!("{ESC}{y};{x}H")
}

/// Moves the cursor down; terminals clamp at the last row.
pub fn cursor_down(rows: u16) -> String {
    format!("{ESC}{rows}B")
}

/// Homes the cursor and then pushes it to the bottom row, so a following
/// message lands below whatever the remote side drew.
pub fn bottom_of_screen() -> String {
    format!("{}{}", goto_xy(1, 1), cursor_down(255))
}
