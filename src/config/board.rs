//! Reading board (`.board`) files.
//!
//! ```text
//! SetName "DE2"
//! SetBackgroundImage "de2.png"
//! AddDeviceGroup "KEY", "in"
//! AddDevice "PUSH", "KEY", 0, "key.png", 120, 300
//! AddDeviceGroup "LEDR", "out"
//! AddDevice "LED", "LEDR", 0, "ledr.png", 40, 200
//! AddLCD "lcd", 400, 100
//! ```
//!
//! Image paths and screen coordinates only matter to a graphical front end.
//! They are checked, but not kept (apart from the background image path).

use crate::sim::board::{Board, BoardDeviceKind};

use super::{parse_rows, ConfigErr, ParsedRow};

/// Reads a board file.
///
/// `file` is the path the source was read from, used in error messages.
pub fn parse_board(src: &str, file: &str) -> Result<Board, ConfigErr> {
    let mut board = Board::default();

    for row in parse_rows(src)? {
        let applied = match &*row.keyword {
            "SetName" => single_str(&row).map(|s| board.set_name(s)),
            "SetBackgroundImage" => single_str(&row).map(|s| board.set_background_image(&s.replace('\\', "/"))),
            "AddDeviceGroup" => add_group(&mut board, &row),
            "AddDevice" => add_device(&mut board, &row),
            "AddLCD" => match row.args_match("snn") {
                true  => row.str(0).map(|s| board.set_lcd(s)),
                false => None,
            },
            kw => {
                log::warn!("{file}:{}: ignoring unknown command {kw}", row.line);
                Some(())
            }
        };

        if applied.is_none() {
            return Err(ConfigErr::BoardCommand { command: row.keyword, file: file.to_string() });
        }
    }

    Ok(board)
}

fn single_str(row: &ParsedRow) -> Option<&str> {
    match row.args_match("s") {
        true  => row.str(0),
        false => None,
    }
}

fn add_group(board: &mut Board, row: &ParsedRow) -> Option<()> {
    if !row.args_match("ss") { return None; }

    let direction = row.str(1)?.parse().ok()?;
    board.add_group(row.str(0)?, direction);
    Some(())
}

fn add_device(board: &mut Board, row: &ParsedRow) -> Option<()> {
    if !row.args_match("ssnsnn") { return None; }

    let kind: BoardDeviceKind = row.str(0)?.parse().ok()?;
    let group = board.find_group(row.str(1)?)?;
    board.add_device(group, kind, row.num(2)?)?;
    Some(())
}
