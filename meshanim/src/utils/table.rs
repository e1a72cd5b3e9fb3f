//! Table formatting utilities

use prettytable::{Cell, Row, Table};

/// Create a table with bold headers
pub fn create_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).style_spec("b"))
        .collect();
    table.set_titles(Row::new(header_cells));

    table
}

pub fn add_table_row(table: &mut Table, cells: Vec<String>) {
    let row_cells: Vec<Cell> = cells.iter().map(|s| Cell::new(s)).collect();
    table.add_row(Row::new(row_cells));
}

/// Two-column key/value table without a title row
pub fn create_property_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    for (key, value) in rows {
        table.add_row(Row::new(vec![
            Cell::new(key).style_spec("b"),
            Cell::new(value),
        ]));
    }
    table
}
