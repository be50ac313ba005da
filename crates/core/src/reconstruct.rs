use crate::models::{MergedTable, TableCandidate};
use crate::table_markup::{is_separator_row, split_pipe_row};

/// Rows are forward-filled before columns.
pub fn reconstruct(candidate: &TableCandidate) -> MergedTable {
    let mut table = parse_grid(candidate);
    fill_rows_forward(&mut table.rows);
    fill_columns_forward(&mut table.rows);
    table
}

/// Parses candidate rows into a padded grid without repairing empty cells.
pub fn parse_grid(candidate: &TableCandidate) -> MergedTable {
    let mut has_header = false;
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(candidate.lines.len());

    for line in &candidate.lines {
        if is_separator_row(line) {
            if rows.len() == 1 {
                has_header = true;
            }
            continue;
        }
        rows.push(split_pipe_row(line));
    }

    MergedTable {
        rows: pad_to_rectangle(rows),
        has_header,
    }
}

/// Pads every row with empty cells up to the widest row.
pub fn pad_to_rectangle(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or_default();
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

pub fn fill_rows_forward(rows: &mut [Vec<String>]) {
    for row in rows.iter_mut() {
        let mut last: Option<String> = None;
        for cell in row.iter_mut() {
            if cell.is_empty() {
                if let Some(value) = &last {
                    cell.clone_from(value);
                }
            } else {
                last = Some(cell.clone());
            }
        }
    }
}

pub fn fill_columns_forward(rows: &mut [Vec<String>]) {
    let width = rows.iter().map(Vec::len).max().unwrap_or_default();

    for column in 0..width {
        let mut last: Option<String> = None;
        for row in rows.iter_mut() {
            let Some(cell) = row.get_mut(column) else {
                continue;
            };
            if cell.is_empty() {
                if let Some(value) = &last {
                    cell.clone_from(value);
                }
            } else {
                last = Some(cell.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn leading_corner_without_predecessor_stays_empty() {
        let candidate = TableCandidate::new(
            vec![1],
            vec![
                "|  | A | B |".to_string(),
                "| X |  | 1 |".to_string(),
                "| Y | 2 |  |".to_string(),
            ],
        );

        let table = reconstruct(&candidate);

        assert_eq!(table.cell(0, 0), Some(""));
        assert_eq!(
            table.rows,
            grid(&[&["", "A", "B"], &["X", "X", "1"], &["Y", "2", "2"]])
        );
    }

    #[test]
    fn row_fill_runs_before_column_fill() {
        let candidate = TableCandidate::new(
            vec![3],
            vec![
                "| Region | Type | Deposit | Rent |".to_string(),
                "|---|---|---|---|".to_string(),
                "| Seoul | Studio | 100 | 10 |".to_string(),
                "|  |  | 120 |  |".to_string(),
                "| Busan | Two room |  |".to_string(),
            ],
        );

        let table = reconstruct(&candidate);

        assert!(table.has_header);
        assert!(table.is_rectangular());
        assert_eq!(
            table.rows,
            grid(&[
                &["Region", "Type", "Deposit", "Rent"],
                &["Seoul", "Studio", "100", "10"],
                &["Seoul", "Studio", "120", "120"],
                &["Busan", "Two room", "Two room", "Two room"],
            ])
        );
    }

    #[test]
    fn reversed_order_would_differ() {
        let mut rows = grid(&[&["a", "b"], &["", ""], &["c", ""]]);
        let mut reversed = rows.clone();

        fill_rows_forward(&mut rows);
        fill_columns_forward(&mut rows);
        fill_columns_forward(&mut reversed);
        fill_rows_forward(&mut reversed);

        assert_eq!(rows, grid(&[&["a", "b"], &["a", "b"], &["c", "c"]]));
        assert_eq!(reversed, grid(&[&["a", "b"], &["a", "b"], &["c", "b"]]));
    }

    #[test]
    fn complete_tables_are_fixed_points() {
        let candidate = TableCandidate::new(
            vec![1],
            vec![
                "| h1 | h2 |".to_string(),
                "|---|---|".to_string(),
                "| a | b |".to_string(),
                "| c | d |".to_string(),
            ],
        );

        let once = reconstruct(&candidate);
        let twice = reconstruct(&TableCandidate::from_markdown(1, &once.to_markdown()));

        assert_eq!(once, twice);
    }

    #[test]
    fn headerless_tables_are_fixed_points() {
        let candidate = TableCandidate::new(vec![2], vec!["| a | b |".to_string(), "| c | d |".to_string()]);

        let once = reconstruct(&candidate);
        let twice = reconstruct(&TableCandidate::from_markdown(2, &once.to_markdown()));

        assert!(!once.has_header);
        assert_eq!(once, twice);
    }

    #[test]
    fn short_rows_are_padded() {
        let rows = pad_to_rectangle(grid(&[&["a"], &["b", "c", "d"]]));
        assert_eq!(rows, grid(&[&["a", "", ""], &["b", "c", "d"]]));
    }
}
