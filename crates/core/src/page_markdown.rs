use crate::error::IngestError;
use crate::models::MergedTable;
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use tracing::trace;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Average glyph advance in em; real widths need the font program.
const GLYPH_EM: f32 = 0.5;
/// Runs closer than this (in em) belong to the same cell.
const CELL_GAP_EM: f32 = 1.5;
/// Gaps wider than this (in em) inside a cell become a space.
const WORD_GAP_EM: f32 = 0.15;
/// Baselines within this fraction of the font size share a line.
const LINE_TOLERANCE: f32 = 0.5;

/// A string shown on the page, in user space with the origin at the bottom left.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub size: f32,
    pub text: String,
}

struct Cell {
    x: f32,
    end: f32,
    text: String,
}

struct Line {
    y: f32,
    size: f32,
    cells: Vec<Cell>,
}

struct TextCursor<'a> {
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
    encoding: Option<&'a str>,
}

impl<'a> TextCursor<'a> {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            encoding: None,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&translate(tx, 0.0), &self.text_matrix);
    }

    fn show(&mut self, operand: &Object, runs: &mut Vec<TextRun>) {
        let Object::String(bytes, _) = operand else {
            return;
        };

        let text = Document::decode_text(self.encoding, bytes);
        let advance = text.chars().count() as f32 * self.font_size * GLYPH_EM;
        let device = multiply(&self.text_matrix, &self.ctm);

        if !text.trim().is_empty() {
            runs.push(TextRun {
                x: device[4],
                y: device[5],
                width: advance * device[0].hypot(device[1]),
                size: self.font_size * device[2].hypot(device[3]),
                text,
            });
        }
        self.advance(advance);
    }
}

/// Positioned text runs of one page, read from its content stream.
pub fn page_runs(document: &Document, page_id: ObjectId) -> Result<Vec<TextRun>, IngestError> {
    let fonts = document.get_page_fonts(page_id);
    let content = document
        .get_and_decode_page_content(page_id)
        .map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut cursor = TextCursor::new();
    let mut runs = Vec::new();

    for Operation { operator, operands } in &content.operations {
        match operator.as_str() {
            "q" => cursor.saved.push(cursor.ctm),
            "Q" => {
                if let Some(ctm) = cursor.saved.pop() {
                    cursor.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(matrix) = matrix_operand(operands) {
                    cursor.ctm = multiply(&matrix, &cursor.ctm);
                }
            }
            "BT" => {
                cursor.text_matrix = IDENTITY;
                cursor.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let [name, size, ..] = operands.as_slice() {
                    cursor.encoding = name
                        .as_name()
                        .ok()
                        .and_then(|name| fonts.get(name))
                        .map(|font| font.get_font_encoding());
                    cursor.font_size = size.as_float().unwrap_or(cursor.font_size);
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(|value| value.as_float().ok()) {
                    cursor.leading = leading;
                }
            }
            "Td" | "TD" => {
                if let [tx, ty, ..] = operands.as_slice() {
                    let (tx, ty) = (tx.as_float().unwrap_or(0.0), ty.as_float().unwrap_or(0.0));
                    if operator.as_str() == "TD" {
                        cursor.leading = -ty;
                    }
                    cursor.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = matrix_operand(operands) {
                    cursor.text_matrix = matrix;
                    cursor.line_matrix = matrix;
                }
            }
            "T*" => cursor.next_line(),
            "Tj" => {
                if let Some(operand) = operands.first() {
                    cursor.show(operand, &mut runs);
                }
            }
            "'" => {
                cursor.next_line();
                if let Some(operand) = operands.first() {
                    cursor.show(operand, &mut runs);
                }
            }
            "\"" => {
                cursor.next_line();
                if let Some(operand) = operands.get(2) {
                    cursor.show(operand, &mut runs);
                }
            }
            "TJ" => {
                let Some(Ok(items)) = operands.first().map(Object::as_array) else {
                    continue;
                };
                for item in items {
                    match item.as_float() {
                        Ok(adjustment) => cursor.advance(-adjustment / 1000.0 * cursor.font_size),
                        Err(_) => cursor.show(item, &mut runs),
                    }
                }
            }
            _ => {}
        }
    }

    Ok(runs)
}

/// Renders runs as page markdown. Two or more consecutive lines that split into
/// several cells become a pipe table; a single such line does too when it opens
/// or closes the page, since it may be the tail or head of a split table.
pub fn render_page(runs: &[TextRun]) -> String {
    let lines = group_lines(runs);
    let mut output: Vec<String> = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        if lines[index].cells.len() < 2 {
            output.push(line_text(&lines[index]));
            index += 1;
            continue;
        }

        let start = index;
        while index < lines.len() && lines[index].cells.len() >= 2 {
            index += 1;
        }

        let block = &lines[start..index];
        let at_page_edge = start == 0 || index == lines.len();
        if block.len() >= 2 || at_page_edge {
            output.push(table_markdown(block));
        } else {
            output.extend(block.iter().map(line_text));
        }
    }

    output.join("\n")
}

fn group_lines(runs: &[TextRun]) -> Vec<Line> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut rows: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match rows.last_mut() {
            Some(row) if (row[0].y - run.y).abs() <= row[0].size.max(run.size) * LINE_TOLERANCE => row.push(run),
            _ => rows.push(vec![run]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            Line {
                y: row[0].y,
                size: row.iter().map(|run| run.size).fold(0.0, f32::max),
                cells: merge_cells(&row),
            }
        })
        .collect()
}

fn merge_cells(row: &[&TextRun]) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();

    for run in row {
        let text = run.text.trim();
        match cells.last_mut() {
            Some(cell) if run.x - cell.end <= run.size * CELL_GAP_EM => {
                if run.x - cell.end > run.size * WORD_GAP_EM {
                    cell.text.push(' ');
                }
                cell.text.push_str(text);
                cell.end = cell.end.max(run.x + run.width);
            }
            _ => cells.push(Cell {
                x: run.x,
                end: run.x + run.width,
                text: text.to_string(),
            }),
        }
    }

    cells
}

fn line_text(line: &Line) -> String {
    line.cells
        .iter()
        .map(|cell| cell.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cells snap to the nearest column anchor; anchors are clustered cell starts.
fn table_markdown(block: &[Line]) -> String {
    let size = block.iter().map(|line| line.size).fold(0.0, f32::max);
    let mut starts: Vec<f32> = block
        .iter()
        .flat_map(|line| line.cells.iter().map(|cell| cell.x))
        .collect();
    starts.sort_by(f32::total_cmp);

    let mut anchors: Vec<f32> = Vec::new();
    for x in starts {
        match anchors.last() {
            Some(last) if x - last <= size * CELL_GAP_EM => {}
            _ => anchors.push(x),
        }
    }

    let rows = block
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); anchors.len()];
            for cell in &line.cells {
                let column = nearest_anchor(&anchors, cell.x);
                if !row[column].is_empty() {
                    row[column].push(' ');
                }
                row[column].push_str(&cell.text);
            }
            row
        })
        .collect();

    let table = MergedTable {
        rows,
        has_header: true,
    };
    trace!(lines = block.len(), columns = anchors.len(), y = block[0].y, "page table found");
    table.to_markdown()
}

fn nearest_anchor(anchors: &[f32], x: f32) -> usize {
    anchors
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
        .map(|(index, _)| index)
        .unwrap_or_default()
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    let mut matrix = IDENTITY;
    if operands.len() < 6 {
        return None;
    }
    for (slot, operand) in matrix.iter_mut().zip(operands) {
        *slot = operand.as_float().ok()?;
    }
    Some(matrix)
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// `a × b` for PDF row-vector matrices.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}
