use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_table_reconcile_core::{
    apply_replacements, GroupOutcome, IngestError, LayoutExtractor, LopdfExtractor, PageText,
    PageTextExtractor, PipelineOptions, ReconcileError, ReconcilePipeline, Replacement, ServiceError,
    TableFormat,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::tempdir;

struct StaticLayout(String);

#[async_trait]
impl LayoutExtractor for StaticLayout {
    async fn extract_layout(&self, _path: &Path) -> Result<String, ServiceError> {
        Ok(self.0.clone())
    }
}

struct StaticPages(Vec<PageText>);

#[async_trait]
impl PageTextExtractor for StaticPages {
    async fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
        Ok(self.0.clone())
    }
}

fn html_table(rows: &[&[&str]]) -> String {
    let mut html = String::from("<table>\n");
    for (index, row) in rows.iter().enumerate() {
        let tag = if index == 0 { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in row.iter() {
            html.push_str(&format!("<{tag}>{cell}</{tag}>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

fn page(number: u32, text: &str) -> PageText {
    PageText {
        number,
        text: text.to_string(),
    }
}

fn pipeline(layout: &str, pages: Vec<PageText>, options: PipelineOptions) -> ReconcilePipeline<StaticLayout, StaticPages> {
    ReconcilePipeline::new(StaticLayout(layout.to_string()), StaticPages(pages), options)
        .expect("pipeline builds with valid options")
}

fn rent_layout() -> String {
    let first = html_table(&[
        &["지역", "유형", "보증금"],
        &["서울", "전용 26", "1,200"],
        &["", "전용 36", "1,500"],
        &["부산", "전용 26", "900"],
        &["대구", "전용 26", "800"],
    ]);
    let second = html_table(&[
        &["광주", "전용 26", "700"],
        &["대전", "전용 36", "950"],
        &["", "전용 46", "1,100"],
    ]);

    format!("# 임대 조건\n\n{first}\n<!-- PageFooter=\"1\" -->\n<!-- PageBreak -->\n{second}\n\n문의: 1600-1004\n")
}

fn rent_pages() -> Vec<PageText> {
    vec![
        page(
            1,
            "임대 조건\n| 지역 | 유형 | 보증금 |\n|---|---|---|\n| 서울 | 전용 26 | 1,200 |\n|  | 전용 36 | 1,500 |\n| 부산 | 전용 26 | 900 |\n| 대구 | 전용 26 | 800 |\n- 1 -",
        ),
        page(
            2,
            "| 광주 | 전용 26 | 700 |\n| 대전 | 전용 36 | 950 |\n|  | 전용 46 | 1,100 |\n문의: 1600-1004",
        ),
    ]
}

const RENT_TABLE: &str = "| 지역 | 유형 | 보증금 |
| --- | --- | --- |
| 서울 | 전용 26 | 1,200 |
| 서울 | 전용 36 | 1,500 |
| 부산 | 전용 26 | 900 |
| 대구 | 전용 26 | 800 |
| 광주 | 전용 26 | 700 |
| 대전 | 전용 36 | 950 |
| 대전 | 전용 46 | 1,100 |";

#[tokio::test]
async fn two_page_table_is_spliced_once_with_all_rows() -> Result<(), ReconcileError> {
    let pipeline = pipeline(&rent_layout(), rent_pages(), PipelineOptions::default());

    let processed = pipeline.process_document(Path::new("/notices/rent.pdf")).await?;
    let markdown = processed.document.as_str();

    assert_eq!(markdown, format!("# 임대 조건\n\n{RENT_TABLE}\n\n문의: 1600-1004\n"));
    assert_eq!(markdown.matches("| 지역 |").count(), 1);
    assert!(!markdown.contains("<table>"));
    assert_eq!(
        processed.report.groups,
        vec![GroupOutcome::Reconciled {
            pages: vec![1, 2],
            candidates: 1,
            rows: 8,
            columns: 3,
        }]
    );
    assert_eq!(processed.report.source_path, "/notices/rent.pdf");
    Ok(())
}

#[tokio::test]
async fn html_output_keeps_a_single_table() -> Result<(), ReconcileError> {
    let options = PipelineOptions {
        table_format: TableFormat::Html,
        ..PipelineOptions::default()
    };
    let pipeline = pipeline(&rent_layout(), rent_pages(), options);

    let reconciliation = pipeline.reconcile_markdown(&rent_layout(), rent_pages()).await?;
    let markdown = reconciliation.document.as_str();

    assert_eq!(markdown.matches("<table>").count(), 1);
    assert_eq!(markdown.matches("<tr>").count(), 8);
    assert!(markdown.contains("<tr><th>지역</th><th>유형</th><th>보증금</th></tr>"));
    assert!(markdown.contains("<tr><td>대전</td><td>전용 46</td><td>1,100</td></tr>"));
    Ok(())
}

#[tokio::test]
async fn one_failed_group_does_not_block_the_other() -> Result<(), ReconcileError> {
    let a1 = html_table(&[&["항목", "내용"], &["신청", "온라인"]]);
    let a2 = html_table(&[&["발표", "3월"]]);
    let b1 = html_table(&[&["x", "y", "z"], &["1", "2", "3"]]);
    let b2 = html_table(&[&["4", "5", "6"]]);
    let layout = format!(
        "Intro\n{a1}\n<!-- PageBreak -->\n{a2}\n\nMiddle text\n<!-- PageBreak -->\nMore\n{b1}\n<!-- PageBreak -->\n{b2}\n\nEnd\n"
    );
    let pages = vec![
        page(1, "Intro\n| 항목 | 내용 |\n|---|---|\n| 신청 | 온라인 |"),
        page(2, "| 발표 | 3월 |\n\nMiddle text"),
        page(3, "More"),
        page(4, "End"),
    ];
    let pipeline = pipeline(&layout, pages.clone(), PipelineOptions::default());

    let reconciliation = pipeline.reconcile_markdown(&layout, pages).await?;

    assert_eq!(reconciliation.groups.len(), 2);
    assert!(reconciliation.groups[0].is_reconciled());
    assert!(matches!(
        &reconciliation.groups[1],
        GroupOutcome::Failed { pages, .. } if pages == &vec![3, 4]
    ));

    let markdown = reconciliation.document.as_str();
    assert!(markdown.starts_with("Intro\n| 항목 | 내용 |\n| --- | --- |\n| 신청 | 온라인 |\n| 발표 | 3월 |\n\nMiddle text\n"));
    assert!(markdown.contains(&b1));
    assert!(markdown.contains(&b2));
    assert_eq!(reconciliation.page_count, 4);
    Ok(())
}

#[tokio::test]
async fn table_ending_a_page_without_continuation_is_left_alone() -> Result<(), ReconcileError> {
    let closing = html_table(&[&["a", "b"], &["1", "2"]]);
    let layout = format!("Body\n{closing}\n<!-- PageBreak -->\n## Next section\n\nText.\n");
    let pages = vec![page(1, "Body\n| a | b |\n|---|---|\n| 1 | 2 |"), page(2, "## Next section\nText.")];
    let pipeline = pipeline(&layout, pages.clone(), PipelineOptions::default());

    let reconciliation = pipeline.reconcile_markdown(&layout, pages).await?;

    assert!(reconciliation.groups.is_empty());
    assert_eq!(reconciliation.document.as_str(), layout);
    Ok(())
}

fn text_at(x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn write_pdf(path: &Path, pages: Vec<Vec<Operation>>) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for operations in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Content { operations }.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

fn rent_pdf(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let first = [
        text_at(72, 800, "Rent notice"),
        text_at(72, 760, "Type"),
        text_at(250, 760, "Rent"),
        text_at(72, 740, "A"),
        text_at(250, 740, "10"),
        text_at(72, 720, "B"),
        text_at(250, 720, "20"),
        text_at(290, 40, "- 1 -"),
    ];
    let second = [
        text_at(72, 800, "C"),
        text_at(250, 800, "30"),
        text_at(72, 780, "D"),
        text_at(250, 780, "40"),
        text_at(72, 700, "Contact the office."),
    ];
    write_pdf(path, vec![first.concat(), second.concat()])
}

#[tokio::test]
async fn pdf_pages_render_aligned_columns_as_pipe_tables() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("rent.pdf");
    rent_pdf(&path)?;

    let pages = LopdfExtractor.extract_pages(&path).await?;

    assert_eq!(
        pages,
        vec![
            page(1, "Rent notice\n| Type | Rent |\n| --- | --- |\n| A | 10 |\n| B | 20 |\n- 1 -"),
            page(2, "| C | 30 |\n| --- | --- |\n| D | 40 |\nContact the office."),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn split_table_in_a_pdf_is_reconciled_without_sidecars() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("rent.pdf");
    rent_pdf(&path)?;

    let layout = "Rent notice\n| Type | Rent |\n|---|---|\n| A | 10 |\n<!-- PageBreak -->\n| C | 30 |\n| D | 40 |\n\nContact the office.\n";
    let pipeline = ReconcilePipeline::new(StaticLayout(layout.to_string()), LopdfExtractor, PipelineOptions::default())?;

    let processed = pipeline.process_document(&path).await?;

    assert_eq!(
        processed.report.groups,
        vec![GroupOutcome::Reconciled {
            pages: vec![1, 2],
            candidates: 1,
            rows: 5,
            columns: 2,
        }]
    );
    assert!(processed
        .document
        .as_str()
        .contains("| Type | Rent |\n| --- | --- |\n| A | 10 |\n| B | 20 |\n| C | 30 |\n| D | 40 |"));
    Ok(())
}

#[test]
fn overlapping_replacements_are_rejected() {
    let error = apply_replacements(
        "0123456789",
        vec![
            Replacement {
                span: 1..6,
                text: "a".to_string(),
            },
            Replacement {
                span: 5..9,
                text: "b".to_string(),
            },
        ],
    )
    .unwrap_err();

    assert!(matches!(error, ReconcileError::SpliceConflict { .. }));
}
