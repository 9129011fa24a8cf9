use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::crawler::layout::{
    RowLayout, Section, HEADER_FIELDS, IMPROVEMENT_CONTAINER, IMPROVEMENT_DETAIL_ROW,
    IMPROVEMENT_DETAIL_TABLE_CLASS, IMPROVEMENT_ROW, IMPROVEMENT_TABLE_CLASS, JURISDICTION_ROW,
    JURISDICTION_SECTION, LAND_ROW, LAND_SECTION, ROLL_VALUE_ROW, ROLL_VALUE_SECTION, ROWS, TABLES,
};
use crate::crawler::models::{Improvement, PropertyRecord};

/// Extracts a record from a detail page. Missing or malformed sections
/// yield empty fields, never an error.
pub fn extract(body: &[u8]) -> PropertyRecord {
    let html = String::from_utf8_lossy(body);
    extract_html(&html)
}

pub fn extract_html(html: &str) -> PropertyRecord {
    let doc = Html::parse_document(html);

    let mut record = PropertyRecord::default();

    for field in HEADER_FIELDS {
        let Some(selector) = parse_selector(field.selector) else {
            continue;
        };
        let value = doc
            .select(&selector)
            .next()
            .map(|el| field.clean.apply(&text_of(el)))
            .unwrap_or_default();
        (field.set)(&mut record, value);
    }

    record.land = section_rows(&doc, &LAND_SECTION, &LAND_ROW);
    record.roll_values = section_rows(&doc, &ROLL_VALUE_SECTION, &ROLL_VALUE_ROW);
    record.jurisdictions = section_rows(&doc, &JURISDICTION_SECTION, &JURISDICTION_ROW);
    record.improvements = improvements(&doc);

    record
}

fn section_rows<T: Default + 'static>(doc: &Html, section: &Section, layout: &RowLayout<T>) -> Vec<T> {
    let Some(container) = parse_selector(section.container) else {
        return Vec::new();
    };

    let rows: Vec<T> = doc
        .select(&container)
        .flat_map(|table| table_rows(table, layout))
        .collect();
    debug!(section = section.name, rows = rows.len(), "Section extracted");
    rows
}

fn table_rows<T: Default + 'static>(table: ElementRef<'_>, layout: &RowLayout<T>) -> Vec<T> {
    table
        .select(&ROWS)
        .skip(layout.skip_rows)
        .filter_map(|row| {
            let texts: Vec<String> = row.select(layout.cells).map(text_of).collect();
            layout.build(&texts)
        })
        .collect()
}

/// Walks the improvement container in document order. Each `improvements`
/// table opens a new improvement; each `improvementDetails` table attaches
/// its rows to the improvement opened most recently in the same container.
fn improvements(doc: &Html) -> Vec<Improvement> {
    let Some(container) = parse_selector(IMPROVEMENT_CONTAINER) else {
        return Vec::new();
    };

    let mut out = Vec::new();

    for block in doc.select(&container) {
        let mut current: Option<Improvement> = None;

        for table in block.select(&TABLES) {
            let class = table.value().attr("class").unwrap_or_default();

            if has_class(class, IMPROVEMENT_TABLE_CLASS) {
                out.extend(current.take());
                let texts: Vec<String> = table.select(IMPROVEMENT_ROW.cells).map(text_of).collect();
                current = IMPROVEMENT_ROW.build(&texts);
            } else if has_class(class, IMPROVEMENT_DETAIL_TABLE_CLASS) {
                let details = table_rows(table, &IMPROVEMENT_DETAIL_ROW);
                match current.as_mut() {
                    Some(improvement) => improvement.details.extend(details),
                    None if !details.is_empty() => {
                        warn!(count = details.len(), "Improvement details without a header row");
                    }
                    None => {}
                }
            }
        }

        out.extend(current);
    }

    out
}

fn has_class(class_attr: &str, wanted: &str) -> bool {
    class_attr.split_whitespace().any(|c| c == wanted)
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(selector = css, error = %e, "Invalid selector");
            None
        }
    }
}
