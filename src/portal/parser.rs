//! Extraction of course tables from the enrollment-status page.
//!
//! The page carries two `datagrid` tables: the electable candidates (with
//! quota and an election href) and the already-elected list. Columns are
//! resolved by header name, not position, since the portal reorders them
//! between semesters.

use regex::Regex;
use std::sync::OnceLock;

use crate::course::{Course, CourseEntry, Quota};
use crate::outcome::PortalError;
use crate::portal::validate::strip_tags;

const COL_NAME: &str = "课程名";
const COL_CLASS_NO: &str = "班号";
const COL_SCHOOL: &str = "开课单位";
const COL_QUOTA: &str = "限数/已选";
const COL_ELECT: &str = "补选";

/// Both course lists of one enrollment-status page load.
#[derive(Debug, Clone)]
pub struct SupplyCancelPage {
    pub candidates: Vec<CourseEntry>,
    pub elected: Vec<Course>,
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<table[^>]*class="datagrid"[^>]*>(.*?)</table>"#).expect("static regex")
    })
}

fn header_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<tr[^>]*class="datagrid-header"[^>]*>(.*?)</tr>"#).expect("static regex")
    })
}

fn header_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<th[^>]*>(.*?)</th>").expect("static regex"))
}

fn data_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<tr[^>]*class="datagrid-(?:odd|even)"[^>]*>(.*?)</tr>"#)
            .expect("static regex")
    })
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<t[hd][^>]*>(.*?)</t[hd]>").expect("static regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<a[^>]*href="([^"]+)""#).expect("static regex"))
}

/// Parse one SupplyCancel page load.
///
/// A page with fewer than two tables is the known transient empty-page
/// artifact; callers retry it a bounded number of times.
pub fn parse_supply_cancel(html: &str) -> Result<SupplyCancelPage, PortalError> {
    let tables: Vec<&str> = table_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if tables.len() < 2 {
        return Err(PortalError::Malformed(format!(
            "supply/cancel page carries {} course table(s), expected 2",
            tables.len()
        )));
    }
    Ok(SupplyCancelPage {
        candidates: parse_candidate_table(tables[0])?,
        elected: parse_elected_table(tables[1])?,
    })
}

struct TableLayout {
    columns: Vec<String>,
}

impl TableLayout {
    fn of(table: &str) -> Result<Self, PortalError> {
        let header = header_row_re()
            .captures(table)
            .ok_or_else(|| PortalError::Malformed("course table without header row".into()))?;
        let columns = header_cell_re()
            .captures_iter(&header[1])
            .map(|c| strip_tags(&c[1]))
            .collect();
        Ok(Self { columns })
    }

    fn index(&self, name: &str) -> Result<usize, PortalError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PortalError::Malformed(format!("course table lacks column `{name}`")))
    }
}

fn row_cells(row: &str) -> Vec<&str> {
    cell_re()
        .captures_iter(row)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

fn cell_text(cells: &[&str], idx: usize) -> Result<String, PortalError> {
    cells
        .get(idx)
        .map(|raw| strip_tags(raw))
        .ok_or_else(|| PortalError::Malformed("course row is missing cells".into()))
}

fn parse_identity(cells: &[&str], layout: &TableLayout) -> Result<Course, PortalError> {
    let name = cell_text(cells, layout.index(COL_NAME)?)?;
    let class_no_raw = cell_text(cells, layout.index(COL_CLASS_NO)?)?;
    let school = cell_text(cells, layout.index(COL_SCHOOL)?)?;
    // "01" and "1" are the same class number.
    let class_no: u32 = class_no_raw
        .parse()
        .map_err(|_| PortalError::Malformed(format!("bad class number `{class_no_raw}`")))?;
    Ok(Course::new(name, class_no, school))
}

fn parse_elected_table(table: &str) -> Result<Vec<Course>, PortalError> {
    let layout = TableLayout::of(table)?;
    data_row_re()
        .captures_iter(table)
        .map(|row| parse_identity(&row_cells(&row[1]), &layout))
        .collect()
}

fn parse_candidate_table(table: &str) -> Result<Vec<CourseEntry>, PortalError> {
    let layout = TableLayout::of(table)?;
    let quota_idx = layout.index(COL_QUOTA)?;
    let elect_idx = layout.index(COL_ELECT)?;
    data_row_re()
        .captures_iter(table)
        .map(|row| {
            let cells = row_cells(&row[1]);
            let course = parse_identity(&cells, &layout)?;
            let quota = parse_quota(&cell_text(&cells, quota_idx)?)?;
            let action = cells
                .get(elect_idx)
                .and_then(|cell| href_re().captures(cell))
                .map(|c| c[1].to_string());
            Ok(CourseEntry {
                course,
                status: Some(quota),
                action,
            })
        })
        .collect()
}

fn parse_quota(text: &str) -> Result<Quota, PortalError> {
    let mut parts = text.splitn(2, '/');
    let max = parts.next().map(str::trim).unwrap_or_default();
    let used = parts.next().map(str::trim).unwrap_or_default();
    match (max.parse(), used.parse()) {
        (Ok(max), Ok(used)) => Ok(Quota { max, used }),
        _ => Err(PortalError::Malformed(format!("bad quota `{text}`"))),
    }
}

fn sida_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sida=([0-9A-Za-z]{32})").expect("static regex"))
}

/// Session token for the dual-degree identity-selection handshake, embedded
/// in the SSO landing page.
pub fn extract_sida(html: &str) -> Option<String> {
    sida_re().captures(html).map(|c| c[1].to_string())
}
