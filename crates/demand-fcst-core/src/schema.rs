//! Schema normalization: arbitrary tabular headers to the canonical row shape.
//!
//! Headers are folded (accents stripped, lowercased, spaces and underscores
//! removed) and looked up in a [`SynonymTable`]. A batch missing any required
//! field fails as a whole with every missing field listed. Individual rows
//! that cannot be parsed are skipped and reported as [`RowIssue`]s.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::{PipelineError, Result};

/// Fields of the canonical row schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Quantity,
    EntityId,
    EntityName,
    GroupId,
    MovementType,
}

impl CanonicalField {
    /// Fields that must be mapped for a batch to be accepted.
    pub const REQUIRED: [CanonicalField; 5] = [
        CanonicalField::Date,
        CanonicalField::Quantity,
        CanonicalField::EntityId,
        CanonicalField::EntityName,
        CanonicalField::GroupId,
    ];

    /// Canonical name of the field.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Quantity => "quantity",
            CanonicalField::EntityId => "entity_id",
            CanonicalField::EntityName => "entity_name",
            CanonicalField::GroupId => "group_id",
            CanonicalField::MovementType => "movement_type",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CanonicalField {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match fold_header(s).as_str() {
            "date" => Ok(CanonicalField::Date),
            "quantity" => Ok(CanonicalField::Quantity),
            "entityid" => Ok(CanonicalField::EntityId),
            "entityname" => Ok(CanonicalField::EntityName),
            "groupid" => Ok(CanonicalField::GroupId),
            "movementtype" => Ok(CanonicalField::MovementType),
            _ => Err(PipelineError::InvalidInput(format!(
                "Unknown canonical field: {}",
                s
            ))),
        }
    }
}

/// Fold a header (or a filter value) to its matching key.
///
/// NFKD-decomposes, drops everything outside ASCII (the combining accents),
/// removes whitespace and underscores, and lowercases.
pub fn fold_header(raw: &str) -> String {
    raw.nfkd()
        .filter(|c| c.is_ascii())
        .filter(|c| !c.is_whitespace() && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Declarative table mapping folded header synonyms to canonical fields.
///
/// Keys are folded on insertion, so `"Dt_Movimento"` and `"dtmovimento"`
/// are the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, CanonicalField>",
    into = "BTreeMap<String, CanonicalField>"
)]
pub struct SynonymTable {
    entries: BTreeMap<String, CanonicalField>,
}

impl SynonymTable {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add (or replace) a synonym.
    pub fn insert(&mut self, synonym: &str, field: CanonicalField) {
        self.entries.insert(fold_header(synonym), field);
    }

    /// Builder-style [`SynonymTable::insert`].
    pub fn with(mut self, synonym: &str, field: CanonicalField) -> Self {
        self.insert(synonym, field);
        self
    }

    /// Resolve a raw header to its canonical field, if any.
    pub fn resolve(&self, header: &str) -> Option<CanonicalField> {
        self.entries.get(&fold_header(header)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SynonymTable {
    /// ERP export headers plus their English equivalents.
    fn default() -> Self {
        use CanonicalField::*;
        let pairs: &[(&str, CanonicalField)] = &[
            ("dt_movimento", Date),
            ("data", Date),
            ("date", Date),
            ("quantidade", Quantity),
            ("qtd", Quantity),
            ("quantity", Quantity),
            ("cd_material", EntityId),
            ("codigo", EntityId),
            ("item_id", EntityId),
            ("descricao_material", EntityName),
            ("produto", EntityName),
            ("item_name", EntityName),
            ("descricao_subgrupo", GroupId),
            ("subgrupo", GroupId),
            ("group", GroupId),
            ("tipo_movimento", MovementType),
            ("movement_type", MovementType),
        ];
        let mut table = Self::empty();
        for (synonym, field) in pairs {
            table.insert(synonym, *field);
        }
        table
    }
}

impl From<BTreeMap<String, CanonicalField>> for SynonymTable {
    fn from(map: BTreeMap<String, CanonicalField>) -> Self {
        let mut table = Self::empty();
        for (synonym, field) in map {
            table.insert(&synonym, field);
        }
        table
    }
}

impl From<SynonymTable> for BTreeMap<String, CanonicalField> {
    fn from(table: SynonymTable) -> Self {
        table.entries
    }
}

/// One raw tabular batch as delivered by the input collaborator.
///
/// Header strings and row order are preserved exactly; rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of matching a header row against a synonym table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMapping {
    /// Column index per mapped canonical field.
    pub columns: BTreeMap<CanonicalField, usize>,
    /// Headers that matched no synonym.
    pub unmapped: Vec<String>,
    /// Earlier columns overwritten by a later column mapping to the same field.
    pub shadowed: Vec<(CanonicalField, String)>,
    /// Required fields with no column.
    pub missing: Vec<CanonicalField>,
}

impl HeaderMapping {
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }
}

/// Map headers to canonical fields.
///
/// When two columns map to the same field the later column wins and the
/// earlier one is recorded in `shadowed`.
pub fn map_headers(headers: &[String], synonyms: &SynonymTable) -> HeaderMapping {
    let mut mapping = HeaderMapping::default();

    for (idx, header) in headers.iter().enumerate() {
        match synonyms.resolve(header) {
            Some(field) => {
                if let Some(prev) = mapping.columns.insert(field, idx) {
                    debug!(field = %field, previous = %headers[prev], current = %header, "column shadowed");
                    mapping.shadowed.push((field, headers[prev].clone()));
                }
            }
            None => mapping.unmapped.push(header.clone()),
        }
    }

    mapping.missing = CanonicalField::REQUIRED
        .iter()
        .filter(|f| !mapping.columns.contains_key(f))
        .copied()
        .collect();

    mapping
}

/// A row restricted to the canonical schema with parsed date and quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRow {
    pub date: NaiveDate,
    pub quantity: f64,
    pub entity_id: String,
    pub entity_name: String,
    pub group_id: String,
    pub movement_type: Option<String>,
}

/// A raw row that was skipped because one of its fields could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based record number within the batch (header excluded).
    pub row: usize,
    pub field: CanonicalField,
    pub value: String,
    pub reason: String,
}

/// An entity id seen with more than one name or group in the same batch.
///
/// `values` lists every distinct value in order of appearance; the first one
/// is used downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityConflict {
    pub entity_id: String,
    pub field: CanonicalField,
    pub values: Vec<String>,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub rows: Vec<CanonicalRow>,
    pub mapping: HeaderMapping,
    pub row_issues: Vec<RowIssue>,
    pub conflicts: Vec<EntityConflict>,
    /// Rows dropped by the movement filter.
    pub filtered_out: usize,
}

/// Normalize a raw batch to canonical rows.
///
/// Fails with [`PipelineError::SchemaValidation`] naming every missing
/// required field. Otherwise never fails: unparseable rows become
/// [`RowIssue`]s and inconsistent entities become [`EntityConflict`]s.
pub fn normalize(
    batch: &RawBatch,
    synonyms: &SynonymTable,
    movement_filter: Option<&str>,
) -> Result<NormalizedBatch> {
    let mapping = map_headers(&batch.headers, synonyms);
    if !mapping.missing.is_empty() {
        return Err(PipelineError::SchemaValidation {
            missing: mapping.missing.clone(),
        });
    }

    let movement_col = mapping.column(CanonicalField::MovementType);
    let filter = match (movement_filter, movement_col) {
        (Some(value), Some(_)) => Some(fold_header(value)),
        (Some(value), None) => {
            warn!(filter = value, "movement filter configured but batch has no movement_type column; not filtering");
            None
        }
        (None, _) => None,
    };

    let mut rows = Vec::with_capacity(batch.records.len());
    let mut row_issues = Vec::new();
    let mut filtered_out = 0usize;

    for (idx, record) in batch.records.iter().enumerate() {
        let row_no = idx + 1;
        let cell = |field: CanonicalField| cell_value(&mapping, record, field);

        let movement_type = movement_col.map(|_| cell(CanonicalField::MovementType).to_string());
        if let (Some(wanted), Some(movement)) = (&filter, &movement_type) {
            if &fold_header(movement) != wanted {
                filtered_out += 1;
                continue;
            }
        }

        let raw_date = cell(CanonicalField::Date);
        let Some(date) = parse_date(raw_date) else {
            row_issues.push(RowIssue {
                row: row_no,
                field: CanonicalField::Date,
                value: raw_date.to_string(),
                reason: "unrecognised date format".to_string(),
            });
            continue;
        };

        let raw_qty = cell(CanonicalField::Quantity);
        let quantity = match parse_quantity(raw_qty) {
            Ok(q) => q,
            Err(reason) => {
                row_issues.push(RowIssue {
                    row: row_no,
                    field: CanonicalField::Quantity,
                    value: raw_qty.to_string(),
                    reason,
                });
                continue;
            }
        };

        let entity_id = cell(CanonicalField::EntityId);
        if entity_id.is_empty() {
            row_issues.push(RowIssue {
                row: row_no,
                field: CanonicalField::EntityId,
                value: String::new(),
                reason: "empty entity id".to_string(),
            });
            continue;
        }

        rows.push(CanonicalRow {
            date,
            quantity,
            entity_id: entity_id.to_string(),
            entity_name: cell(CanonicalField::EntityName).to_string(),
            group_id: cell(CanonicalField::GroupId).to_string(),
            movement_type,
        });
    }

    if !row_issues.is_empty() {
        warn!(skipped = row_issues.len(), "rows skipped during normalization");
    }

    let conflicts = detect_conflicts(&rows);
    for conflict in &conflicts {
        warn!(
            entity = %conflict.entity_id,
            field = %conflict.field,
            values = ?conflict.values,
            "entity has conflicting values"
        );
    }

    Ok(NormalizedBatch {
        rows,
        mapping,
        row_issues,
        conflicts,
        filtered_out,
    })
}

fn cell_value<'a>(mapping: &HeaderMapping, record: &'a [String], field: CanonicalField) -> &'a str {
    mapping
        .column(field)
        .and_then(|c| record.get(c))
        .map(|s| s.trim())
        .unwrap_or("")
}

fn detect_conflicts(rows: &[CanonicalRow]) -> Vec<EntityConflict> {
    let mut order: Vec<&str> = Vec::new();
    let mut names: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();

    for row in rows {
        let id = row.entity_id.as_str();
        if !names.contains_key(id) {
            order.push(id);
        }
        let seen = names.entry(id).or_default();
        if !seen.contains(&row.entity_name.as_str()) {
            seen.push(&row.entity_name);
        }
        let seen = groups.entry(id).or_default();
        if !seen.contains(&row.group_id.as_str()) {
            seen.push(&row.group_id);
        }
    }

    let mut conflicts = Vec::new();
    for id in order {
        for (field, seen) in [
            (CanonicalField::EntityName, &names[id]),
            (CanonicalField::GroupId, &groups[id]),
        ] {
            if seen.len() > 1 {
                conflicts.push(EntityConflict {
                    entity_id: id.to_string(),
                    field,
                    values: seen.iter().map(|s| s.to_string()).collect(),
                });
            }
        }
    }
    conflicts
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a calendar date; time-of-day components are discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Month-only values (`2024-01`) denote the first day of the month.
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()
}

/// Parse a finite quantity.
///
/// Either `.` or `,` may be the decimal separator, with the other one
/// grouping thousands: `1,234.56` and `1.234,56` both read as 1234.56. When
/// only one kind appears, a single occurrence is the decimal separator
/// (`7,25` is 7.25, and `1,234` is 1.234) while repeated occurrences group
/// thousands (`1.234.567`). Grouped digits must come in threes.
pub fn parse_quantity(raw: &str) -> std::result::Result<f64, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty quantity".to_string());
    }
    let plain = ungroup(s).ok_or_else(|| "not a number".to_string())?;
    match plain.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err("non-finite quantity".to_string()),
        Err(_) => Err("not a number".to_string()),
    }
}

/// Rewrite a number with `.` as its only separator. `None` when the
/// separators are inconsistent.
fn ungroup(s: &str) -> Option<String> {
    let (grouping, decimal) = match (s.rfind(','), s.rfind('.')) {
        (None, None) => return Some(s.to_string()),
        (Some(comma), Some(dot)) if comma > dot => (Some('.'), Some(',')),
        (Some(_), Some(_)) => (Some(','), Some('.')),
        (Some(_), None) if s.matches(',').count() > 1 => (Some(','), None),
        (Some(_), None) => (None, Some(',')),
        (None, Some(_)) if s.matches('.').count() > 1 => (Some('.'), None),
        (None, Some(_)) => (None, Some('.')),
    };

    let (int_part, frac_part) = match decimal {
        Some(sep) => {
            let (int_part, frac_part) = s.rsplit_once(sep)?;
            if int_part.contains(sep) {
                return None;
            }
            (int_part, Some(frac_part))
        }
        None => (s, None),
    };

    let mut out = match grouping {
        Some(sep) => {
            let digits = int_part.trim_start_matches(|c: char| c == '+' || c == '-');
            let sign = &int_part[..int_part.len() - digits.len()];
            let is_digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());
            let mut groups = digits.split(sep);
            let head = groups.next()?;
            if !(1..=3).contains(&head.len()) || !is_digits(head) {
                return None;
            }
            let mut joined = format!("{}{}", sign, head);
            for group in groups {
                if group.len() != 3 || !is_digits(group) {
                    return None;
                }
                joined.push_str(group);
            }
            joined
        }
        None => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}
