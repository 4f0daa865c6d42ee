//! Parsing of the Template sheet into the category taxonomy.
//!
//! The Template is a two-column layout: category in column A, subcategory in
//! column B. Category cells are usually merged vertically, so a blank category
//! cell continues the category above it. The first row is a header.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{PennyError, Result};
use crate::models::CategoryPair;
use crate::workbook::Workbook;

pub const MAX_CATEGORIES: usize = 10_000;
pub const MAX_SUBCATEGORIES: usize = 100;
pub const MAX_NAME_LEN: usize = 100;

const CATEGORY_HEADERS: &[&str] = &["נושא", "נושא הוצאה", "category", "קטגוריה"];
const SUBCATEGORY_HEADERS: &[&str] = &["פירוט", "פירוט הוצאות", "subcategory", "תת-קטגוריה"];

/// Trim, collapse internal whitespace and drop spreadsheet error values (`#REF!`).
pub fn clean_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.starts_with('#') {
        return None;
    }
    Some(collapsed)
}

fn matches_header(value: Option<&str>, headers: &[&str]) -> bool {
    value.is_some_and(|v| {
        let lower = v.to_lowercase();
        headers.iter().any(|h| lower == *h)
    })
}

/// True when a row repeats the header vocabulary in either column.
pub fn is_header_row(category: Option<&str>, subcategory: Option<&str>) -> bool {
    matches_header(category, CATEGORY_HEADERS) || matches_header(subcategory, SUBCATEGORY_HEADERS)
}

/// One data row of the Template, as read from the sheet (1-based sheet line).
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRow {
    pub line: usize,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl TemplateRow {
    pub fn new(line: usize, category: Option<&str>, subcategory: Option<&str>) -> Self {
        Self {
            line,
            category: category.and_then(clean_name),
            subcategory: subcategory.and_then(clean_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub subcategories: Vec<String>,
}

/// The immutable, parsed Template: categories in declaration order, keyed by name.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<Category>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub taxonomy: Taxonomy,
    pub warnings: Vec<String>,
}

impl Taxonomy {
    /// Build a taxonomy from Template rows (header row already removed).
    pub fn parse(rows: &[TemplateRow]) -> Result<ParsedTemplate> {
        let suspicious = Regex::new(r"[=|;]").map_err(|e| PennyError::Other(e.to_string()))?;
        let mut categories: Vec<Category> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
        let mut warnings = Vec::new();
        let mut current: Option<usize> = None;

        for row in rows {
            let (cat, sub) = (row.category.as_deref(), row.subcategory.as_deref());
            if is_header_row(cat, sub) {
                debug!(line = row.line, "skipping repeated header row");
                continue;
            }

            if let Some(name) = cat {
                let continues_current =
                    current.is_some_and(|idx| categories[idx].name == name);
                if !continues_current {
                    if index.contains_key(name) {
                        return Err(PennyError::Taxonomy(format!(
                            "duplicate category '{name}' at row {}",
                            row.line
                        )));
                    }
                    check_name(name, "Category", &suspicious, &mut warnings);
                    index.insert(name.to_string(), categories.len());
                    categories.push(Category {
                        name: name.to_string(),
                        subcategories: Vec::new(),
                    });
                    current = Some(categories.len() - 1);
                }
            }

            let Some(sub) = sub else { continue };
            let Some(idx) = current else {
                return Err(PennyError::Taxonomy(format!(
                    "subcategory '{sub}' at row {} has no category",
                    row.line
                )));
            };
            let category = &mut categories[idx];
            if !seen_pairs.insert((category.name.clone(), sub.to_string())) {
                return Err(PennyError::Taxonomy(format!(
                    "duplicate subcategory '{sub}' in category '{}' at row {}",
                    category.name, row.line
                )));
            }
            check_name(sub, "Subcategory", &suspicious, &mut warnings);
            category.subcategories.push(sub.to_string());
        }

        if categories.is_empty() {
            return Err(PennyError::Taxonomy(
                "template is empty; add at least one category with subcategories".to_string(),
            ));
        }
        if categories.len() > MAX_CATEGORIES {
            return Err(PennyError::Taxonomy(format!(
                "too many categories ({}); maximum is {MAX_CATEGORIES}",
                categories.len()
            )));
        }

        for cat in &categories {
            match cat.subcategories.len() {
                0 => warnings.push(format!("Category '{}' has no subcategories", cat.name)),
                1 => warnings.push(format!(
                    "Category '{}' has only one subcategory (might be a mistake)",
                    cat.name
                )),
                n if n > MAX_SUBCATEGORIES => warnings.push(format!(
                    "Category '{}' has {n} subcategories (max recommended: {MAX_SUBCATEGORIES})",
                    cat.name
                )),
                _ => {}
            }
        }

        Ok(ParsedTemplate {
            taxonomy: Taxonomy { categories, index },
            warnings,
        })
    }

    /// Read the named Template sheet from the dashboard workbook and parse it.
    pub fn from_workbook(workbook: &Workbook, sheet_name: &str) -> Result<ParsedTemplate> {
        let Some(labels) = workbook.label_rows(sheet_name) else {
            let available = workbook.sheet_names().join(", ");
            return Err(PennyError::Taxonomy(format!(
                "template sheet '{sheet_name}' not found (available sheets: {})",
                if available.is_empty() { "none" } else { &available }
            )));
        };

        let rows: Vec<TemplateRow> = labels
            .iter()
            .map(|(line, cat, sub)| TemplateRow::new(*line, cat.as_deref(), sub.as_deref()))
            .collect();

        let parsed = Self::parse(&rows)?;
        for w in &parsed.warnings {
            warn!("template: {w}");
        }
        debug!(
            categories = parsed.taxonomy.categories.len(),
            pairs = parsed.taxonomy.pair_count(),
            "template parsed"
        );
        Ok(parsed)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.index.get(name).map(|&i| &self.categories[i])
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn contains(&self, pair: &CategoryPair) -> bool {
        self.category(&pair.category)
            .is_some_and(|c| c.subcategories.iter().any(|s| *s == pair.subcategory))
    }

    /// Reject a pair that is not part of the current Template.
    pub fn validate(&self, pair: &CategoryPair) -> Result<()> {
        if self.contains(pair) {
            Ok(())
        } else {
            Err(PennyError::Validation {
                category: pair.category.clone(),
                subcategory: pair.subcategory.clone(),
            })
        }
    }

    /// Every (category, subcategory) pair in Template order.
    pub fn pairs(&self) -> impl Iterator<Item = CategoryPair> + '_ {
        self.categories.iter().flat_map(|c| {
            c.subcategories
                .iter()
                .map(move |s| CategoryPair::new(c.name.clone(), s.clone()))
        })
    }

    pub fn pair_count(&self) -> usize {
        self.categories.iter().map(|c| c.subcategories.len()).sum()
    }
}

fn check_name(name: &str, kind: &str, suspicious: &Regex, warnings: &mut Vec<String>) {
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        let short: String = name.chars().take(50).collect();
        warnings.push(format!("{kind} name very long ({len} chars): '{short}...'"));
    }
    if suspicious.is_match(name) {
        warnings.push(format!("{kind} '{name}' contains suspicious characters (=, |, ;)"));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        warnings.push(format!("{kind} '{name}' is numeric-only (might be accidental)"));
    }
}

#[cfg(test)]
pub(crate) fn rows(pairs: &[(&str, &str)]) -> Vec<TemplateRow> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, (c, s))| TemplateRow::new(i + 2, Some(*c), Some(*s)))
        .collect()
}

#[cfg(test)]
pub(crate) fn sample() -> Taxonomy {
    Taxonomy::parse(&rows(&[
        ("Food", "Groceries"),
        ("", "Dining"),
        ("Transport", "Fuel"),
    ]))
    .unwrap()
    .taxonomy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merged_category_cells() {
        let t = sample();
        assert_eq!(t.categories().len(), 2);
        assert_eq!(t.categories()[0].subcategories, vec!["Groceries", "Dining"]);
        assert!(t.contains(&CategoryPair::new("Transport", "Fuel")));
        assert!(!t.contains(&CategoryPair::new("Transport", "Dining")));
    }

    #[test]
    fn test_pairs_follow_declaration_order() {
        let pairs: Vec<String> = sample().pairs().map(|p| p.to_string()).collect();
        assert_eq!(pairs, vec!["Food > Groceries", "Food > Dining", "Transport > Fuel"]);
    }

    #[test]
    fn test_repeated_current_category_continues_group() {
        let parsed = Taxonomy::parse(&rows(&[("Food", "Groceries"), ("Food", "Dining")])).unwrap();
        assert_eq!(parsed.taxonomy.categories().len(), 1);
        assert_eq!(parsed.taxonomy.pair_count(), 2);
    }

    #[test]
    fn test_duplicate_category_after_other_is_error() {
        let err = Taxonomy::parse(&rows(&[
            ("Food", "Groceries"),
            ("Transport", "Fuel"),
            ("Food", "Dining"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PennyError::Taxonomy(ref m) if m.contains("duplicate category 'Food'")));
    }

    #[test]
    fn test_duplicate_pair_is_error() {
        let err = Taxonomy::parse(&rows(&[("Food", "Groceries"), ("", "Groceries")])).unwrap_err();
        assert!(matches!(err, PennyError::Taxonomy(ref m) if m.contains("duplicate subcategory")));
    }

    #[test]
    fn test_subcategory_without_category_is_error() {
        let err = Taxonomy::parse(&rows(&[("", "Groceries")])).unwrap_err();
        assert!(matches!(err, PennyError::Taxonomy(ref m) if m.contains("has no category")));
    }

    #[test]
    fn test_empty_template_is_error() {
        assert!(matches!(Taxonomy::parse(&[]), Err(PennyError::Taxonomy(_))));
        assert!(matches!(
            Taxonomy::parse(&rows(&[("", ""), ("  ", "")])),
            Err(PennyError::Taxonomy(_))
        ));
    }

    #[test]
    fn test_header_rows_and_error_cells_skipped() {
        let parsed = Taxonomy::parse(&rows(&[
            ("Category", "Subcategory"),
            ("Food", "Groceries"),
            ("", "#REF!"),
            ("", "Dining"),
        ]))
        .unwrap();
        assert_eq!(parsed.taxonomy.categories().len(), 1);
        assert_eq!(parsed.taxonomy.categories()[0].subcategories, vec!["Groceries", "Dining"]);
    }

    #[test]
    fn test_names_are_whitespace_normalized() {
        let parsed = Taxonomy::parse(&rows(&[("  Food   Stuff ", " Super  market ")])).unwrap();
        assert!(parsed.taxonomy.contains(&CategoryPair::new("Food Stuff", "Super market")));
    }

    #[test]
    fn test_warnings_are_collected() {
        let parsed = Taxonomy::parse(&rows(&[("Food", "Groceries"), ("123", "a=b"), ("", "c")])).unwrap();
        let all = parsed.warnings.join("\n");
        assert!(all.contains("'Food' has only one subcategory"));
        assert!(all.contains("numeric-only"));
        assert!(all.contains("suspicious characters"));
    }

    #[test]
    fn test_validate_rejects_unknown_pair() {
        let t = sample();
        assert!(t.validate(&CategoryPair::new("Food", "Dining")).is_ok());
        assert!(matches!(
            t.validate(&CategoryPair::new("Food", "Fuel")),
            Err(PennyError::Validation { .. })
        ));
    }

    #[test]
    fn test_from_workbook_reads_template_sheet() {
        let pairs: Vec<CategoryPair> = sample().pairs().collect();
        let wb = Workbook::with_template("Template", &pairs).unwrap();
        let parsed = Taxonomy::from_workbook(&wb, "Template").unwrap();
        assert_eq!(parsed.taxonomy.pairs().collect::<Vec<_>>(), pairs);
    }

    #[test]
    fn test_missing_template_sheet() {
        let wb = Workbook::with_template("Budget", &[]).unwrap();
        let err = Taxonomy::from_workbook(&wb, "Template").unwrap_err();
        assert!(matches!(err, PennyError::Taxonomy(ref m) if m.contains("not found")));
    }
}
