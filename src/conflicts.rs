use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use crate::error::Result;
use crate::mapping::MappingStore;
use crate::models::CategoryPair;
use crate::normalizer::normalize_merchant;
use crate::taxonomy::Taxonomy;
use crate::workbook::TabularDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The whole category is gone: every entry pointing into it is flagged.
    CategoryRemoved,
    /// The category survives but this subcategory does not.
    SubcategoryRemoved,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::CategoryRemoved => write!(f, "category removed"),
            ConflictKind::SubcategoryRemoved => write!(f, "subcategory removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub merchant: String,
    pub target: CategoryPair,
    pub kind: ConflictKind,
}

/// Mapping entries whose target is missing from the current Template, keyed by
/// normalized merchant.
#[derive(Debug, Clone, Default)]
pub struct ConflictSet {
    flagged: BTreeMap<String, Conflict>,
}

impl ConflictSet {
    pub fn is_flagged(&self, merchant: &str) -> bool {
        self.flagged.contains_key(&normalize_merchant(merchant))
    }

    pub fn get(&self, merchant: &str) -> Option<&Conflict> {
        self.flagged.get(&normalize_merchant(merchant))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.flagged.values()
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }
}

/// Flag every store entry whose (category, subcategory) is absent from `taxonomy`.
/// Entries are never touched here; they stay as history until remapped.
pub fn detect_conflicts(taxonomy: &Taxonomy, store: &MappingStore) -> ConflictSet {
    let mut set = ConflictSet::default();
    for (merchant, target) in store.entries() {
        let kind = match taxonomy.category(&target.category) {
            None => ConflictKind::CategoryRemoved,
            Some(cat) if !cat.subcategories.contains(&target.subcategory) => {
                ConflictKind::SubcategoryRemoved
            }
            Some(_) => continue,
        };
        set.flagged.insert(
            merchant.clone(),
            Conflict {
                merchant: merchant.clone(),
                target: target.clone(),
                kind,
            },
        );
    }
    if set.is_empty() {
        info!("no mapping conflicts with the current template");
    } else {
        warn!(count = set.len(), "mapping entries point at removed categories");
    }
    set
}

/// A dashboard row whose key is no longer part of the Template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRow {
    pub sheet: String,
    pub row: usize,
    pub key: CategoryPair,
}

/// Report rows in year sheets that the current Template no longer defines.
/// Such rows keep their data; nothing is removed.
pub fn stale_rows<D: TabularDocument + ?Sized>(
    taxonomy: &Taxonomy,
    doc: &D,
) -> Result<Vec<StaleRow>> {
    let mut stale = Vec::new();
    for sheet in doc.sheet_names() {
        if sheet.len() != 4 || sheet.parse::<i32>().is_err() {
            continue;
        }
        for (row, key) in doc.row_keys(&sheet)? {
            if !taxonomy.contains(&key) {
                stale.push(StaleRow {
                    sheet: sheet.clone(),
                    row,
                    key,
                });
            }
        }
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{rows, sample};
    use crate::workbook::Workbook;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn store_with(dir: &tempfile::TempDir, items: &[(&str, &str, &str)]) -> MappingStore {
        let mut store = MappingStore::empty(&dir.path().join("categories.json"));
        for (m, c, s) in items {
            store.upsert(m, CategoryPair::new(*c, *s));
        }
        store
    }

    fn taxonomy_of(pairs: &[CategoryPair]) -> Taxonomy {
        let raw: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.category.as_str(), p.subcategory.as_str()))
            .collect();
        Taxonomy::parse(&rows(&raw)).unwrap().taxonomy
    }

    #[test]
    fn test_removing_unused_subcategory_flags_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &[("ShopX", "Food", "Groceries")]);
        let t = taxonomy_of(&[
            CategoryPair::new("Food", "Groceries"),
            CategoryPair::new("Transport", "Fuel"),
        ]);
        assert!(detect_conflicts(&t, &store).is_empty());
    }

    #[test]
    fn test_removing_category_flags_its_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &[("ShopX", "Food", "Groceries")]);
        let t = taxonomy_of(&[CategoryPair::new("Transport", "Fuel")]);
        let set = detect_conflicts(&t, &store);
        assert_eq!(set.len(), 1);
        let conflict = set.get("ShopX").unwrap();
        assert_eq!(conflict.kind, ConflictKind::CategoryRemoved);
        assert_eq!(conflict.target, CategoryPair::new("Food", "Groceries"));
        // history is untouched
        assert_eq!(store.lookup("ShopX"), Some(&CategoryPair::new("Food", "Groceries")));
    }

    #[test]
    fn test_removing_subcategory_flags_only_that_subcategory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            &[
                ("ShopX", "Food", "Groceries"),
                ("Cafe", "Food", "Dining"),
                ("Fuelco", "Transport", "Fuel"),
            ],
        );
        let t = taxonomy_of(&[
            CategoryPair::new("Food", "Groceries"),
            CategoryPair::new("Transport", "Fuel"),
        ]);
        let set = detect_conflicts(&t, &store);
        assert_eq!(set.len(), 1);
        assert!(set.is_flagged("Cafe"));
        assert_eq!(set.get("Cafe").unwrap().kind, ConflictKind::SubcategoryRemoved);
        assert!(!set.is_flagged("ShopX"));
    }

    #[test]
    fn test_random_edits_flag_exactly_missing_targets() {
        let mut rng = StdRng::seed_from_u64(7);
        let full: Vec<CategoryPair> = (0..6)
            .flat_map(|c| (0..4).map(move |s| CategoryPair::new(format!("Cat{c}"), format!("Sub{s}"))))
            .collect();

        for round in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let mut store = MappingStore::empty(&dir.path().join("categories.json"));
            for i in 0..20 {
                let target = full.choose(&mut rng).unwrap().clone();
                store.upsert(&format!("Merchant{round}x{i}"), target);
            }

            // add-only edits never produce conflicts
            let mut grown = full.clone();
            grown.push(CategoryPair::new("Cat9", "New"));
            assert!(detect_conflicts(&taxonomy_of(&grown), &store).is_empty());

            // drop a random category plus a few random subcategories
            let dropped_cat = format!("Cat{}", rng.gen_range(0..6));
            let kept: Vec<CategoryPair> = full
                .iter()
                .filter(|p| p.category != dropped_cat)
                .filter(|_| rng.gen_bool(0.8))
                .cloned()
                .collect();
            if kept.is_empty() {
                continue;
            }
            let t = taxonomy_of(&kept);
            let set = detect_conflicts(&t, &store);
            for (merchant, target) in store.entries() {
                assert_eq!(set.is_flagged(merchant), !kept.contains(target));
                if target.category == dropped_cat {
                    assert_eq!(set.get(merchant).unwrap().kind, ConflictKind::CategoryRemoved);
                }
            }
        }
    }

    #[test]
    fn test_stale_rows_in_year_sheets() {
        let mut wb = Workbook::with_template(
            "Template",
            &[
                CategoryPair::new("Food", "Groceries"),
                CategoryPair::new("Food", "Snacks"),
            ],
        )
        .unwrap();
        wb.clone_sheet_layout("Template", "2024").unwrap();
        let stale = stale_rows(&sample(), &wb).unwrap();
        assert_eq!(
            stale,
            vec![StaleRow {
                sheet: "2024".into(),
                row: 2,
                key: CategoryPair::new("Food", "Snacks"),
            }]
        );
    }
}
