use std::path::{Path, PathBuf};

use assert_cmd::Command;
use calamine::{open_workbook, Data, Reader, Xlsx};
use predicates::prelude::*;

const TEMPLATE: &str = "Category,Subcategory\nFood,Groceries\n,Dining\nTransport,Fuel\n";
const MARCH: &str = "date,merchant,amount\n01/03/2024,ShopX,-50\n15/03/2024,ShopX,-20\n";

fn penny(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("penny"));
    cmd.env("HOME", home).env_remove("PENNY_LOG");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn init(home: &Path) -> PathBuf {
    let data = home.join("data");
    let template = write(home, "template.csv", TEMPLATE);
    penny(home)
        .args(["init", "--data-dir"])
        .arg(&data)
        .arg("--template")
        .arg(&template)
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized penny"));
    data
}

/// Numeric value of a month cell (1-based month) in the row for `sub` of a year sheet.
fn month_value(dashboard: &Path, year: &str, sub: &str, month: u32) -> Option<f64> {
    let mut book: Xlsx<_> = open_workbook(dashboard).unwrap();
    let range = book.worksheet_range(year).ok()?;
    let (first, _) = range.start()?;
    let (last, _) = range.end()?;
    let row = (first..=last).find(|r| {
        matches!(range.get_value((*r, 1)), Some(Data::String(s)) if s == sub)
    })?;
    match range.get_value((row, 1 + month))? {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        _ => None,
    }
}

fn sheet_names(dashboard: &Path) -> Vec<String> {
    let book: Xlsx<_> = open_workbook(dashboard).unwrap();
    book.sheet_names()
}

#[test]
fn status_before_init() {
    let home = tempfile::tempdir().unwrap();
    penny(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("penny init"));
}

#[test]
fn run_before_init_fails() {
    let home = tempfile::tempdir().unwrap();
    let file = write(home.path(), "march.csv", MARCH);
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("penny init"));
}

#[test]
fn taxonomy_lists_template() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    penny(home.path())
        .arg("taxonomy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries, Dining"))
        .stdout(predicate::str::contains("2 categories, 3 subcategories"));
}

#[test]
fn mapped_run_writes_year_sheet() {
    let home = tempfile::tempdir().unwrap();
    let data = init(home.path());
    penny(home.path())
        .args(["mappings", "set", "ShopX", "--category", "Food", "--subcategory", "Groceries"])
        .assert()
        .success();

    let file = write(home.path(), "march.csv", MARCH);
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dashboard updated"));

    let dashboard = data.join("dashboard.xlsx");
    assert_eq!(month_value(&dashboard, "2024", "Groceries", 3), Some(-70.0));
    assert_eq!(month_value(&dashboard, "2024", "Groceries", 4), None);
    assert_eq!(month_value(&dashboard, "2024", "Dining", 3), None);

    // same input again changes nothing
    let before = std::fs::read(&dashboard).unwrap();
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
    assert_eq!(std::fs::read(&dashboard).unwrap(), before);
}

#[test]
fn unknown_merchant_excluded_without_input() {
    let home = tempfile::tempdir().unwrap();
    let data = init(home.path());
    let file = write(home.path(), "march.csv", MARCH);
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Excluded ShopX"));
    assert!(!data.join("categories.json").exists());
}

#[test]
fn mapping_outside_template_rejected() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    penny(home.path())
        .args(["mappings", "set", "ShopX", "--category", "Food", "--subcategory", "Snacks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in the current template"));
}

#[test]
fn conflicts_listed_for_removed_category() {
    let home = tempfile::tempdir().unwrap();
    let data = init(home.path());
    write(
        &data,
        "categories.json",
        r#"{"ShopX": {"category": "Food", "subcategory": "Groceries"}, "Gym": ["Health", "Sport"]}"#,
    );
    penny(home.path())
        .arg("conflicts")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gym"))
        .stdout(predicate::str::contains("category removed"))
        .stdout(predicate::str::contains("ShopX").not());
}

#[test]
fn init_refuses_to_replace_dashboard() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let template = home.path().join("template.csv");
    penny(home.path())
        .args(["init", "--template"])
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn corrupt_store_not_reset_without_terminal() {
    let home = tempfile::tempdir().unwrap();
    let data = init(home.path());
    let store = write(&data, "categories.json", r#"{"ShopX": ["Food", "Groc"#);
    let file = write(home.path(), "march.csv", MARCH);
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
    assert_eq!(std::fs::read_to_string(&store).unwrap(), r#"{"ShopX": ["Food", "Groc"#);
}

#[test]
fn template_change_keeps_year_sheets() {
    let home = tempfile::tempdir().unwrap();
    let data = init(home.path());
    let dashboard = data.join("dashboard.xlsx");
    penny(home.path())
        .args(["mappings", "set", "ShopX", "--category", "Food", "--subcategory", "Groceries"])
        .assert()
        .success();
    let file = write(home.path(), "march.csv", MARCH);
    penny(home.path())
        .args(["run", "--yes", "--no-input"])
        .arg(&file)
        .assert()
        .success();

    let template = write(
        home.path(),
        "t2.csv",
        "Category,Subcategory\nFood,Groceries\n,Dining\n,Snacks\nTransport,Fuel\n",
    );
    penny(home.path())
        .arg("template")
        .arg(&template)
        .assert()
        .success()
        .stdout(predicate::str::contains("+ Food > Snacks"))
        .stdout(predicate::str::contains("Year sheets kept: 2024"));

    assert_eq!(sheet_names(&dashboard), vec!["Template", "2024"]);
    assert_eq!(month_value(&dashboard, "2024", "Groceries", 3), Some(-70.0));
    penny(home.path())
        .arg("taxonomy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries, Dining, Snacks"));
}
