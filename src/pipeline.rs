//! One run, start to finish: everything is computed in memory first and only
//! `commit` touches the dashboard and the mapping store.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::{info, warn};

use crate::aggregator::Aggregates;
use crate::atomic::backup_file;
use crate::categorizer::{CategorizeResult, Categorizer};
use crate::conflicts::{detect_conflicts, ConflictSet};
use crate::error::{PennyError, Result};
use crate::importer::read_transaction_files;
use crate::mapping::MappingStore;
use crate::normalizer::{normalize, NormalizeReport};
use crate::prompt::CategoryPrompt;
use crate::reconciler::{reconcile, ReconcileReport};
use crate::settings::{ExistingCellPolicy, Settings};
use crate::taxonomy::Taxonomy;
use crate::workbook::Workbook;

/// Load the mapping store. A corrupt file is replaced by an empty store only
/// after an explicit confirmation, and is copied aside first.
pub fn load_store(path: &Path, prompt: &mut dyn CategoryPrompt) -> Result<(MappingStore, bool)> {
    match MappingStore::load(path) {
        Ok(store) => Ok((store, false)),
        Err(err @ PennyError::StoreCorrupt { .. }) => {
            warn!("{err}");
            let question = format!(
                "{err}\nStart from an empty mapping store? (a copy of the file is kept)"
            );
            if !prompt.confirm_destructive(&question)? {
                return Err(err);
            }
            let backup = backup_file(path)?;
            println!("Corrupt mapping store copied to {}", backup.display());
            Ok((MappingStore::empty(path), true))
        }
        Err(err) => Err(err),
    }
}

/// The dashboard and its parsed Template.
pub fn load_dashboard(settings: &Settings) -> Result<(Workbook, Taxonomy, Vec<String>)> {
    let workbook = Workbook::open(&settings.dashboard_path())?;
    let parsed = Taxonomy::from_workbook(&workbook, &settings.template_sheet)?;
    Ok((workbook, parsed.taxonomy, parsed.warnings))
}

pub struct PreparedRun {
    pub dashboard_path: PathBuf,
    pub template_sheet: String,
    pub workbook: Workbook,
    pub taxonomy: Taxonomy,
    pub store: MappingStore,
    /// The store on disk was corrupt and must be rewritten even without updates.
    pub store_reset: bool,
    pub conflicts: ConflictSet,
    pub normalized: NormalizeReport,
    pub categorized: CategorizeResult,
    pub aggregates: Aggregates,
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub reconcile: ReconcileReport,
    pub dashboard_saved: bool,
    pub store_saved: bool,
}

/// Read, normalize, categorize and aggregate `files`. Nothing is written.
pub fn prepare(
    settings: &Settings,
    files: &[PathBuf],
    prompt: &mut dyn CategoryPrompt,
) -> Result<PreparedRun> {
    let (workbook, taxonomy, _) = load_dashboard(settings)?;
    let (mut store, store_reset) = load_store(&settings.mapping_path(), prompt)?;
    let conflicts = detect_conflicts(&taxonomy, &store);

    let tables = read_transaction_files(files)?;
    let (txns, normalized) = normalize(tables)?;
    info!(transactions = txns.len(), files = normalized.files, "transactions ready");

    let categorized = Categorizer::new(&taxonomy, &conflicts).categorize(txns, &mut store, prompt)?;
    let aggregates = Aggregates::aggregate(&categorized.resolved)?;
    aggregates.validate(chrono::Local::now().year())?;

    Ok(PreparedRun {
        dashboard_path: settings.dashboard_path(),
        template_sheet: settings.template_sheet.clone(),
        workbook,
        taxonomy,
        store,
        store_reset,
        conflicts,
        normalized,
        categorized,
        aggregates,
    })
}

impl PreparedRun {
    /// Reconcile into a copy of the dashboard, then save the dashboard and the
    /// store, each atomically. Any error before the first save leaves both files
    /// as they were.
    pub fn commit(self, policy: ExistingCellPolicy) -> Result<CommitOutcome> {
        let mut updated = self.workbook.clone();
        let report = reconcile(
            &mut updated,
            &self.taxonomy,
            &self.aggregates,
            &self.template_sheet,
            policy,
        )?;

        let dashboard_saved = report.changed();
        if dashboard_saved {
            updated.save(&self.dashboard_path)?;
        } else {
            info!("dashboard already up to date");
        }

        let store_saved = self.store_reset || !self.categorized.updates.is_empty();
        if store_saved {
            self.store.save()?;
        }

        Ok(CommitOutcome {
            reconcile: report,
            dashboard_saved,
            store_saved,
        })
    }
}
