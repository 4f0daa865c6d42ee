use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::conflicts::{ConflictKind, ConflictSet};
use crate::error::{PennyError, Result};
use crate::mapping::MappingStore;
use crate::models::{CategoryPair, ResolvedTxn, Transaction};
use crate::prompt::{CategoryPrompt, ChoiceRequest, Decision, PromptReason};
use crate::taxonomy::Taxonomy;

/// Answers outside the Template tolerated per merchant before giving up.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct MappingUpdate {
    pub merchant: String,
    pub pair: CategoryPair,
    pub previous: Option<CategoryPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// New merchant the user chose to skip.
    Declined,
    /// Flagged mapping the user did not remap.
    ConflictUnresolved,
}

/// Transactions left out of this run's dashboard write.
#[derive(Debug, Clone, PartialEq)]
pub struct Excluded {
    pub merchant: String,
    pub transactions: usize,
    pub amount: Decimal,
    pub reason: ExclusionReason,
}

#[derive(Debug, Default)]
pub struct CategorizeResult {
    pub resolved: Vec<ResolvedTxn>,
    pub updates: Vec<MappingUpdate>,
    pub excluded: Vec<Excluded>,
}

impl CategorizeResult {
    pub fn excluded_transactions(&self) -> usize {
        self.excluded.iter().map(|e| e.transactions).sum()
    }
}

pub struct Categorizer<'a> {
    taxonomy: &'a Taxonomy,
    conflicts: &'a ConflictSet,
}

/// Transactions grouped by normalized merchant, in first-seen order.
fn group_by_merchant(txns: Vec<Transaction>) -> Vec<(String, Vec<Transaction>)> {
    let mut order: Vec<(String, Vec<Transaction>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for txn in txns {
        match index.get(&txn.merchant) {
            Some(&i) => order[i].1.push(txn),
            None => {
                index.insert(txn.merchant.clone(), order.len());
                order.push((txn.merchant.clone(), vec![txn]));
            }
        }
    }
    order
}

impl<'a> Categorizer<'a> {
    pub fn new(taxonomy: &'a Taxonomy, conflicts: &'a ConflictSet) -> Self {
        Self {
            taxonomy,
            conflicts,
        }
    }

    /// Resolve every transaction to a Template pair. Known, unflagged merchants
    /// are assigned directly; everything else goes through `prompt`, once per
    /// merchant. Accepted answers are upserted into `store` (in memory only).
    pub fn categorize(
        &self,
        txns: Vec<Transaction>,
        store: &mut MappingStore,
        prompt: &mut dyn CategoryPrompt,
    ) -> Result<CategorizeResult> {
        let mut result = CategorizeResult::default();

        for (merchant, group) in group_by_merchant(txns) {
            let reason = match store.lookup(&merchant) {
                Some(pair) if !self.conflicts.is_flagged(&merchant) && self.taxonomy.contains(pair) => {
                    let pair = pair.clone();
                    debug!(merchant = %merchant, %pair, "known merchant");
                    result.resolved.extend(group.into_iter().map(|txn| ResolvedTxn {
                        txn,
                        pair: pair.clone(),
                    }));
                    continue;
                }
                Some(pair) => PromptReason::Conflict {
                    previous: pair.clone(),
                    kind: self.conflict_kind(&merchant, pair),
                },
                None => PromptReason::NewMerchant,
            };

            match self.ask(&merchant, reason.clone(), &group, store, prompt)? {
                Some(pair) => {
                    let previous = store.upsert(&merchant, pair.clone());
                    info!(merchant = %merchant, %pair, "mapping recorded");
                    result.updates.push(MappingUpdate {
                        merchant: merchant.clone(),
                        pair: pair.clone(),
                        previous,
                    });
                    result.resolved.extend(group.into_iter().map(|txn| ResolvedTxn {
                        txn,
                        pair: pair.clone(),
                    }));
                }
                None => {
                    let excluded_reason = match &reason {
                        PromptReason::NewMerchant => {
                            info!(merchant = %merchant, count = group.len(), "merchant skipped; excluded from this run");
                            ExclusionReason::Declined
                        }
                        PromptReason::Conflict { previous, .. } => {
                            let err = PennyError::ConflictUnresolved {
                                merchant: merchant.clone(),
                                category: previous.category.clone(),
                                subcategory: previous.subcategory.clone(),
                            };
                            warn!(count = group.len(), "{err}; excluded from this run");
                            ExclusionReason::ConflictUnresolved
                        }
                    };
                    result.excluded.push(Excluded {
                        merchant,
                        transactions: group.len(),
                        amount: group.iter().map(|t| t.amount).sum(),
                        reason: excluded_reason,
                    });
                }
            }
        }

        Ok(result)
    }

    /// Walk every flagged entry, whether or not it shows up in a statement.
    /// Declined entries keep their old target.
    pub fn remap(
        &self,
        store: &mut MappingStore,
        prompt: &mut dyn CategoryPrompt,
    ) -> Result<Vec<MappingUpdate>> {
        let mut updates = Vec::new();
        for conflict in self.conflicts.iter() {
            let reason = PromptReason::Conflict {
                previous: conflict.target.clone(),
                kind: conflict.kind,
            };
            let Some(pair) = self.ask(&conflict.merchant, reason, &[], store, prompt)? else {
                info!(merchant = %conflict.merchant, "left unresolved");
                continue;
            };
            let previous = store.upsert(&conflict.merchant, pair.clone());
            updates.push(MappingUpdate {
                merchant: conflict.merchant.clone(),
                pair,
                previous,
            });
        }
        Ok(updates)
    }

    fn conflict_kind(&self, merchant: &str, previous: &CategoryPair) -> ConflictKind {
        if let Some(conflict) = self.conflicts.get(merchant) {
            return conflict.kind;
        }
        if self.taxonomy.has_category(&previous.category) {
            ConflictKind::SubcategoryRemoved
        } else {
            ConflictKind::CategoryRemoved
        }
    }

    /// Ask until the answer is a Template pair. `None` means declined.
    fn ask(
        &self,
        merchant: &str,
        reason: PromptReason,
        group: &[Transaction],
        store: &MappingStore,
        prompt: &mut dyn CategoryPrompt,
    ) -> Result<Option<CategoryPair>> {
        let suggestion = match &reason {
            PromptReason::NewMerchant => store
                .find_similar(merchant)
                .map(|(_, pair)| pair)
                .filter(|pair| self.taxonomy.contains(pair)),
            PromptReason::Conflict { .. } => None,
        };

        let mut rejected: Option<CategoryPair> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let request = ChoiceRequest {
                merchant,
                reason: reason.clone(),
                sample: group.first(),
                occurrences: group.len(),
                suggestion,
                rejected: rejected.as_ref(),
            };
            match prompt.request_category_choice(&request, self.taxonomy)? {
                Decision::Choose(pair) => match self.taxonomy.validate(&pair) {
                    Ok(()) => return Ok(Some(pair)),
                    Err(e) => {
                        warn!(merchant, attempt, "rejected answer: {e}");
                        if attempt == MAX_ATTEMPTS {
                            return Err(e);
                        }
                        rejected = Some(pair);
                    }
                },
                Decision::Decline => return Ok(None),
                Decision::Abort => return Err(PennyError::Aborted),
            }
        }
        Ok(None)
    }
}
