//! The interactive boundary: the pipeline asks, something outside answers.

use colored::Colorize;
use comfy_table::{Cell, Table};
use dialoguer::{Confirm, Input};
use tracing::warn;

use crate::conflicts::ConflictKind;
use crate::error::Result;
use crate::fmt::money;
use crate::models::{CategoryPair, Transaction};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, PartialEq)]
pub enum PromptReason {
    NewMerchant,
    Conflict {
        previous: CategoryPair,
        kind: ConflictKind,
    },
}

/// Everything shown to the user when a merchant needs a category.
#[derive(Debug, Clone)]
pub struct ChoiceRequest<'a> {
    pub merchant: &'a str,
    pub reason: PromptReason,
    pub sample: Option<&'a Transaction>,
    pub occurrences: usize,
    pub suggestion: Option<&'a CategoryPair>,
    /// The previous answer, when it was rejected for not being in the Template.
    pub rejected: Option<&'a CategoryPair>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Choose(CategoryPair),
    /// Leave this merchant for a later run.
    Decline,
    /// Stop the whole run; nothing is written.
    Abort,
}

pub trait CategoryPrompt {
    fn request_category_choice(
        &mut self,
        request: &ChoiceRequest<'_>,
        taxonomy: &Taxonomy,
    ) -> Result<Decision>;

    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Confirmation for a step that discards saved data. Never implied by `--yes`.
    fn confirm_destructive(&mut self, question: &str) -> Result<bool>;
}

/// Prompts on the terminal: a numbered list of Template pairs, then one
/// question per merchant.
pub struct TerminalPrompt {
    symbol: String,
    listed: bool,
}

impl TerminalPrompt {
    pub fn new(currency_symbol: &str) -> Self {
        Self {
            symbol: currency_symbol.to_string(),
            listed: false,
        }
    }

    fn print_choices(&mut self, taxonomy: &Taxonomy) {
        if self.listed {
            return;
        }
        let mut table = Table::new();
        table.set_header(vec!["#", "Category", "Subcategory"]);
        for (i, pair) in taxonomy.pairs().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&pair.category),
                Cell::new(&pair.subcategory),
            ]);
        }
        println!("Categories\n{table}\n");
        self.listed = true;
    }
}

/// Parse a typed answer: a list number, or "Category > Subcategory" / "Category/Subcategory".
fn parse_choice(answer: &str, pairs: &[CategoryPair]) -> Option<CategoryPair> {
    if let Ok(n) = answer.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| pairs.get(i)).cloned();
    }
    let (cat, sub) = answer.split_once('>').or_else(|| answer.split_once('/'))?;
    let (cat, sub) = (cat.trim(), sub.trim());
    if cat.is_empty() || sub.is_empty() {
        return None;
    }
    Some(CategoryPair::new(cat, sub))
}

/// What a typed answer means; `None` when it is neither a command nor a valid choice.
fn interpret_answer(answer: &str, pairs: &[CategoryPair]) -> Option<Decision> {
    let answer = answer.trim();
    match answer.to_lowercase().as_str() {
        "q" => Some(Decision::Abort),
        "s" | "" => Some(Decision::Decline),
        _ => parse_choice(answer, pairs).map(Decision::Choose),
    }
}

impl CategoryPrompt for TerminalPrompt {
    fn request_category_choice(
        &mut self,
        request: &ChoiceRequest<'_>,
        taxonomy: &Taxonomy,
    ) -> Result<Decision> {
        self.print_choices(taxonomy);
        let pairs: Vec<CategoryPair> = taxonomy.pairs().collect();

        println!("{}", "\u{2500}".repeat(60));
        println!("  Merchant:    {}", request.merchant.bold());
        if let Some(txn) = request.sample {
            if txn.merchant_raw.trim() != request.merchant {
                println!("  As printed:  {}", txn.merchant_raw.trim());
            }
            println!("  Date:        {}", txn.date);
            let amt = money(txn.amount, &self.symbol);
            let amt = if txn.amount.is_sign_negative() { amt.red() } else { amt.green() };
            println!("  Amount:      {amt}");
            println!("  Source:      {}", txn.source);
        }
        if request.occurrences > 1 {
            println!("  Occurrences: {}", request.occurrences);
        }
        if let PromptReason::Conflict { previous, kind } = &request.reason {
            println!(
                "  {}",
                format!("Was mapped to {previous}, but the {kind}.").yellow()
            );
        }
        if let Some(rejected) = request.rejected {
            println!("{}", format!("'{rejected}' is not in the template.").red());
        }
        println!();

        loop {
            let mut input = Input::<String>::new().with_prompt("Category # (or s=skip, q=quit)");
            if let Some(suggested) = request.suggestion {
                if let Some(pos) = pairs.iter().position(|p| p == suggested) {
                    input = input.default((pos + 1).to_string());
                }
            }
            let Ok(answer) = input.interact_text() else {
                return Ok(Decision::Abort);
            };
            match interpret_answer(&answer, &pairs) {
                Some(Decision::Choose(pair)) => {
                    println!("{}", format!("\u{2192} {pair}").green());
                    return Ok(Decision::Choose(pair));
                }
                Some(decision) => return Ok(decision),
                None => println!(
                    "{}",
                    format!(
                        "'{}' is not a choice: enter 1-{}, 'Category > Subcategory', s or q.",
                        answer.trim(),
                        pairs.len()
                    )
                    .red()
                ),
            }
        }
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
            .unwrap_or(false))
    }

    fn confirm_destructive(&mut self, question: &str) -> Result<bool> {
        self.confirm(question)
    }
}

/// Answers without a terminal: every category question is declined, every
/// confirmation gets `assume_yes`, and anything that discards data is refused.
pub struct HeadlessPrompt {
    assume_yes: bool,
}

impl HeadlessPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl CategoryPrompt for HeadlessPrompt {
    fn request_category_choice(
        &mut self,
        _request: &ChoiceRequest<'_>,
        _taxonomy: &Taxonomy,
    ) -> Result<Decision> {
        Ok(Decision::Decline)
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(self.assume_yes)
    }

    fn confirm_destructive(&mut self, question: &str) -> Result<bool> {
        warn!("refusing without a terminal: {question}");
        Ok(false)
    }
}

/// Canned answers for tests; records which merchants were asked about.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedPrompt {
    pub answers: std::collections::VecDeque<Decision>,
    pub confirmations: std::collections::VecDeque<bool>,
    pub asked: Vec<(String, PromptReason)>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub fn new(answers: Vec<Decision>) -> Self {
        Self {
            answers: answers.into(),
            ..Default::default()
        }
    }

    pub fn choose(category: &str, subcategory: &str) -> Decision {
        Decision::Choose(CategoryPair::new(category, subcategory))
    }
}

#[cfg(test)]
impl CategoryPrompt for ScriptedPrompt {
    fn request_category_choice(
        &mut self,
        request: &ChoiceRequest<'_>,
        _taxonomy: &Taxonomy,
    ) -> Result<Decision> {
        self.asked
            .push((request.merchant.to_string(), request.reason.clone()));
        Ok(self.answers.pop_front().unwrap_or(Decision::Decline))
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(self.confirmations.pop_front().unwrap_or(false))
    }

    fn confirm_destructive(&mut self, question: &str) -> Result<bool> {
        self.confirm(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<CategoryPair> {
        vec![
            CategoryPair::new("Food", "Groceries"),
            CategoryPair::new("Transport", "Fuel"),
        ]
    }

    #[test]
    fn test_parse_choice_by_number() {
        assert_eq!(parse_choice("2", &pairs()), Some(CategoryPair::new("Transport", "Fuel")));
        assert_eq!(parse_choice("0", &pairs()), None);
        assert_eq!(parse_choice("3", &pairs()), None);
    }

    #[test]
    fn test_parse_choice_by_name() {
        assert_eq!(
            parse_choice("Food > Dining", &pairs()),
            Some(CategoryPair::new("Food", "Dining"))
        );
        assert_eq!(
            parse_choice("Food/Groceries", &pairs()),
            Some(CategoryPair::new("Food", "Groceries"))
        );
        assert_eq!(parse_choice("Food >", &pairs()), None);
        assert_eq!(parse_choice("nonsense", &pairs()), None);
    }

    #[test]
    fn test_headless_declines() {
        let taxonomy = crate::taxonomy::sample();
        let mut prompt = HeadlessPrompt::new(true);
        let request = ChoiceRequest {
            merchant: "ShopX",
            reason: PromptReason::NewMerchant,
            sample: None,
            occurrences: 1,
            suggestion: None,
            rejected: None,
        };
        assert_eq!(
            prompt.request_category_choice(&request, &taxonomy).unwrap(),
            Decision::Decline
        );
        assert!(prompt.confirm("Continue?").unwrap());
        assert!(!prompt.confirm_destructive("Reset the store?").unwrap());
    }

    #[test]
    fn test_interpret_answer() {
        assert_eq!(interpret_answer(" q ", &pairs()), Some(Decision::Abort));
        assert_eq!(interpret_answer("S", &pairs()), Some(Decision::Decline));
        assert_eq!(interpret_answer("", &pairs()), Some(Decision::Decline));
        assert_eq!(
            interpret_answer("1", &pairs()),
            Some(Decision::Choose(CategoryPair::new("Food", "Groceries")))
        );
        // typos ask again instead of skipping the merchant
        assert_eq!(interpret_answer("9", &pairs()), None);
        assert_eq!(interpret_answer("0", &pairs()), None);
        assert_eq!(interpret_answer("fod", &pairs()), None);
    }
}
