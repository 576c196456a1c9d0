use serde::Serialize;
use tarla_core::config::{AppConfig, LoadOptions};
use tarla_core::domain::intent::Category;
use tarla_core::domain::recommendation::Priority;
use tarla_core::rules::{Condition, RuleSet};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct RuleSummary<'a> {
    id: &'a str,
    category: Category,
    priority: Priority,
    base_confidence: f64,
    action: &'a str,
    conditions: &'a [Condition],
}

#[derive(Debug, Serialize)]
struct RuleListing<'a> {
    version: &'a str,
    rules: Vec<RuleSummary<'a>>,
}

pub fn run(category: Option<&str>, options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "rules",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let category = match category.map(str::parse::<Category>).transpose() {
        Ok(category) => category,
        Err(error) => return CommandResult::failure("rules", "invalid_argument", error.to_string(), 2),
    };

    let rules = match RuleSet::load_or_builtin(config.rules.path.as_deref()) {
        Ok(rules) => rules,
        Err(error) => return CommandResult::failure("rules", "rule_table", error.to_string(), 3),
    };

    let listing = RuleListing {
        version: rules.version(),
        rules: rules
            .rules()
            .iter()
            .filter(|rule| category.map_or(true, |category| rule.category == category))
            .map(|rule| RuleSummary {
                id: &rule.id,
                category: rule.category,
                priority: rule.priority,
                base_confidence: rule.base_confidence,
                action: &rule.directive.action,
                conditions: &rule.conditions,
            })
            .collect(),
    };

    let source = config
        .rules
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "builtin".to_string());
    let message = format!("{} rule(s) from {source}", listing.rules.len());
    match serde_json::to_value(&listing) {
        Ok(data) => CommandResult::success_with("rules", message, Some(data)),
        Err(error) => CommandResult::failure("rules", "serialization", error.to_string(), 5),
    }
}
