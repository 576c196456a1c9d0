use serde::Serialize;
use tera::{Context, Tera};
use tracing::warn;

use crate::domain::context::{ContextSnapshot, CropState, FarmProfile, SoilState, WeatherWindow};
use crate::evaluators::DomainOutput;
use crate::rules::Rule;

#[derive(Serialize)]
struct TemplateView<'a> {
    farm: &'a FarmProfile,
    weather: &'a WeatherWindow,
    soil: &'a SoilState,
    crop: &'a CropState,
    output: Option<&'a DomainOutput>,
}

/// Renders a rule's guidance text against the turn's snapshot and, when available,
/// the evaluator output for the rule's category.
///
/// A template that fails to render degrades to the humanized action key so a
/// malformed rule never aborts a turn.
pub fn render_guidance(rule: &Rule, snapshot: &ContextSnapshot, output: Option<&DomainOutput>) -> String {
    let view = TemplateView {
        farm: &snapshot.farm,
        weather: &snapshot.weather,
        soil: &snapshot.soil,
        crop: &snapshot.crop,
        output,
    };

    let rendered = Context::from_serialize(&view)
        .and_then(|context| Tera::one_off(&rule.template, &context, false));

    match rendered {
        Ok(text) => text.trim().to_string(),
        Err(error) => {
            warn!(
                event_name = "rules.template_render_failed",
                rule_id = %rule.id,
                error = %error,
                "rule template failed to render; using action fallback"
            );
            format!("{} (rule {}).", humanize(&rule.directive.action), rule.id)
        }
    }
}

fn humanize(action: &str) -> String {
    let spaced = action.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::render_guidance;
    use crate::domain::context::fixtures::snapshot;
    use crate::evaluators::{evaluator_for, SpecialistEvaluator};
    use crate::domain::intent::Category;
    use crate::rules::RuleSet;

    #[test]
    fn renders_snapshot_and_output_fields() {
        let rules = RuleSet::builtin().expect("builtin rules");
        let rule = rules.get("IRR-001").expect("IRR-001");
        let snapshot = snapshot("cotton", "sandy");
        let output = evaluator_for(Category::Irrigation)
            .expect("irrigation evaluator")
            .evaluate(&snapshot)
            .expect("sandy soil is known");

        let text = render_guidance(rule, &snapshot, Some(&output));
        assert!(text.contains("sandy"));
        assert!(text.contains("50000"));
        assert!(text.to_lowercase().contains("irrigate"));
    }

    #[test]
    fn missing_output_skips_optional_sections() {
        let rules = RuleSet::builtin().expect("builtin rules");
        let rule = rules.get("IRR-001").expect("IRR-001");
        let text = render_guidance(rule, &snapshot("cotton", "sandy"), None);
        assert!(!text.contains("L/ha"));
        assert!(text.contains("Irrigate"));
    }

    #[test]
    fn broken_template_falls_back_to_action() {
        let rules = RuleSet::builtin().expect("builtin rules");
        let mut rule = (**rules.get("IRR-001").expect("IRR-001")).clone();
        rule.template = "{{ farm.no_such_field }".to_string();
        let text = render_guidance(&rule, &snapshot("cotton", "sandy"), None);
        assert_eq!(text, "Irrigate (rule IRR-001).");
    }
}
