use serde::Serialize;

use crate::workflow::{Case, WorkflowTemplate};

/// Which hint made a template match a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchRule {
    /// Company pattern found in the case organization.
    Company,
    /// Job-type pattern found in the case category.
    JobType,
    /// A tag found in the case title.
    Tag,
}

/// A matching template together with the first rule that fired for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMatch {
    pub template: WorkflowTemplate,
    pub rule: MatchRule,
}

/// Ranks stored templates for a case. Pure; never mutates templates.
pub struct TemplateMatcher;

impl TemplateMatcher {
    /// Evaluate the match rules in precedence order and return the first
    /// that fires. Any single rule is enough; hits are not cumulative.
    pub fn matches(template: &WorkflowTemplate, case: &Case) -> Option<MatchRule> {
        if contains_ci(&case.organization, &template.company_pattern) {
            return Some(MatchRule::Company);
        }
        if contains_ci(&case.category, &template.job_type_pattern) {
            return Some(MatchRule::JobType);
        }
        if template.tags.iter().any(|tag| contains_ci(&case.title, tag)) {
            return Some(MatchRule::Tag);
        }
        None
    }

    /// Matching templates sorted by success rate, best first. Ties keep the
    /// order in which `templates` yields them. An empty result means no
    /// known template fits.
    pub fn rank<'a>(
        templates: impl IntoIterator<Item = &'a WorkflowTemplate>,
        case: &Case,
    ) -> Vec<TemplateMatch> {
        let mut matched: Vec<TemplateMatch> = templates
            .into_iter()
            .filter_map(|template| {
                Self::matches(template, case).map(|rule| TemplateMatch {
                    template: template.clone(),
                    rule,
                })
            })
            .collect();

        // sort_by is stable
        matched.sort_by(|a, b| b.template.success_rate.total_cmp(&a.template.success_rate));
        matched
    }
}

// An empty pattern never matches.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(name: &str, rate: f64) -> WorkflowTemplate {
        let mut t = WorkflowTemplate::new(name, "", Vec::new(), Utc::now());
        t.success_rate = rate;
        t
    }

    #[test]
    fn higher_success_rate_ranks_first() {
        let mut t1 = template("acme", 0.3);
        t1.company_pattern = "Acme".into();
        let mut t2 = template("senior", 0.8);
        t2.tags = vec!["senior".into()];

        let case = Case::new("Senior Engineer", "Acme Corp");
        let ranked = TemplateMatcher::rank([&t1, &t2], &case);

        let ids: Vec<_> = ranked.iter().map(|m| m.template.id.as_str()).collect();
        assert_eq!(ids, vec![t2.id.as_str(), t1.id.as_str()]);
        assert_eq!(ranked[0].rule, MatchRule::Tag);
        assert_eq!(ranked[1].rule, MatchRule::Company);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut t = template("startup", 0.0);
        t.company_pattern = "STARTUP dynamics".into();
        let case = Case::new("Dev", "Startup Dynamics Ltd");
        assert_eq!(TemplateMatcher::matches(&t, &case), Some(MatchRule::Company));
    }

    #[test]
    fn job_type_rule_uses_category() {
        let mut t = template("contract", 0.0);
        t.job_type_pattern = "contract".into();
        let case = Case::new("Dev", "Nobody").with_category("Contract, 6 months");
        assert_eq!(TemplateMatcher::matches(&t, &case), Some(MatchRule::JobType));
    }

    #[test]
    fn company_rule_takes_precedence() {
        let mut t = template("both", 0.0);
        t.company_pattern = "acme".into();
        t.tags = vec!["engineer".into()];
        let case = Case::new("Engineer", "Acme");
        assert_eq!(TemplateMatcher::matches(&t, &case), Some(MatchRule::Company));
    }

    #[test]
    fn empty_patterns_never_match() {
        let t = template("blank", 1.0);
        let case = Case::new("Anything", "Anyone").with_category("Full-time");
        assert!(TemplateMatcher::matches(&t, &case).is_none());
        assert!(TemplateMatcher::rank([&t], &case).is_empty());
    }

    #[test]
    fn ties_keep_encounter_order() {
        let mut a = template("a", 0.5);
        a.tags = vec!["rust".into()];
        let mut b = template("b", 0.5);
        b.tags = vec!["rust".into()];
        let mut c = template("c", 0.5);
        c.tags = vec!["rust".into()];

        let case = Case::new("Rust Developer", "Ferris Co");
        let names: Vec<_> = TemplateMatcher::rank([&b, &c, &a], &case)
            .into_iter()
            .map(|m| m.template.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }
}
