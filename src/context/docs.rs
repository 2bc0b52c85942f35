//! Data docs rendering.

use crate::context::EngineResult;
use crate::expectation::ExpectationSuite;
use crate::validation::SuiteValidationResult;
use serde::Serialize;
use tera::{Context, Tera};

const SUITE_TEMPLATE: &str = "suite.html";
const VALIDATION_TEMPLATE: &str = "validation.html";
const INDEX_TEMPLATE: &str = "index.html";

const SUITE_SOURCE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{ name }}</title></head>
<body>
<h1>Expectation suite {{ name }}</h1>
<p>{{ rules | length }} expectation(s)</p>
<table>
<tr><th>#</th><th>Expectation</th><th>Arguments</th><th>Notes</th></tr>
{% for rule in rules %}<tr><td>{{ loop.index }}</td><td>{{ rule.expectation_type }}</td><td><code>{{ rule.kwargs }}</code></td><td>{{ rule.meta }}</td></tr>
{% endfor %}</table>
</body>
</html>
"#;

const VALIDATION_SOURCE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{ suite }} / {{ run_name }}</title></head>
<body>
<h1>Validation of {{ suite }}</h1>
<p>Run {{ run_name }} at {{ run_time }} on {{ batch }}</p>
<p>Status: {% if success %}succeeded{% else %}failed{% endif %}
({{ successful }} of {{ evaluated }} expectations met)</p>
<table>
<tr><th>Status</th><th>Expectation</th><th>Arguments</th><th>Observed</th></tr>
{% for row in rows %}<tr><td>{% if row.success %}passed{% else %}failed{% endif %}</td><td>{{ row.expectation_type }}</td><td><code>{{ row.kwargs }}</code></td><td><code>{{ row.observed }}</code></td></tr>
{% endfor %}</table>
</body>
</html>
"#;

const INDEX_SOURCE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Data docs</title></head>
<body>
<h1>Expectation suites</h1>
<ul>
{% for page in suites %}<li><a href="{{ page }}">{{ page }}</a></li>
{% endfor %}</ul>
<h1>Validation results</h1>
<ul>
{% for page in validations %}<li><a href="{{ page }}">{{ page }}</a></li>
{% endfor %}</ul>
</body>
</html>
"#;

#[derive(Serialize)]
struct RuleRow {
    expectation_type: String,
    kwargs: String,
    meta: String,
}

#[derive(Serialize)]
struct ResultRow {
    success: bool,
    expectation_type: String,
    kwargs: String,
    observed: String,
}

pub struct DocsRenderer {
    tera: Tera,
}

impl DocsRenderer {
    pub fn new() -> EngineResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (SUITE_TEMPLATE, SUITE_SOURCE),
            (VALIDATION_TEMPLATE, VALIDATION_SOURCE),
            (INDEX_TEMPLATE, INDEX_SOURCE),
        ])?;
        Ok(Self { tera })
    }

    pub fn render_suite(&self, suite: &ExpectationSuite) -> EngineResult<String> {
        let rules: Vec<RuleRow> = suite
            .expectations
            .iter()
            .map(|rule| RuleRow {
                expectation_type: rule.expectation_type.clone(),
                kwargs: compact_json(&rule.kwargs),
                meta: if rule.meta.is_empty() {
                    String::new()
                } else {
                    compact_json(&rule.meta)
                },
            })
            .collect();

        let mut context = Context::new();
        context.insert("name", suite.name().as_str());
        context.insert("rules", &rules);
        Ok(self.tera.render(SUITE_TEMPLATE, &context)?)
    }

    pub fn render_validation(&self, result: &SuiteValidationResult) -> EngineResult<String> {
        let rows: Vec<ResultRow> = result
            .results
            .iter()
            .map(|row| ResultRow {
                success: row.success,
                expectation_type: row.expectation_config.expectation_type.clone(),
                kwargs: compact_json(&row.expectation_config.kwargs),
                observed: compact_json(&row.result),
            })
            .collect();

        let mut context = Context::new();
        context.insert("suite", result.meta.expectation_suite_name.as_str());
        context.insert("run_name", &result.meta.run_id.run_name);
        context.insert("run_time", &result.meta.run_id.run_time.to_rfc3339());
        context.insert("batch", &result.meta.batch_request.batch_id());
        context.insert("success", &result.success);
        context.insert("evaluated", &result.statistics.evaluated_expectations);
        context.insert("successful", &result.statistics.successful_expectations);
        context.insert("rows", &rows);
        Ok(self.tera.render(VALIDATION_TEMPLATE, &context)?)
    }

    /// `suites` and `validations` are page paths relative to the site root.
    pub fn render_index(&self, suites: &[String], validations: &[String]) -> EngineResult<String> {
        let mut context = Context::new();
        context.insert("suites", suites);
        context.insert("validations", validations);
        Ok(self.tera.render(INDEX_TEMPLATE, &context)?)
    }
}

fn compact_json(map: &serde_json::Map<String, serde_json::Value>) -> String {
    serde_json::to_string(map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::RuleDescriptor;
    use crate::naming::suite_name;

    #[test]
    fn suite_page_lists_rules_escaped() {
        let renderer = DocsRenderer::new().unwrap();
        let mut suite = ExpectationSuite::new(suite_name("db1", "s1"));
        suite.add_expectation(
            RuleDescriptor::new("expect_column_values_to_match_regex")
                .with_kwarg("column", "email")
                .with_kwarg("regex", "<.*>"),
        );

        let html = renderer.render_suite(&suite).unwrap();
        assert!(html.contains("db1.s1_expectation_suite"));
        assert!(html.contains("expect_column_values_to_match_regex"));
        assert!(html.contains("&lt;.*&gt;"));
        assert!(!html.contains("<.*>"));
    }

    #[test]
    fn index_lists_pages() {
        let renderer = DocsRenderer::new().unwrap();
        let html = renderer
            .render_index(
                &["expectations/db1/s1_expectation_suite.html".to_string()],
                &[],
            )
            .unwrap();
        assert!(html.contains("href=\"expectations&#x2F;db1&#x2F;s1_expectation_suite.html\""));
    }

    #[test]
    fn index_escapes_quotes_inside_href() {
        let renderer = DocsRenderer::new().unwrap();
        let page = "expectations/db1/s1\" onmouseover=\"alert(1)_expectation_suite.html".to_string();
        let html = renderer.render_index(&[page], &[]).unwrap();
        assert!(!html.contains("\" onmouseover=\""));
        assert!(html.contains("&quot; onmouseover=&quot;"));
    }
}
