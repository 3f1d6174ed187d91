//! Server-rendered pages
//!
//! `GET /` serves one of three views depending on the query string:
//! `?survey=1` the questionnaire, `?admin=1` the results dashboard,
//! anything else the landing page with the survey link.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Html,
};
use serde::Deserialize;
use std::fmt::Write as _;
use survey_common::{FieldKind, FieldSpec, SchemaVersion, SurveySchema};

use super::resolve_version;
use crate::aggregation::{FieldSummary, SummarySource, SurveySummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub survey: Option<String>,
    pub admin: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub source: SummarySource,
}

/// Which view a request selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Landing,
    Survey,
    Admin,
}

impl PageQuery {
    pub fn view(&self) -> View {
        if is_set(self.survey.as_deref()) {
            View::Survey
        } else if is_set(self.admin.as_deref()) {
            View::Admin
        } else {
            View::Landing
        }
    }
}

fn is_set(flag: Option<&str>) -> bool {
    matches!(flag.map(str::trim), Some("1") | Some("true"))
}

/// GET /
pub async fn serve_page(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Html<String>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let html = match query.view() {
        View::Landing => render_landing(&state.survey_url(), &state.admin_url()),
        View::Survey => {
            let version = resolve_version(query.version.as_deref())?;
            render_survey(version.schema())
        }
        View::Admin => {
            let version = resolve_version(query.version.as_deref())?;
            let summary = state.reader.summary(version, query.source).await;
            render_dashboard(&summary)
        }
    };
    Ok(Html(html))
}

pub fn render_landing(survey_url: &str, admin_url: &str) -> String {
    let survey_url = escape_html(survey_url);
    let body = format!(
        r#"<h1>Survey</h1>
<p>Per partecipare apri il link seguente:</p>
<p class="survey-link"><a href="{url}">{url}</a></p>
<p class="muted"><a href="{admin}">Risultati</a></p>"#,
        url = survey_url,
        admin = escape_html(admin_url),
    );
    page("Survey", &body)
}

pub fn render_survey(schema: &SurveySchema) -> String {
    let mut body = format!(
        "<h1>{}</h1>\n<form id=\"survey-form\" data-version=\"{}\" novalidate>\n",
        escape_html(schema.title),
        schema.version.id()
    );

    for section in schema.sections() {
        let _ = writeln!(body, "<section>\n<h2>{}</h2>", escape_html(section));
        for field in schema.fields.iter().filter(|f| f.section == section) {
            render_question(&mut body, field);
        }
        body.push_str("</section>\n");
    }

    body.push_str(
        "<button type=\"submit\">Invia</button>\n<p id=\"form-status\" role=\"status\"></p>\n</form>",
    );
    page(schema.title, &body)
}

fn render_question(out: &mut String, field: &FieldSpec) {
    let max = match field.kind {
        FieldKind::MultiChoice { max_selections, .. } => max_selections,
        _ => 1,
    };
    let _ = writeln!(
        out,
        "<fieldset class=\"question\" data-key=\"{}\" data-kind=\"{}\" data-max=\"{}\" data-required=\"{}\">\n<legend>{}</legend>",
        field.key,
        kind_name(&field.kind),
        max,
        field.required,
        escape_html(field.label)
    );

    match field.kind {
        FieldKind::FreeText => {
            let _ = writeln!(out, "<textarea name=\"{}\" rows=\"3\"></textarea>", field.key);
        }
        kind => {
            let input_type = if kind.is_multi() { "checkbox" } else { "radio" };
            for option in kind.options() {
                let option = escape_html(option);
                let _ = writeln!(
                    out,
                    "<label><input type=\"{}\" name=\"{}\" value=\"{}\"> {}</label>",
                    input_type, field.key, option, option
                );
            }
        }
    }

    if let FieldKind::MultiChoice { max_selections, .. } = field.kind {
        let _ = writeln!(out, "<p class=\"hint\">Massimo {} opzioni</p>", max_selections);
    }
    out.push_str("</fieldset>\n");
}

pub fn render_dashboard(summary: &SurveySummary) -> String {
    let schema = summary.schema_version.schema();
    let mut body = format!("<h1>Risultati: {}</h1>\n", escape_html(schema.title));

    body.push_str("<nav class=\"versions\">");
    for version in SchemaVersion::all() {
        let schema = version.schema();
        let _ = write!(
            body,
            "<a href=\"?admin=1&amp;version={}\"{}>{}</a> ",
            version.id(),
            if *version == summary.schema_version { " class=\"current\"" } else { "" },
            escape_html(schema.title)
        );
    }
    body.push_str("</nav>\n");

    if summary.degraded {
        body.push_str("<p class=\"warning\">Dati non disponibili al momento.</p>\n");
    }
    let _ = writeln!(
        body,
        "<p>Risposte totali: <strong>{}</strong></p>",
        summary.total_responses
    );
    if summary.skipped_records > 0 {
        let _ = writeln!(
            body,
            "<p class=\"muted\">Record non leggibili ignorati: {}</p>",
            summary.skipped_records
        );
    }

    for section in schema.sections() {
        let _ = writeln!(body, "<section>\n<h2>{}</h2>", escape_html(section));
        for field in summary.fields.iter().filter(|f| f.section == section) {
            render_field_summary(&mut body, field);
        }
        body.push_str("</section>\n");
    }

    page("Risultati", &body)
}

fn render_field_summary(out: &mut String, field: &FieldSummary) {
    let _ = writeln!(out, "<div class=\"result\">\n<h3>{}</h3>", escape_html(field.label));

    if field.frequencies.is_empty() {
        out.push_str("<p class=\"muted\">Nessuna risposta</p>\n</div>\n");
        return;
    }

    out.push_str("<table>\n<tr><th>Risposta</th><th>N.</th><th>%</th></tr>\n");
    for entry in field.frequencies.entries() {
        let share = entry.count as f64 * 100.0 / field.answered.max(1) as f64;
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{:.0}%</td></tr>",
            escape_html(&entry.value),
            entry.count,
            share
        );
    }
    out.push_str("</table>\n");

    if field.kind == FieldKind::YesNo && field.unanswered > 0 {
        let _ = writeln!(out, "<p class=\"muted\">Non risposto: {}</p>", field.unanswered);
    }
    out.push_str("</div>\n");
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::YesNo => "yes_no",
        FieldKind::SingleChoice { .. } => "single_choice",
        FieldKind::MultiChoice { .. } => "multi_choice",
        FieldKind::FreeText => "free_text",
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="it">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{}</title>
<link rel="stylesheet" href="/static/survey.css">
</head>
<body>
<main class="container">
{}
</main>
<script src="/static/survey.js"></script>
</body>
</html>
"#,
        escape_html(title),
        body
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::summarize;

    fn query(survey: Option<&str>, admin: Option<&str>) -> PageQuery {
        PageQuery {
            survey: survey.map(str::to_string),
            admin: admin.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_view_selection() {
        assert_eq!(query(None, None).view(), View::Landing);
        assert_eq!(query(Some("1"), None).view(), View::Survey);
        assert_eq!(query(None, Some("1")).view(), View::Admin);
        assert_eq!(query(Some("0"), None).view(), View::Landing);
        // Survey wins when both are set
        assert_eq!(query(Some("1"), Some("1")).view(), View::Survey);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("Sì"), "Sì");
    }

    #[test]
    fn test_survey_form_lists_every_option() {
        let schema = SchemaVersion::BoardMemberV1.schema();
        let html = render_survey(schema);

        assert!(html.contains("data-version=\"board_member_v1\""));
        for field in schema.fields {
            assert!(html.contains(&format!("data-key=\"{}\"", field.key)));
            for option in field.kind.options() {
                assert!(html.contains(&format!("value=\"{}\"", escape_html(option))));
            }
        }
        assert!(html.contains("type=\"checkbox\" name=\"impacts\""));
        assert!(html.contains("data-max=\"3\""));
    }

    #[test]
    fn test_dashboard_marks_degraded_and_empty() {
        let version = SchemaVersion::LATEST;
        let mut summary = summarize(version, SummarySource::Relational, version.schema().fields, &[]);
        summary.degraded = true;

        let html = render_dashboard(&summary);
        assert!(html.contains("Dati non disponibili"));
        assert!(html.contains("Nessuna risposta"));
        assert!(html.contains("Risposte totali: <strong>0</strong>"));
    }

    #[test]
    fn test_landing_shows_survey_link() {
        let html = render_landing("https://survey.example.org?survey=1", "https://survey.example.org?admin=1");
        assert!(html.contains("href=\"https://survey.example.org?survey=1\""));
    }
}
