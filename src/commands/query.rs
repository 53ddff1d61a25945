//! `query`: translate search options into REST search parameters.

use bugzilla_rest::Bug;

use crate::cli::output::{template_for, template_fields};
use crate::cli::QueryArgs;
use crate::error::{MiError, Result};
use crate::tracker::Tracker;

/// Statuses the `--status` shorthands stand for.
fn status_alias(status: &str) -> Option<&'static [&'static str]> {
    let statuses: &'static [&'static str] = match status {
        "OPEN" => &[
            "NEW",
            "ASSIGNED",
            "MODIFIED",
            "ON_DEV",
            "ON_QA",
            "VERIFIED",
            "FAILS_QA",
            "RELEASE_PENDING",
            "POST",
        ],
        "DEV" => &[
            "NEW", "ASSIGNED", "NEEDINFO", "ON_DEV", "MODIFIED", "POST", "REOPENED",
        ],
        "QE" => &["ASSIGNED", "ON_QA", "FAILS_QA"],
        "EOL" => &["VERIFIED", "RELEASE_PENDING", "CLOSED"],
        _ => return None,
    };
    Some(statuses)
}

/// Split comma separated option values into single values.
pub(crate) fn split_list<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `--field NAME=VALUE` options.
pub(crate) fn parse_field_options(fields: &[String]) -> Result<Vec<(String, String)>> {
    fields
        .iter()
        .map(|field| match field.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
            _ => Err(MiError::Usage(format!(
                "Invalid field argument provided: {}",
                field
            ))),
        })
        .collect()
}

/// Query string pairs of a bugzilla search URL.
fn url_to_query(raw: &str) -> Result<Vec<(String, String)>> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| MiError::Usage(format!("Invalid --from-url '{}': {}", raw, e)))?;
    Ok(parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

/// Build the search parameters for `args`. Output options do not count as
/// search terms.
pub fn build_query(args: &QueryArgs) -> Result<Vec<(String, String)>> {
    fn push_list(params: &mut Vec<(String, String)>, name: &str, values: Vec<String>) {
        params.extend(values.into_iter().map(|value| (name.to_string(), value)));
    }

    let mut params: Vec<(String, String)> = Vec::new();

    if let Some(url) = &args.from_url {
        params.extend(url_to_query(url)?);
    }

    let fields = &args.fields;
    push_list(&mut params, "id", split_list(args.bug_id.iter()));
    push_list(&mut params, "product", split_list(fields.product.iter()));
    push_list(&mut params, "component", split_list(fields.component.iter()));
    push_list(&mut params, "version", split_list(fields.version.iter()));
    push_list(&mut params, "op_sys", split_list(fields.os.iter()));
    push_list(&mut params, "platform", split_list(fields.arch.iter()));
    push_list(&mut params, "severity", split_list(fields.severity.iter()));
    push_list(&mut params, "priority", split_list(fields.priority.iter()));
    push_list(&mut params, "cc", split_list(fields.cc.iter()));
    push_list(&mut params, "blocks", split_list(fields.blocked.iter()));
    push_list(&mut params, "depends_on", split_list(fields.dependson.iter()));
    push_list(&mut params, "groups", split_list(fields.groups.iter()));

    if let Some(status) = &args.status {
        match status.as_str() {
            "ALL" => {}
            alias => match status_alias(alias) {
                Some(statuses) => push_list(
                    &mut params,
                    "status",
                    statuses.iter().map(|s| s.to_string()).collect(),
                ),
                None => push_list(&mut params, "status", split_list([status])),
            },
        }
    }

    let keywords = split_list(fields.keywords.iter());
    if !keywords.is_empty() {
        params.push(("keywords".to_string(), keywords.join(",")));
        params.push(("keywords_type".to_string(), "allwords".to_string()));
    }

    let scalars = [
        ("reporter", &args.reporter),
        ("assigned_to", &fields.assigned_to),
        ("qa_contact", &fields.qa_contact),
        ("summary", &fields.summary),
        ("whiteboard", &args.whiteboard),
        ("url", &fields.url),
        ("quicksearch", &args.quicksearch),
        ("savedsearch", &args.savedsearch),
    ];
    for (name, value) in scalars {
        if let Some(value) = value {
            params.push((name.to_string(), value.clone()));
        }
    }
    if let Some(comment) = &fields.comment {
        params.push(("longdesc".to_string(), comment.clone()));
        params.push(("longdesc_type".to_string(), "allwordssubstr".to_string()));
    }

    params.extend(parse_field_options(&fields.field)?);

    if params.is_empty() {
        return Err(MiError::Usage(
            "'query' command requires additional arguments".to_string(),
        ));
    }

    if let Some(template) = template_for(&args.output) {
        params.push((
            "include_fields".to_string(),
            template_fields(&template).join(","),
        ));
    }
    Ok(params)
}

pub async fn run(tracker: &dyn Tracker, args: &QueryArgs) -> Result<Vec<Bug>> {
    let params = build_query(args)?;
    tracing::debug!("Search parameters: {:?}", params);
    let bugs = tracker.search(&params).await?;
    tracing::info!("Query returned {} bugs", bugs.len());
    Ok(bugs)
}
