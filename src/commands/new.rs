//! `new`: file a bug and fetch it back.

use bugzilla_rest::{Bug, FieldSelection};
use serde_json::{Map, Value};

use super::query::{parse_field_options, split_list};
use crate::cli::NewArgs;
use crate::error::Result;
use crate::tracker::Tracker;

/// Request body for `POST /rest/bug`.
pub fn build_body(args: &NewArgs) -> Result<Map<String, Value>> {
    let fields = &args.fields;
    let mut body = Map::new();

    let scalars = [
        ("product", &fields.product),
        ("component", &fields.component),
        ("version", &fields.version),
        ("summary", &fields.summary),
        ("description", &fields.comment),
        ("op_sys", &fields.os),
        ("platform", &fields.arch),
        ("severity", &fields.severity),
        ("priority", &fields.priority),
        ("url", &fields.url),
        ("assigned_to", &fields.assigned_to),
        ("qa_contact", &fields.qa_contact),
    ];
    for (name, value) in scalars {
        if let Some(value) = value {
            body.insert(name.to_string(), Value::from(value.clone()));
        }
    }

    let lists = [
        ("cc", &fields.cc),
        ("blocks", &fields.blocked),
        ("depends_on", &fields.dependson),
        ("groups", &fields.groups),
        ("keywords", &fields.keywords),
    ];
    for (name, values) in lists {
        let values = split_list(values.iter());
        if !values.is_empty() {
            body.insert(name.to_string(), Value::from(values));
        }
    }

    if args.private {
        body.insert("comment_is_private".to_string(), Value::Bool(true));
    }
    for (name, value) in parse_field_options(&fields.field)? {
        body.insert(name, Value::from(value));
    }
    Ok(body)
}

pub async fn run(tracker: &dyn Tracker, args: &NewArgs) -> Result<Vec<Bug>> {
    let body = build_body(args)?;
    let id = tracker.create_bug(&body).await?;
    tracing::info!("Created bug {}", id);
    let bugs = tracker
        .get_bugs(&[id.to_string()], &FieldSelection::default())
        .await?;
    Ok(bugs)
}
