//! `modify`: build an update body and report what changed.

use bugzilla_rest::{BugChange, FieldSelection};
use serde_json::{Map, Value};

use super::query::{parse_field_options, split_list};
use crate::cli::output::display_value;
use crate::cli::ModifyArgs;
use crate::error::{MiError, Result};
use crate::mi::{FrameKind, FrameSink};
use crate::tracker::Tracker;

/// Values of a `+add -remove =set` option.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriSet {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub set: Option<Vec<String>>,
}

impl TriSet {
    /// Plain values are additions. `=` is only honoured when `allow_set`.
    pub fn parse(values: &[String], allow_set: bool) -> Self {
        let mut triset = TriSet::default();
        for value in split_list(values.iter()) {
            if let Some(v) = value.strip_prefix('-') {
                triset.remove.push(v.to_string());
            } else if let Some(v) = value.strip_prefix('+') {
                triset.add.push(v.to_string());
            } else if let Some(v) = value.strip_prefix('=').filter(|_| allow_set) {
                triset.set.get_or_insert_with(Vec::new).push(v.to_string());
            } else {
                triset.add.push(value);
            }
        }
        triset
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.set.is_none()
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(set) = &self.set {
            map.insert("set".to_string(), Value::from(set.clone()));
        }
        if !self.add.is_empty() {
            map.insert("add".to_string(), Value::from(self.add.clone()));
        }
        if !self.remove.is_empty() {
            map.insert("remove".to_string(), Value::from(self.remove.clone()));
        }
        Value::Object(map)
    }
}

/// Whiteboard edits: `=text` sets, `+text` appends, `-text` removes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct WhiteboardEdit {
    set: Option<String>,
    append: Vec<String>,
    remove: Vec<String>,
}

impl WhiteboardEdit {
    fn parse(values: &[String]) -> Self {
        let mut edit = WhiteboardEdit::default();
        for value in values {
            if let Some(v) = value.strip_prefix('+') {
                edit.append.push(v.to_string());
            } else if let Some(v) = value.strip_prefix('-') {
                edit.remove.push(v.to_string());
            } else {
                let v = value.strip_prefix('=').unwrap_or(value);
                edit.set = Some(v.to_string());
            }
        }
        edit
    }

    fn is_empty(&self) -> bool {
        self.set.is_none() && self.append.is_empty() && self.remove.is_empty()
    }

    /// Whether the result depends on each bug's current value.
    fn is_relative(&self) -> bool {
        !self.append.is_empty() || !self.remove.is_empty()
    }

    fn apply(&self, current: &str) -> String {
        let mut text = self.set.clone().unwrap_or_else(|| current.to_string());
        for tag in &self.remove {
            text = text.replace(tag.as_str(), "");
        }
        for tag in &self.append {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(tag);
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// The update body shared by every bug in the request.
pub fn build_changes(args: &ModifyArgs) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    let mut put = |name: &str, value: Value| {
        body.insert(name.to_string(), value);
    };

    if let Some(dupe) = &args.dupeid {
        put("dupe_of", Value::from(dupe.clone()));
        put("status", Value::from("CLOSED"));
        put("resolution", Value::from("DUPLICATE"));
    } else if let Some(resolution) = &args.close {
        put("status", Value::from("CLOSED"));
        put("resolution", Value::from(resolution.clone()));
    } else if let Some(status) = &args.status {
        put("status", Value::from(status.clone()));
    }

    if let Some(comment) = &args.comment {
        put(
            "comment",
            serde_json::json!({"body": comment, "is_private": args.private}),
        );
    }

    let scalars = [
        ("assigned_to", &args.assigned_to),
        ("qa_contact", &args.qa_contact),
        ("summary", &args.summary),
        ("product", &args.product),
        ("component", &args.component),
        ("version", &args.version),
        ("op_sys", &args.os),
        ("platform", &args.arch),
        ("url", &args.url),
        ("priority", &args.priority),
        ("severity", &args.severity),
        ("target_release", &args.target_release),
        ("target_milestone", &args.target_milestone),
        ("cf_fixed_in", &args.fixed_in),
    ];
    for (name, value) in scalars {
        if let Some(value) = value {
            put(name, Value::from(value.clone()));
        }
    }
    if args.reset_assignee {
        put("reset_assigned_to", Value::Bool(true));
    }
    if args.reset_qa_contact {
        put("reset_qa_contact", Value::Bool(true));
    }

    let lists = [
        ("keywords", &args.keywords, true),
        ("cc", &args.cc, false),
        ("blocks", &args.blocked, true),
        ("depends_on", &args.dependson, true),
        ("groups", &args.groups, false),
    ];
    for (name, values, allow_set) in lists {
        let triset = TriSet::parse(values, allow_set);
        if !triset.is_empty() {
            put(name, triset.to_value());
        }
    }

    if !args.flag.is_empty() {
        let mut flags = Vec::new();
        for flag in &args.flag {
            let Some(status) = flag.chars().last().filter(|c| "+-?X".contains(*c)) else {
                return Err(MiError::Usage(format!(
                    "Invalid flag '{}': expected NAME followed by +, -, ? or X",
                    flag
                )));
            };
            let name = &flag[..flag.len() - status.len_utf8()];
            flags.push(serde_json::json!({"name": name, "status": status.to_string()}));
        }
        put("flags", Value::from(flags));
    }

    if args.minor_update {
        put("minor_update", Value::Bool(true));
    }
    for (name, value) in parse_field_options(&args.field)? {
        put(name.as_str(), Value::from(value));
    }
    Ok(body)
}

/// One line per changed field, like `status      : removed=NEW added=ASSIGNED`.
fn summarize(changes: &[BugChange]) -> String {
    let mut out = String::new();
    for change in changes {
        if change.changes.is_empty() {
            out.push_str(&format!("No changes made to bug {}\n", change.id));
            continue;
        }
        out.push_str(&format!(
            "Modified the following fields on bug {}\n",
            change.id
        ));
        let mut names: Vec<&String> = change.changes.keys().collect();
        names.sort();
        for name in names {
            let entry = &change.changes[name];
            let side = |key: &str| entry.get(key).map(display_value).unwrap_or_default();
            out.push_str(&format!(
                "{:<12}: removed={} added={}\n",
                name,
                side("removed"),
                side("added")
            ));
        }
    }
    out
}

pub async fn run(tracker: &dyn Tracker, args: &ModifyArgs, output: &mut dyn FrameSink) -> Result<()> {
    let changes = build_changes(args)?;
    let whiteboard = WhiteboardEdit::parse(&args.whiteboard);
    if changes.is_empty() && whiteboard.is_empty() {
        return Err(MiError::Usage(
            "'modify' command requires additional arguments".to_string(),
        ));
    }

    let mut results = Vec::new();
    if whiteboard.is_relative() {
        let selection = FieldSelection {
            include: vec!["id".to_string(), "whiteboard".to_string()],
            ..Default::default()
        };
        let current = tracker.get_bugs(&args.ids, &selection).await?;
        for bug in current {
            let before = bug
                .field("whiteboard")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let mut per_bug = changes.clone();
            per_bug.insert("whiteboard".to_string(), Value::from(whiteboard.apply(&before)));
            results.extend(tracker.update_bugs(&[bug.id.to_string()], &per_bug).await?);
        }
    } else {
        let mut changes = changes;
        if let Some(text) = &whiteboard.set {
            changes.insert("whiteboard".to_string(), Value::from(text.clone()));
        }
        tracing::debug!("Updating bugs {:?}", args.ids);
        results = tracker.update_bugs(&args.ids, &changes).await?;
    }

    output.emit(FrameKind::String, &summarize(&results)).await?;
    Ok(())
}
