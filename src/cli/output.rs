//! Bug list rendering.
//!
//! Shared by `query` and `new` in both modes. Structured modes (`raw`,
//! `json`) fetch the bugs again with the requested field selection and go out
//! as one `STRING` payload; templated modes go out as one `FORMAT` payload,
//! one line per bug.

use bugzilla_rest::{canonical_field, Bug, FieldSelection};
use serde_json::{Map, Value};

use super::args::{OutputArgs, OutputMode};
use crate::error::{MiError, Result};
use crate::mi::{FrameKind, FrameSink};
use crate::tracker::Tracker;

const NORMAL_TEMPLATE: &str = "#%{bug_id} %{status} %{assigned_to} - %{summary}";

/// Separator printed after each bug in raw mode.
const RAW_SEPARATOR: &str = "\n*-*-*-*-*\n";

/// The template a named output mode stands for.
pub fn named_template(mode: OutputMode) -> Option<String> {
    let template = match mode {
        OutputMode::Normal => NORMAL_TEMPLATE.to_string(),
        OutputMode::Ids => "%{bug_id}".to_string(),
        OutputMode::Full => format!(
            "{}\nComponent: %{{component}}\nCC: %{{cc}}\nBlocked: %{{blocks}}\n\
             Depends: %{{depends_on}}\n%{{comments}}\n",
            NORMAL_TEMPLATE
        ),
        OutputMode::Extra => format!(
            "{}\n +Keywords: %{{keywords}}\n +QA Whiteboard: %{{qa_whiteboard}}\n \
             +Status Whiteboard: %{{status_whiteboard}}\n \
             +Devel Whiteboard: %{{devel_whiteboard}}\n",
            NORMAL_TEMPLATE
        ),
        OutputMode::Oneline => {
            "#%{bug_id} %{status} %{assigned_to} %{component}\t[%{target_milestone}] %{flags} %{cve}"
                .to_string()
        }
        OutputMode::Suppress | OutputMode::Raw | OutputMode::Json => return None,
    };
    Some(template)
}

/// The template in effect for `args`, if the output is templated.
pub fn template_for(args: &OutputArgs) -> Option<String> {
    match &args.outputformat {
        Some(template) => Some(template.clone()),
        None => named_template(args.mode()),
    }
}

/// A `%{name}` or `%{name:arg}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder<'a> {
    name: &'a str,
    arg: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part<'a> {
    Literal(&'a str),
    Field(Placeholder<'a>),
}

/// Split a template into literal text and placeholders.
fn scan(template: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        if start > 0 {
            parts.push(Part::Literal(&rest[..start]));
        }
        let inner = &rest[start + 2..start + 2 + len];
        let (name, arg) = match inner.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (inner, None),
        };
        parts.push(Part::Field(Placeholder { name, arg }));
        rest = &rest[start + 3 + len..];
    }
    if !rest.is_empty() {
        parts.push(Part::Literal(rest));
    }
    parts
}

/// REST fields a template needs the server to return.
pub fn template_fields(template: &str) -> Vec<String> {
    let mut fields = vec!["id".to_string()];
    for part in scan(template) {
        let Part::Field(placeholder) = part else {
            continue;
        };
        let name = match (placeholder.name, placeholder.arg) {
            ("whiteboard", Some(kind)) => format!("{}_whiteboard", kind),
            ("flag", _) => "flags".to_string(),
            ("cve", _) => "alias".to_string(),
            (name, _) => canonical_field(name).to_string(),
        };
        if !fields.contains(&name) {
            fields.push(name);
        }
    }
    fields
}

/// Render one bug through a template.
pub fn render_template(template: &str, bug: &Bug) -> String {
    scan(template)
        .into_iter()
        .map(|part| match part {
            Part::Literal(literal) => literal.to_string(),
            Part::Field(placeholder) => render_field(bug, &placeholder),
        })
        .collect()
}

fn render_field(bug: &Bug, placeholder: &Placeholder<'_>) -> String {
    match (placeholder.name, placeholder.arg) {
        ("flag", Some(name)) | ("flags", Some(name)) => flags(bug)
            .into_iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, status)| status)
            .unwrap_or_default(),
        ("flags", None) => flags(bug)
            .into_iter()
            .map(|(name, status)| format!("{}{}", name, status))
            .collect::<Vec<_>>()
            .join(","),
        ("whiteboard", Some(kind)) => bug
            .field(&format!("{}_whiteboard", kind))
            .map(|v| display_value(&v))
            .unwrap_or_default(),
        ("cve", _) => aliases(bug)
            .into_iter()
            .filter(|alias| alias.starts_with("CVE-"))
            .collect::<Vec<_>>()
            .join(" "),
        ("comments", _) => comments(bug),
        (name, _) => bug.field(name).map(|v| display_value(&v)).unwrap_or_default(),
    }
}

fn flags(bug: &Bug) -> Vec<(String, String)> {
    let Some(Value::Array(flags)) = bug.field("flags") else {
        return Vec::new();
    };
    flags
        .iter()
        .filter_map(|flag| {
            let name = flag.get("name")?.as_str()?;
            let status = flag.get("status")?.as_str()?;
            Some((name.to_string(), status.to_string()))
        })
        .collect()
}

fn aliases(bug: &Bug) -> Vec<String> {
    match bug.field("alias") {
        Some(Value::Array(items)) => items.iter().map(display_value).collect(),
        Some(Value::String(alias)) if !alias.is_empty() => vec![alias],
        _ => Vec::new(),
    }
}

fn comments(bug: &Bug) -> String {
    let Some(Value::Array(comments)) = bug.field("comments") else {
        return String::new();
    };
    comments
        .iter()
        .map(|comment| {
            let field = |name: &str| comment.get(name).map(display_value).unwrap_or_default();
            format!(
                "\n* {} - {}:\n{}\n",
                field("creation_time"),
                field("creator"),
                field("text")
            )
        })
        .collect()
}

/// Text form of a field value: lists comma-joined, null as `None`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Rebuild objects with their keys inserted in sorted order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// `{"bugs": [...]}`, keys sorted, pretty-printed.
pub fn render_json(bugs: &[Bug]) -> Result<String> {
    let document = serde_json::json!({
        "bugs": bugs.iter().map(|b| sorted(&b.raw())).collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&document)
        .map_err(|e| MiError::Internal(format!("cannot serialize bugs: {}", e)))
}

/// Every attribute of every bug, one per line.
pub fn render_raw(bugs: &[Bug]) -> String {
    let mut out = String::new();
    for bug in bugs {
        out.push_str(&format!("Bugzilla {}: \n", bug.id));
        if let Value::Object(fields) = bug.raw() {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort();
            for name in names {
                out.push_str(&format!(
                    "ATTRIBUTE[{}]: {}\n",
                    name,
                    display_value(&fields[name])
                ));
            }
        }
        out.push_str(RAW_SEPARATOR);
    }
    out
}

/// Emit a bug list the way `args` ask for.
pub async fn emit_buglist(
    tracker: &dyn Tracker,
    args: &OutputArgs,
    bugs: Vec<Bug>,
    output: &mut dyn FrameSink,
) -> Result<()> {
    let mode = args.mode();
    if mode == OutputMode::Suppress && args.outputformat.is_none() {
        tracing::debug!("Output suppressed for {} bugs", bugs.len());
        return Ok(());
    }

    if args.outputformat.is_none() && matches!(mode, OutputMode::Raw | OutputMode::Json) {
        let ids: Vec<String> = bugs.iter().map(|b| b.id.to_string()).collect();
        let selection = FieldSelection {
            include: args.includefield.clone(),
            exclude: args.excludefield.clone(),
            extra: args.extrafield.clone(),
        };
        let full = if ids.is_empty() {
            Vec::new()
        } else {
            tracker.get_bugs(&ids, &selection).await?
        };
        let payload = if mode == OutputMode::Json {
            render_json(&full)?
        } else {
            render_raw(&full)
        };
        output.emit(FrameKind::String, &payload).await?;
        return Ok(());
    }

    let Some(template) = template_for(args) else {
        return Ok(());
    };
    let payload: String = bugs
        .iter()
        .map(|bug| format!("{}\n", render_template(&template, bug)))
        .collect();
    output.emit(FrameKind::Format, &payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::frame::{decode_all, FrameWriter};
    use crate::tracker::mock::{bug, CountingFactory, MockServer};
    use crate::tracker::ClientFactory;

    fn rich_bug() -> Bug {
        let mut b = bug(7, "crash on start");
        b.fields.insert(
            "flags".into(),
            serde_json::json!([
                {"name": "needinfo", "status": "?"},
                {"name": "review", "status": "+"}
            ]),
        );
        b.fields
            .insert("alias".into(), serde_json::json!(["CVE-2024-1", "other"]));
        b.fields.insert("blocks".into(), serde_json::json!([1, 2]));
        b.fields.insert("target_milestone".into(), Value::Null);
        b
    }

    #[test]
    fn test_normal_template() {
        let template = named_template(OutputMode::Normal).unwrap();
        assert_eq!(
            render_template(&template, &rich_bug()),
            "#7 NEW dev@example.com - crash on start"
        );
    }

    #[test]
    fn test_oneline_template() {
        let template = named_template(OutputMode::Oneline).unwrap();
        assert_eq!(
            render_template(&template, &rich_bug()),
            "#7 NEW dev@example.com kernel\t[None] needinfo?,review+ CVE-2024-1"
        );
    }

    #[test]
    fn test_template_args_and_literals() {
        let b = rich_bug();
        assert_eq!(render_template("%{flag:review}", &b), "+");
        assert_eq!(render_template("blocks=%{blocked};", &b), "blocks=1,2;");
        assert_eq!(render_template("%{missing}|%{unclosed", &b), "|%{unclosed");
    }

    #[test]
    fn test_template_fields() {
        assert_eq!(
            template_fields("%{bug_id} %{short_desc} %{flag:x} %{whiteboard:qa}"),
            vec!["id", "summary", "flags", "qa_whiteboard"]
        );
    }

    #[test]
    fn test_raw_rendering() {
        let out = render_raw(&[bug(3, "s")]);
        assert!(out.starts_with("Bugzilla 3: \nATTRIBUTE[assigned_to]: dev@example.com\n"));
        assert!(out.contains("ATTRIBUTE[id]: 3\n"));
        assert!(out.ends_with("\n*-*-*-*-*\n"));
    }

    #[test]
    fn test_json_rendering_has_sorted_keys() {
        let out = render_json(&[rich_bug()]).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["bugs"].as_array().unwrap().len(), 1);
        assert!(out.find("\"alias\"").unwrap() < out.find("\"summary\"").unwrap());
    }

    async fn emitted(args: OutputArgs, bugs: Vec<Bug>) -> Vec<crate::mi::frame::Frame> {
        let factory = CountingFactory::new(MockServer {
            bugs: bugs.clone(),
            ..Default::default()
        });
        let config = crate::mi::ClientConfiguration {
            url: "https://b".into(),
            cookie_cache: None,
            token_cache: None,
            verify_tls: true,
            use_stored_credentials: false,
            client_certificate: None,
        };
        let tracker = match factory.connect(&config).await {
            Ok(t) => t,
            Err(e) => panic!("{}", e),
        };
        let mut out = FrameWriter::new(Vec::new());
        emit_buglist(tracker.as_ref(), &args, bugs, &mut out)
            .await
            .unwrap();
        decode_all(&out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_emit_template_is_one_format_frame() {
        let frames = emitted(
            OutputArgs {
                ids: true,
                ..Default::default()
            },
            vec![bug(1, "a"), bug(2, "b")],
        )
        .await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Format);
        assert_eq!(frames[0].payload, "1\n2\n");
    }

    #[tokio::test]
    async fn test_emit_suppress_is_silent() {
        let frames = emitted(
            OutputArgs {
                output: Some(OutputMode::Suppress),
                ..Default::default()
            },
            vec![bug(1, "a")],
        )
        .await;
        assert!(frames.is_empty());
    }
}
