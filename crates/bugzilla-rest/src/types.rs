//! Request and response types for the Bugzilla REST API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{BugzillaError, Result};

/// Field names accepted in place of their REST spelling.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("bug_id", "id"),
    ("bug_status", "status"),
    ("short_desc", "summary"),
    ("blocked", "blocks"),
    ("dependson", "depends_on"),
    ("bug_severity", "severity"),
    ("rep_platform", "platform"),
    ("status_whiteboard", "whiteboard"),
    ("longdescs", "comments"),
    ("bug_file_loc", "url"),
    ("fixed_in", "cf_fixed_in"),
    ("devel_whiteboard", "cf_devel_whiteboard"),
];

/// A bug as returned by `GET /rest/bug`.
///
/// Only the id is typed; every other field is kept exactly as the server
/// sent it so custom fields survive untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    pub id: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// REST spelling of a field name, resolving legacy aliases.
pub fn canonical_field(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, rest)| *rest)
        .unwrap_or(name)
}

impl Bug {
    /// Look up a field by REST name or by one of its legacy aliases.
    pub fn field(&self, name: &str) -> Option<Value> {
        let canonical = canonical_field(name);
        if canonical == "id" {
            return Some(Value::from(self.id));
        }
        self.fields.get(canonical).cloned()
    }

    /// The full JSON document of the bug, keys sorted.
    pub fn raw(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::from(self.id));
        Value::Object(map)
    }
}

/// A product with whatever sub-objects were requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub versions: Vec<Version>,
}

/// A component of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub default_assigned_to: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// A version of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Attachment metadata and, when fetched, its base64 payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    #[serde(default)]
    pub bug_id: u64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_obsolete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Attachment {
    /// Decode the base64 payload.
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        let encoded = self.data.as_deref().ok_or_else(|| {
            BugzillaError::Parse(format!("attachment {} was returned without data", self.id))
        })?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| BugzillaError::Parse(format!("attachment {}: {}", self.id, e)))
    }
}

/// A new attachment to upload.
#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    pub file_name: String,
    pub summary: String,
    pub content_type: String,
    pub comment: Option<String>,
    pub is_patch: bool,
    pub is_private: bool,
    pub data: Vec<u8>,
}

impl NewAttachment {
    pub(crate) fn to_body(&self, bug_id: &str) -> Value {
        let mut body = Map::new();
        body.insert("ids".to_string(), Value::from(vec![bug_id.to_string()]));
        body.insert("data".to_string(), Value::from(STANDARD.encode(&self.data)));
        body.insert("file_name".to_string(), Value::from(self.file_name.clone()));
        body.insert("summary".to_string(), Value::from(self.summary.clone()));
        body.insert(
            "content_type".to_string(),
            Value::from(self.content_type.clone()),
        );
        if let Some(comment) = &self.comment {
            body.insert("comment".to_string(), Value::from(comment.clone()));
        }
        body.insert("is_patch".to_string(), Value::from(self.is_patch));
        body.insert("is_private".to_string(), Value::from(self.is_private));
        Value::Object(body)
    }
}

/// Which fields `get_bugs` should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub extra: Vec<String>,
}

impl FieldSelection {
    pub(crate) fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        let mut include = self.include.clone();
        if !self.extra.is_empty() {
            if include.is_empty() {
                include.push("_default".to_string());
            }
            include.extend(self.extra.iter().cloned());
        }
        if !include.is_empty() {
            query.push(("include_fields".to_string(), include.join(",")));
        }
        if !self.exclude.is_empty() {
            query.push(("exclude_fields".to_string(), self.exclude.join(",")));
        }
        query
    }
}

/// Per-bug result of an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugChange {
    pub id: u64,
    #[serde(default)]
    pub changes: Map<String, Value>,
}

/// Result of a username/password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user_id: u64,
    /// Whether the server returned a session token at all.
    pub token_returned: bool,
    /// Where the token was cached, if anywhere.
    pub token_file: Option<std::path::PathBuf>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsResponse {
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BugsResponse {
    #[serde(default)]
    pub bugs: Vec<Bug>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedResponse {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateResponse {
    #[serde(default)]
    pub bugs: Vec<BugChange>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachmentsResponse {
    #[serde(default)]
    pub bugs: Map<String, Value>,
    #[serde(default)]
    pub attachments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachmentIdsResponse {
    #[serde(default)]
    pub ids: Vec<Value>,
}

/// Bugzilla has sent booleans as both `true` and `1` over the years.
fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Parse a `{"error": true, ...}` document into a fault.
pub(crate) fn fault_from_body(body: &Value) -> Option<BugzillaError> {
    let obj = body.as_object()?;
    let is_error = matches!(obj.get("error"), Some(Value::Bool(true)));
    if !is_error {
        return None;
    }
    let code = match obj.get("code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    };
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Some(BugzillaError::Fault { code, message })
}
