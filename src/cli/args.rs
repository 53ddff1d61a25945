//! Command line grammar, shared by single-shot mode and the MI loop.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// Bugzilla command line tool
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "bugzilla")]
#[command(version, about, long_about = None)]
pub struct Options {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection, credential and logging options.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct GlobalOptions {
    /// Bugzilla URL (default: from settings, else https://bugzilla.redhat.com)
    #[arg(long, global = true, value_name = "URL")]
    pub bugzilla: Option<String>,

    /// Don't error on invalid bugzilla SSL certificate
    #[arg(long, global = true)]
    pub nosslverify: bool,

    /// Client side certificate file needed by the webserver
    #[arg(long, global = true, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Run interactive login before performing the specified command
    #[arg(long, global = true)]
    pub login: bool,

    /// Log in with this username
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Log in with this password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// The session (login token) is restricted to the current IP address
    #[arg(long = "restrict-login", global = true)]
    pub restrict_login: bool,

    /// Raise an error if we aren't logged in to bugzilla
    #[arg(long = "ensure-logged-in", global = true)]
    pub ensure_logged_in: bool,

    /// Don't save any bugzilla tokens or API keys to disk
    #[arg(long = "no-cache-credentials", global = true)]
    pub no_cache_credentials: bool,

    /// Cookie file location (identifies the session, cookies are kept in memory)
    #[arg(long, global = true, value_name = "FILE")]
    pub cookiefile: Option<PathBuf>,

    /// Bugzilla token file
    #[arg(long, global = true, value_name = "FILE")]
    pub tokenfile: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Give more info about what's going on
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Accepted for compatibility
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Bugzilla type; only 'auto' is supported
    #[arg(long, global = true, default_value = "auto", hide = true)]
    pub bztype: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Get info about the given bugzilla instance
    Info(InfoArgs),
    /// Search bugzilla for bugs matching the given arguments
    Query(QueryArgs),
    /// Create a new bug
    New(NewArgs),
    /// Modify one or more bugs
    Modify(ModifyArgs),
    /// Attach files or download attachments
    Attach(AttachArgs),
    /// Log into bugzilla
    Login(LoginArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Info(_) => "info",
            Command::Query(_) => "query",
            Command::New(_) => "new",
            Command::Modify(_) => "modify",
            Command::Attach(_) => "attach",
            Command::Login(_) => "login",
        }
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
#[command(group(
    ArgGroup::new("info_kind")
        .required(true)
        .args(["products", "components", "component_owners", "versions"])
))]
pub struct InfoArgs {
    /// Get a list of products
    #[arg(short = 'p', long)]
    pub products: bool,

    /// List the components in the given product
    #[arg(short = 'c', long, value_name = "PRODUCT")]
    pub components: Option<String>,

    /// List components (and their owners)
    #[arg(short = 'o', long = "component_owners", value_name = "PRODUCT")]
    pub component_owners: Option<String>,

    /// List the versions for the given product
    #[arg(short = 'v', long, value_name = "PRODUCT")]
    pub versions: Option<String>,

    /// Only show active components. Combine with --components*
    #[arg(long = "active-components")]
    pub active_components: bool,
}

/// How a bug list is printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Normal,
    Ids,
    Full,
    Extra,
    Oneline,
    Suppress,
    Raw,
    Json,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct OutputArgs {
    /// Output mode
    #[arg(long, value_enum)]
    pub output: Option<OutputMode>,

    /// Print output in the form given, e.g. '%{bug_id}: %{summary}'
    #[arg(long, value_name = "TEMPLATE")]
    pub outputformat: Option<String>,

    /// Output bug data as JSON
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub json: bool,

    /// Raw output of the bugzilla contents
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub raw: bool,

    /// Output only bug IDs
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub ids: bool,

    /// Output detailed bug info
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub full: bool,

    /// Output additional bug information (keywords, whiteboards, etc.)
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub extra: bool,

    /// One line summary of the bug (useful for scripts)
    #[arg(long, conflicts_with_all = ["output", "outputformat"])]
    pub oneline: bool,

    /// Pass the field name to bugzilla include_fields list
    #[arg(long = "includefield", value_name = "FIELD")]
    pub includefield: Vec<String>,

    /// Pass the field name to bugzilla exclude_fields list
    #[arg(long = "excludefield", value_name = "FIELD")]
    pub excludefield: Vec<String>,

    /// Pass the field name to bugzilla extra_fields list
    #[arg(long = "extrafield", value_name = "FIELD")]
    pub extrafield: Vec<String>,
}

impl OutputArgs {
    /// The effective mode; shorthand flags win over the default.
    pub fn mode(&self) -> OutputMode {
        if let Some(mode) = self.output {
            return mode;
        }
        [
            (self.json, OutputMode::Json),
            (self.raw, OutputMode::Raw),
            (self.ids, OutputMode::Ids),
            (self.full, OutputMode::Full),
            (self.extra, OutputMode::Extra),
            (self.oneline, OutputMode::Oneline),
        ]
        .into_iter()
        .find_map(|(set, mode)| set.then_some(mode))
        .unwrap_or(OutputMode::Normal)
    }
}

/// Bug fields shared by `query` and `new`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct BugFieldArgs {
    /// Product name
    #[arg(short = 'p', long)]
    pub product: Option<String>,

    /// Product version
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Component name
    #[arg(short = 'c', long)]
    pub component: Option<String>,

    /// Bug summary
    #[arg(short = 's', long)]
    pub summary: Option<String>,

    /// Description / comment text
    #[arg(short = 'l', long)]
    pub comment: Option<String>,

    /// Operating system
    #[arg(short = 'o', long)]
    pub os: Option<String>,

    /// Hardware architecture
    #[arg(long)]
    pub arch: Option<String>,

    /// Bug severity
    #[arg(short = 'x', long)]
    pub severity: Option<String>,

    /// Bug priority
    #[arg(short = 'z', long)]
    pub priority: Option<String>,

    /// URL field
    #[arg(short = 'u', long)]
    pub url: Option<String>,

    /// Bug assignee
    #[arg(short = 'a', long = "assigned_to")]
    pub assigned_to: Option<String>,

    /// QA contact
    #[arg(short = 'q', long = "qa_contact")]
    pub qa_contact: Option<String>,

    /// CC list
    #[arg(long)]
    pub cc: Vec<String>,

    /// Bug IDs that this bug blocks
    #[arg(long)]
    pub blocked: Vec<String>,

    /// Bug IDs that this bug depends on
    #[arg(long)]
    pub dependson: Vec<String>,

    /// Bug groups
    #[arg(long)]
    pub groups: Vec<String>,

    /// Bug keywords
    #[arg(short = 'k', long)]
    pub keywords: Vec<String>,

    /// Manually specify a bugzilla API field, e.g. cf_foo=bar
    #[arg(long, value_name = "NAME=VALUE")]
    pub field: Vec<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    /// Specify individual bugs by IDs, separated with commas
    #[arg(short = 'b', long = "bug_id", alias = "id", value_name = "IDS")]
    pub bug_id: Option<String>,

    /// Email: search reporter email for given address
    #[arg(short = 'r', long)]
    pub reporter: Option<String>,

    /// Restrict ticket to particular status; ALL, OPEN, DEV, QE and EOL
    /// are shorthands for sets of statuses
    #[arg(short = 't', long = "status", alias = "bug_status")]
    pub status: Option<String>,

    /// Search status whiteboard field for given substring
    #[arg(short = 'w', long)]
    pub whiteboard: Option<String>,

    /// Use a bugzilla query URL as the base of the search
    #[arg(long = "from-url", value_name = "URL")]
    pub from_url: Option<String>,

    /// Search using bugzilla's quicksearch functionality
    #[arg(long)]
    pub quicksearch: Option<String>,

    /// Name of a bugzilla saved search
    #[arg(long)]
    pub savedsearch: Option<String>,

    #[command(flatten)]
    pub fields: BugFieldArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct NewArgs {
    /// Mark new comment as private
    #[arg(long)]
    pub private: bool,

    #[command(flatten)]
    pub fields: BugFieldArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ModifyArgs {
    /// Bug IDs to operate on
    #[arg(required = true, num_args = 1.., value_name = "BUGID")]
    pub ids: Vec<String>,

    /// Change status of bug
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// Close with the given resolution (WONTFIX, NOTABUG, etc.)
    #[arg(short = 'k', long, value_name = "RESOLUTION")]
    pub close: Option<String>,

    /// ID of duplicate bug; implies --close DUPLICATE
    #[arg(short = 'd', long, value_name = "BUGID")]
    pub dupeid: Option<String>,

    /// Add comment to bug
    #[arg(short = 'l', long)]
    pub comment: Option<String>,

    /// Mark new comment as private
    #[arg(long)]
    pub private: bool,

    /// Reassign the bug
    #[arg(short = 'a', long = "assigned_to", alias = "assignee")]
    pub assigned_to: Option<String>,

    /// Reset assignee to component default
    #[arg(long = "reset-assignee")]
    pub reset_assignee: bool,

    /// Change QA contact
    #[arg(short = 'q', long = "qa_contact")]
    pub qa_contact: Option<String>,

    /// Reset QA contact to component default
    #[arg(long = "reset-qa-contact")]
    pub reset_qa_contact: bool,

    /// New summary
    #[arg(long)]
    pub summary: Option<String>,

    #[arg(short = 'p', long)]
    pub product: Option<String>,

    #[arg(short = 'c', long)]
    pub component: Option<String>,

    #[arg(short = 'v', long)]
    pub version: Option<String>,

    #[arg(short = 'o', long)]
    pub os: Option<String>,

    #[arg(long)]
    pub arch: Option<String>,

    #[arg(short = 'u', long)]
    pub url: Option<String>,

    #[arg(short = 'z', long)]
    pub priority: Option<String>,

    #[arg(short = 'x', long)]
    pub severity: Option<String>,

    #[arg(long = "target_release")]
    pub target_release: Option<String>,

    #[arg(long = "target_milestone")]
    pub target_milestone: Option<String>,

    /// Bug fixed in version
    #[arg(short = 'F', long = "fixed_in")]
    pub fixed_in: Option<String>,

    /// Keywords: +add, -remove, =set, or plain to add
    #[arg(long, allow_hyphen_values = true)]
    pub keywords: Vec<String>,

    /// CC list: +add, -remove
    #[arg(long, allow_hyphen_values = true)]
    pub cc: Vec<String>,

    /// Blocked bugs: +add, -remove, =set
    #[arg(long, allow_hyphen_values = true)]
    pub blocked: Vec<String>,

    /// Depends-on bugs: +add, -remove, =set
    #[arg(long, allow_hyphen_values = true)]
    pub dependson: Vec<String>,

    /// Groups: +add, -remove
    #[arg(long, allow_hyphen_values = true)]
    pub groups: Vec<String>,

    /// Status whiteboard: +append, -remove text, =set
    #[arg(short = 'w', long, allow_hyphen_values = true)]
    pub whiteboard: Vec<String>,

    /// Set or unset a flag, e.g. 'needinfo?' or 'review+'
    #[arg(short = 'f', long)]
    pub flag: Vec<String>,

    /// Don't send emails about this change
    #[arg(long = "minor-update")]
    pub minor_update: bool,

    /// Manually specify a bugzilla API field, e.g. cf_foo=bar
    #[arg(long, value_name = "NAME=VALUE")]
    pub field: Vec<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct AttachArgs {
    /// Bug IDs to attach the file to
    #[arg(value_name = "BUGID")]
    pub ids: Vec<String>,

    /// File to attach
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Mime-type for the attachment
    #[arg(short = 't', long = "type", value_name = "MIMETYPE")]
    pub content_type: Option<String>,

    /// Short description of the file
    #[arg(short = 'd', long)]
    pub desc: Option<String>,

    /// Add comment with the attachment
    #[arg(short = 'l', long)]
    pub comment: Option<String>,

    /// Mark new comment as private
    #[arg(long)]
    pub private: bool,

    /// Download the attachment with the given ID
    #[arg(short = 'g', long, value_name = "ATTID")]
    pub get: Vec<String>,

    /// Download all attachments on the given bug
    #[arg(long, value_name = "BUGID")]
    pub getall: Vec<String>,

    /// Do not download attachments marked as obsolete
    #[arg(long = "ignore-obsolete")]
    pub ignore_obsolete: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct LoginArgs {
    /// Log in with this username
    #[arg(value_name = "USERNAME")]
    pub pos_username: Option<String>,

    /// Log in with this password
    #[arg(value_name = "PASSWORD")]
    pub pos_password: Option<String>,

    /// Interactively configure an API key
    #[arg(long = "api-key")]
    pub api_key: bool,
}
