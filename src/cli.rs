//! Command-line surface: one `transform` subcommand per registered transform.
//!
//! ```text
//! scout transform <name> [options] <nodes...>
//! scout list
//! ```

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, ScoutConfig};
use crate::extraction::{ExtractionSpec, FieldPath};
use crate::node::Node;
use crate::persist::{self, PersistError};
use crate::runner::{RunError, TransformResult, TransformRunner};
use crate::serialization::{self, OutputFormat, SerializationError};
use crate::store::{GraphError, NodeStore};
use crate::transform_registry::{TransformDescriptor, TransformError, TransformRegistry};

/// Flags every transform subcommand carries; transform options may not reuse them.
pub const RESERVED_FLAGS: &[&str] = &[
    "nodes",
    "group",
    "select",
    "extract",
    "extract-prefix",
    "extract-suffix",
    "read",
    "write",
    "format",
    "config",
    "help",
];

/// Error type for CLI handling
#[derive(Debug)]
pub enum CliError {
    Usage(String),
    Config(ConfigError),
    Transform(TransformError),
    Graph(GraphError),
    Persist(PersistError),
    Output(SerializationError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "Usage error: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Transform(e) => write!(f, "{}", e),
            CliError::Graph(e) => write!(f, "{}", e),
            CliError::Persist(e) => write!(f, "{}", e),
            CliError::Output(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err)
    }
}

impl From<TransformError> for CliError {
    fn from(err: TransformError) -> Self {
        CliError::Transform(err)
    }
}

impl From<GraphError> for CliError {
    fn from(err: GraphError) -> Self {
        CliError::Graph(err)
    }
}

impl From<PersistError> for CliError {
    fn from(err: PersistError) -> Self {
        CliError::Persist(err)
    }
}

impl From<SerializationError> for CliError {
    fn from(err: SerializationError) -> Self {
        CliError::Output(err)
    }
}

/// Build the full command tree from the registry.
pub fn build_command(registry: &TransformRegistry) -> Command {
    let transform = Command::new("transform")
        .alias("t")
        .about("Perform inline transformation")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommands(registry.descriptors().map(|d| transform_command(registry, d)));

    Command::new("scout")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reconnaissance graph engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to config file (default: scout.yaml)"),
        )
        .subcommand(transform)
        .subcommand(Command::new("list").alias("ls").about("List available transforms"))
}

fn transform_command(registry: &TransformRegistry, descriptor: &TransformDescriptor) -> Command {
    let name = descriptor.name.to_lowercase();
    let aliases: Vec<String> = registry
        .keys_of(&descriptor.name)
        .into_iter()
        .filter(|k| *k != name)
        .collect();

    let mut command = Command::new(name)
        .visible_aliases(aliases)
        .about(descriptor.meta.description.clone())
        .arg(
            Arg::new("nodes")
                .required(true)
                .num_args(1..)
                .value_name("NODES")
                .help("Node labels to seed (or patterns with --select)"),
        )
        .arg(Arg::new("group").short('g').long("group").help("Group nodes"))
        .arg(
            Arg::new("select")
                .short('s')
                .long("select")
                .action(ArgAction::SetTrue)
                .help("Select nodes"),
        )
        .arg(Arg::new("extract").short('e').long("extract").help("Extract fields"))
        .arg(Arg::new("extract-prefix").long("extract-prefix").help("Prefix after extraction"))
        .arg(Arg::new("extract-suffix").long("extract-suffix").help("Suffix after extraction"))
        .arg(
            Arg::new("read")
                .short('r')
                .long("read")
                .value_parser(value_parser!(PathBuf))
                .help("Read graph from file"),
        )
        .arg(
            Arg::new("write")
                .short('w')
                .long("write")
                .value_parser(value_parser!(PathBuf))
                .help("Write graph to file"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(value_parser!(OutputFormat))
                .help("Output format"),
        );

    for (option, spec) in &descriptor.meta.options {
        if RESERVED_FLAGS.contains(&option.as_str()) {
            tracing::warn!(
                "{}: option '{}' clashes with a built-in flag; not exposed",
                descriptor.name,
                option
            );
            continue;
        }

        let mut arg = Arg::new(option.clone())
            .long(option.clone())
            .value_name("VALUE")
            .help(spec.description.clone());
        if let Some(default) = &spec.default {
            arg = arg.default_value(default.to_string());
        }
        command = command.arg(arg);
    }

    command
}

/// A parsed transform invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub transform: String,
    pub nodes: Vec<String>,
    pub select: bool,
    pub group: Option<String>,
    pub extraction: Option<ExtractionSpec>,
    pub options: HashMap<String, String>,
    pub read: Option<PathBuf>,
    pub write: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    List,
    Transform(Invocation),
}

fn non_empty(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).filter(|s| !s.is_empty()).cloned()
}

/// Turn parsed arguments into an [`Action`].
pub fn parse_action(
    registry: &TransformRegistry,
    matches: &ArgMatches,
) -> Result<Action, CliError> {
    match matches.subcommand() {
        Some(("list", _)) => Ok(Action::List),
        Some(("transform", sub)) => {
            let (name, m) = sub
                .subcommand()
                .ok_or_else(|| CliError::Usage("missing transform name".to_string()))?;
            let descriptor = registry.resolve(name)?;

            let mut options = HashMap::new();
            for option in descriptor.meta.options.keys() {
                if RESERVED_FLAGS.contains(&option.as_str()) {
                    continue;
                }
                if let Some(value) = m.get_one::<String>(option) {
                    options.insert(option.clone(), value.clone());
                }
            }

            let extraction = non_empty(m, "extract").map(|property| ExtractionSpec {
                property,
                prefix: non_empty(m, "extract-prefix").unwrap_or_default(),
                suffix: non_empty(m, "extract-suffix").unwrap_or_default(),
            });

            Ok(Action::Transform(Invocation {
                transform: descriptor.name.clone(),
                nodes: m.get_many::<String>("nodes").into_iter().flatten().cloned().collect(),
                select: m.get_flag("select"),
                group: non_empty(m, "group"),
                extraction,
                options,
                read: m.get_one::<PathBuf>("read").cloned(),
                write: m.get_one::<PathBuf>("write").cloned(),
                format: m.get_one::<OutputFormat>("format").copied(),
            }))
        }
        Some((other, _)) => Err(CliError::Usage(format!("unknown command '{}'", other))),
        None => Err(CliError::Usage("missing command".to_string())),
    }
}

/// Everything an invocation left behind.
#[derive(Debug)]
pub struct Outcome {
    pub store: NodeStore,
    pub result: TransformResult,
    pub groups: Option<Vec<Node>>,
    /// Set when the run itself aborted; output was still produced
    pub fatal: Option<RunError>,
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        if self.fatal.is_some() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

/// Diagnostics are best effort: a closed stderr must not fail the run.
fn report<D: Write>(diag: &mut D, level: &str, message: impl fmt::Display) {
    let _ = writeln!(diag, "{}: {}", level, message);
}

/// Run one transform invocation end to end: read, seed or select, transform,
/// group, write, render. Results go to `out`, diagnostics to `diag`.
pub async fn execute<W, D>(
    registry: &TransformRegistry,
    config: &ScoutConfig,
    invocation: &Invocation,
    mut out: W,
    mut diag: D,
) -> Result<Outcome, CliError>
where
    W: Write,
    D: Write,
{
    let mut store = NodeStore::new();

    if let Some(path) = &invocation.read {
        persist::read_graph(path, &mut store)?;
    }

    if invocation.select {
        if let Err(e) = store.select(&invocation.nodes) {
            report(&mut diag, "warning", &e);
        }
    } else {
        store.seed(invocation.nodes.iter().cloned())?;
    }

    let runner = TransformRunner::with_config(registry, config.runner_config());
    let (result, fatal) = match runner
        .run(
            &mut store,
            &invocation.transform,
            &invocation.options,
            invocation.extraction.as_ref(),
        )
        .await
    {
        Ok(result) => (result, None),
        Err(e) => {
            tracing::error!("{}", e);
            report(&mut diag, "error", &e);
            let empty = TransformResult {
                transform: invocation.transform.clone(),
                ..Default::default()
            };
            (empty, Some(e))
        }
    };

    for warning in &result.warnings {
        report(&mut diag, "warning", warning);
    }
    for error in &result.errors {
        report(&mut diag, "error", error);
    }

    // Only transform output is grouped; seeds left active by a failed or
    // empty run are not.
    let groups = match &invocation.group {
        Some(key) if fatal.is_none() && !result.nodes.is_empty() => {
            Some(store.group(&FieldPath::from_dotted(key))?)
        }
        Some(key) => {
            report(&mut diag, "warning", format_args!("nothing to group by {}", key));
            Some(Vec::new())
        }
        None => None,
    };

    if let Some(path) = &invocation.write {
        persist::write_graph(path, &store)?;
    }

    let format = config.output_format(invocation.format);
    let rendered: &[Node] = groups.as_deref().unwrap_or(&result.nodes);

    match &invocation.extraction {
        Some(spec) if groups.is_some() => {
            serialization::render_values(&mut out, format, &spec.apply(rendered))?;
        }
        Some(_) => {
            let values = result.extracted.clone().unwrap_or_default();
            serialization::render_values(&mut out, format, &values)?;
        }
        None => serialization::render_nodes(&mut out, format, rendered)?,
    }

    Ok(Outcome {
        store,
        result,
        groups,
        fatal,
    })
}

/// Print every registered transform.
pub fn render_catalogue<W: Write>(registry: &TransformRegistry, mut out: W) -> std::io::Result<()> {
    for descriptor in registry.descriptors() {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            descriptor.name,
            descriptor.meta.alias.join(","),
            descriptor.meta.title,
            descriptor.meta.types.join(",")
        )?;
    }
    out.flush()
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ScoutConfig) {
    let fallback = config.log.as_deref().unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Entry point behind the `scout` binary.
pub async fn main_with<I, T>(registry: TransformRegistry, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_command(&registry).try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS };
        }
    };

    let explicit = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let config = match ScoutConfig::load(explicit) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    let action = match parse_action(&registry, &matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match action {
        Action::List => match render_catalogue(&registry, std::io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Action::Transform(invocation) => {
            let out = std::io::stdout().lock();
            match execute(&registry, &config, &invocation, out, std::io::stderr()).await {
                Ok(outcome) => outcome.exit_code(),
                Err(e) => {
                    tracing::error!("{}", e);
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform_registry::TransformMeta;
    use crate::transforms::builtin_registry;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn parse(registry: &TransformRegistry, args: &[&str]) -> Action {
        let matches = build_command(registry).try_get_matches_from(args).unwrap();
        parse_action(registry, &matches).unwrap()
    }

    fn invocation(action: Action) -> Invocation {
        match action {
            Action::Transform(invocation) => invocation,
            other => panic!("expected transform, got {:?}", other),
        }
    }

    #[test]
    fn test_command_is_well_formed() {
        build_command(&builtin_registry().unwrap()).debug_assert();
    }

    #[test]
    fn test_parse_transform_flags() {
        let registry = builtin_registry().unwrap();
        let inv = invocation(parse(
            &registry,
            &[
                "scout",
                "transform",
                "echo",
                "-e",
                "label",
                "--extract-prefix",
                "<",
                "-g",
                "type",
                "a.com",
                "b.com",
            ],
        ));

        assert_eq!(inv.transform, "echo");
        assert_eq!(inv.nodes, vec!["a.com", "b.com"]);
        assert!(!inv.select);
        assert_eq!(inv.group.as_deref(), Some("type"));
        assert_eq!(inv.extraction, Some(ExtractionSpec::new("label").with_prefix("<")));
    }

    #[test]
    fn test_aliases_and_option_defaults() {
        let registry = builtin_registry().unwrap();

        let inv = invocation(parse(&registry, &["scout", "t", "dnsr", "example.com"]));
        assert_eq!(inv.transform, "dnsResolve");
        assert_eq!(inv.options.get("family").map(String::as_str), Some("any"));

        let args = ["scout", "t", "dns_resolve", "--family", "ipv6", "-s", "x"];
        let inv = invocation(parse(&registry, &args));
        assert_eq!(inv.options.get("family").map(String::as_str), Some("ipv6"));
        assert!(inv.select);
    }

    #[test]
    fn test_list_command() {
        let registry = builtin_registry().unwrap();
        assert_eq!(parse(&registry, &["scout", "list"]), Action::List);

        let mut out = Vec::new();
        render_catalogue(&registry, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("dnsResolve\tdnsr\tDNS Resolve\tdomain,string"));
    }

    #[test]
    fn test_nodes_are_required() {
        let registry = builtin_registry().unwrap();
        assert!(build_command(&registry).try_get_matches_from(["scout", "t", "echo"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_echo_with_extraction() {
        let registry = builtin_registry().unwrap();
        let inv = invocation(parse(
            &registry,
            &[
                "scout",
                "t",
                "echo",
                "-e",
                "string",
                "--extract-prefix",
                "[",
                "--extract-suffix",
                "]",
                "a.com",
                "b.com",
            ],
        ));

        let mut out = Vec::new();
        let mut diag = Vec::new();
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, &mut out, &mut diag)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "[a.com]\n[b.com]\n");
        assert!(diag.is_empty());
        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.store.len(), 4);
    }

    #[tokio::test]
    async fn test_execute_group_and_write_then_select() {
        let registry = builtin_registry().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let graph = temp_dir.path().join("graph.json");
        let graph_arg = graph.to_string_lossy().to_string();

        let inv = invocation(parse(
            &registry,
            &["scout", "t", "echo", "-g", "type", "-w", &graph_arg, "-f", "json", "a.com", "b.com"],
        ));
        let mut out = Vec::new();
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, &mut out, Vec::new())
            .await
            .unwrap();

        let groups = outcome.groups.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label(), "string");
        let rendered: Vec<Node> = serde_json::from_slice(&out).unwrap();
        assert_eq!(rendered[0].id(), groups[0].id());

        // Second invocation: read the saved graph and select an existing node by label.
        let inv = invocation(parse(
            &registry,
            &["scout", "t", "nop", "-r", &graph_arg, "-s", "a.com"],
        ));
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, Vec::new(), Vec::new())
            .await
            .unwrap();

        assert_eq!(outcome.store.len(), 5);
        assert!(outcome.result.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_execute_select_miss_warns() {
        let registry = builtin_registry().unwrap();
        let inv = invocation(parse(&registry, &["scout", "t", "echo", "-s", "nowhere"]));

        let mut out = Vec::new();
        let mut diag = Vec::new();
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, &mut out, &mut diag)
            .await
            .unwrap();

        assert!(out.is_empty());
        let diag = String::from_utf8(diag).unwrap();
        assert!(diag.contains("warning: No node matches selection: nowhere"));
        assert!(outcome.fatal.is_none());
    }

    #[tokio::test]
    async fn test_group_skipped_without_output() {
        let mut registry = builtin_registry().unwrap();
        let meta = TransformMeta {
            types: vec!["ip".to_string()],
            ..Default::default()
        };
        registry.register(TransformDescriptor::from_transform(
            "ipEcho",
            meta,
            Arc::new(crate::transforms::builtin::echo),
        ));

        let inv = invocation(parse(&registry, &["scout", "t", "ipecho", "-g", "type", "a.com"]));
        let mut diag = Vec::new();
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, Vec::new(), &mut diag)
            .await
            .unwrap();

        assert_eq!(outcome.groups, Some(Vec::new()));
        assert_eq!(outcome.store.len(), 1);
        assert!(String::from_utf8(diag).unwrap().contains("warning: nothing to group by type"));

        // A fatal run leaves the seeds alone too.
        let inv = Invocation {
            transform: "missing".to_string(),
            nodes: vec!["a.com".to_string(), "b.com".to_string()],
            group: Some("type".to_string()),
            ..Default::default()
        };
        let outcome = execute(&registry, &ScoutConfig::default(), &inv, Vec::new(), Vec::new())
            .await
            .unwrap();

        assert!(outcome.fatal.is_some());
        assert_eq!(outcome.groups, Some(Vec::new()));
        assert_eq!(outcome.store.len(), 2);
    }

    #[test]
    fn test_taken_over_alias_routes_to_new_transform() {
        let mut registry = builtin_registry().unwrap();
        let meta = TransformMeta {
            alias: vec!["dnsr".to_string()],
            ..Default::default()
        };
        registry.register(TransformDescriptor::from_transform(
            "myDns",
            meta,
            Arc::new(crate::transforms::builtin::echo),
        ));

        build_command(&registry).debug_assert();
        assert_eq!(invocation(parse(&registry, &["scout", "t", "dnsr", "x"])).transform, "myDns");
        assert_eq!(
            invocation(parse(&registry, &["scout", "t", "dnsresolve", "x"])).transform,
            "dnsResolve"
        );
    }
}
