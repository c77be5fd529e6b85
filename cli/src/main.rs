//! `edgectl`: raw access to the local agent API and the registry API.
//!
//! Output goes to stdout, diagnostics to stderr. Failures exit with the
//! codes from `edge_core::ExitCode`.

use clap::{Args, Parser, Subcommand};
use edge_core::auth::{is_api_key, using_api_key};
use edge_core::config::{exchange_url, exchange_url_overridden, set_default_arch};
use edge_core::files::{confirm_remove, marshal_indent, read_json_file, unmarshal};
use edge_core::{
    fatal, logging, resolve_exchange_auth, AnaxFiles, Body, Config, Error, GlobalOptions,
    LocalAgentClient, OrExit, RawString, RegistryClient, Typed, UreqTransport, WriteMethod,
};

#[derive(Debug, Parser)]
#[command(name = "edgectl", version)]
#[command(about = "Query and update the local edge agent and the registry")]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call the local agent API (HORIZON_URL overrides the address)
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Call the registry API
    Exchange {
        #[command(flatten)]
        auth: ExchangeAuth,

        #[command(subcommand)]
        command: ExchangeCommand,
    },
}

#[derive(Debug, Subcommand)]
enum AgentCommand {
    Get {
        path: String,
        /// Acceptable HTTP codes; the body is shown only for the first one
        #[arg(long, value_delimiter = ',', default_value = "200")]
        accept: Vec<u16>,
        /// Print the body as received instead of re-indenting it
        #[arg(long)]
        raw: bool,
    },
    Put(WriteArgs),
    Post(WriteArgs),
    Delete {
        path: String,
        #[arg(long, value_delimiter = ',', default_value = "204")]
        accept: Vec<u16>,
    },
}

#[derive(Debug, Subcommand)]
enum ExchangeCommand {
    Get {
        path: String,
        #[arg(long, value_delimiter = ',', default_value = "200")]
        accept: Vec<u16>,
    },
    Put(WriteArgs),
    Post(WriteArgs),
    Delete {
        path: String,
        #[arg(long, value_delimiter = ',', default_value = "204")]
        accept: Vec<u16>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct WriteArgs {
    path: String,
    /// JSON input file, or - for stdin
    #[arg(short, long)]
    file: String,
    #[arg(long, value_delimiter = ',', default_value = "201")]
    accept: Vec<u16>,
}

#[derive(Debug, Args)]
struct ExchangeAuth {
    /// Registry user credentials, user:password
    #[arg(short = 'u', long, default_value = "")]
    user_pw: String,
    /// Node credentials, id:token
    #[arg(short = 'n', long, default_value = "")]
    node_id_tok: String,
    /// Registry base URL; defaults to HZN_EXCHANGE_URL or the agent's configuration
    #[arg(long)]
    url: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);
    set_default_arch();
    let config = Config::from(&cli.global);

    match cli.command {
        Command::Agent { command } => run_agent(command, config),
        Command::Exchange { auth, command } => run_exchange(auth, command, config),
    }
}

/// Input file as text; the registry receives text bodies as JSON.
fn read_text_body(file: &str) -> Body {
    let bytes = read_json_file(file).or_exit();
    Body::Text(String::from_utf8_lossy(&bytes).into_owned())
}

/// Input file validated as JSON, so the agent gets a JSON content type.
fn read_json_body(file: &str) -> Body {
    let bytes = read_json_file(file).or_exit();
    let value: serde_json::Value = unmarshal(&bytes, file).or_exit();
    Body::json(&value).or_exit()
}

fn print_json(value: &serde_json::Value, context: &str) {
    println!("{}", marshal_indent(value, context).or_exit());
}

/// Exit with not-found when a GET answered with a secondary acceptable code.
fn require_found<O>(path: &str, code: u16, body: Option<O>) -> O {
    body.unwrap_or_else(|| {
        fatal(&Error::NotFound(format!(
            "{path} not found (HTTP code {code})"
        )))
    })
}

fn run_agent(command: AgentCommand, config: Config) {
    let client = LocalAgentClient::new(config);
    match command {
        AgentCommand::Get { path, accept, raw } => {
            if raw {
                let resp = client.get(&path, &accept, &RawString, false).or_exit();
                println!("{}", require_found(&path, resp.code, resp.body));
            } else {
                let resp = client
                    .get(&path, &accept, &Typed::<serde_json::Value>::new(), false)
                    .or_exit();
                print_json(&require_found(&path, resp.code, resp.body), &path);
            }
        }
        AgentCommand::Put(args) => agent_write(&client, WriteMethod::Put, args),
        AgentCommand::Post(args) => agent_write(&client, WriteMethod::Post, args),
        AgentCommand::Delete { path, accept } => {
            println!("{}", client.delete(&path, &accept));
        }
    }
}

fn agent_write(client: &LocalAgentClient, method: WriteMethod, args: WriteArgs) {
    let body = read_json_body(&args.file);
    let resp = client.put_post(method, &args.path, &args.accept, body);
    if resp.body.is_empty() {
        println!("{}", resp.code);
    } else {
        println!("{}", resp.body);
    }
}

fn run_exchange(auth: ExchangeAuth, command: ExchangeCommand, config: Config) {
    let creds = resolve_exchange_auth(&auth.user_pw, &auth.node_id_tok).or_exit();
    let url_overridden = auth.url.is_some() || exchange_url_overridden();
    let base = auth
        .url
        .unwrap_or_else(|| exchange_url(&AnaxFiles::default(), using_api_key(is_api_key(&creds))));
    let client = RegistryClient::with_transport(url_overridden, config, UreqTransport::new());

    match command {
        ExchangeCommand::Get { path, accept } => {
            let resp = client.get(
                &base,
                &path,
                &creds,
                &accept,
                &Typed::<serde_json::Value>::new(),
            );
            if resp.code != accept.first().copied().unwrap_or(resp.code) {
                let code = resp.code;
                fatal(&Error::NotFound(format!("{path} not found (HTTP code {code})")));
            }
            match resp.body {
                Some(value) => print_json(&value, &path),
                None => tracing::warn!("empty response body from {path}"),
            }
        }
        ExchangeCommand::Put(args) => {
            let body = read_text_body(&args.file);
            let code =
                client.put_post(WriteMethod::Put, &base, &args.path, &creds, &args.accept, body);
            println!("{code}");
        }
        ExchangeCommand::Post(args) => {
            let body = read_text_body(&args.file);
            let code =
                client.put_post(WriteMethod::Post, &base, &args.path, &creds, &args.accept, body);
            println!("{code}");
        }
        ExchangeCommand::Delete { path, accept, force } => {
            if !force {
                confirm_remove(&format!(
                    "Are you sure you want to delete {path} from the registry?"
                ));
            }
            println!("{}", client.delete(&base, &path, &creds, &accept));
        }
    }
}
