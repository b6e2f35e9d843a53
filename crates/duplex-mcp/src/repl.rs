//! Interactive REPL for the duplex-mcp server.
//!
//! Launch with `duplex-mcp repl` to enter interactive mode. The REPL runs
//! the server in-process and talks to it as an MCP client would.
//! Type `/help` for available commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::{Map, Value};

use duplex_core::types::{LogLevel, Root};
use duplex_core::SessionBuilder;

use crate::client::{ClientOptions, LocalClient};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/info", "Show server identity and capabilities"),
    ("/tools", "List available tools"),
    ("/resources", "List resources and resource templates"),
    ("/prompts", "List available prompts"),
    ("/call", "Call a tool: /call <name> [json-args]"),
    ("/read", "Read a resource: /read <uri>"),
    ("/prompt", "Render a prompt: /prompt <name> [json-args]"),
    ("/level", "Set the minimum log level: /level <level>"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion of commands and operation names.
#[derive(Default)]
struct DuplexHelper {
    tools: Vec<String>,
    uris: Vec<String>,
    prompts: Vec<String>,
}

impl Completer for DuplexHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        let names = match cmd {
            "/call" => &self.tools,
            "/read" => &self.uris,
            "/prompt" => &self.prompts,
            _ => return Ok((pos, Vec::new())),
        };
        if args.contains(' ') {
            return Ok((pos, Vec::new()));
        }

        let prefix_start = input.len() - args.len();
        let matches: Vec<Pair> = names
            .iter()
            .filter(|name| name.starts_with(args))
            .map(|name| Pair {
                display: name.clone(),
                replacement: format!("{name} "),
            })
            .collect();
        Ok((prefix_start, matches))
    }
}

impl Hinter for DuplexHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for DuplexHelper {}
impl Validator for DuplexHelper {}
impl Helper for DuplexHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL against a fresh session from `builder`.
pub async fn run(builder: SessionBuilder) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mduplex-mcp v{}\x1b[0m \x1b[90m\u{2014} Bidirectional MCP server\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let options = ClientOptions {
        roots: working_directory_root().into_iter().collect(),
        ..Default::default()
    };
    let mut client = LocalClient::connect(&builder, options).await?;

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<DuplexHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(completion_names(&client).await));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".duplex_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mduplex>\x1b[0m ";

    loop {
        let read = tokio::task::block_in_place(|| rl.readline(prompt));
        match read {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(&client),
                    "tools" => cmd_tools(&client).await,
                    "resources" => cmd_resources(&client).await,
                    "prompts" => cmd_prompts(&client).await,
                    "call" => cmd_call(&client, args).await,
                    "read" => cmd_read(&client, args).await,
                    "prompt" => cmd_prompt(&client, args).await,
                    "level" => cmd_level(&client, args).await,
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
                print_notifications(&mut client);
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    client.close().await;
    Ok(())
}

fn working_directory_root() -> Option<Root> {
    let cwd = std::env::current_dir().ok()?;
    Some(Root {
        uri: format!("file://{}", cwd.display()),
        name: cwd.file_name().map(|n| n.to_string_lossy().into_owned()),
    })
}

async fn completion_names(client: &LocalClient) -> DuplexHelper {
    let tools = client.list_tools().await.unwrap_or_default();
    let resources = client.list_resources().await.unwrap_or_default();
    let prompts = client.list_prompts().await.unwrap_or_default();
    DuplexHelper {
        tools: tools.into_iter().map(|t| t.name).collect(),
        uris: resources.into_iter().map(|r| r.uri).collect(),
        prompts: prompts.into_iter().map(|p| p.name).collect(),
    }
}

/// Split `<name> [json-object]` into the name and its arguments.
fn parse_invocation(args: &str) -> Result<(&str, Map<String, Value>), String> {
    let (name, rest) = args.split_once(' ').unwrap_or((args, ""));
    if name.is_empty() {
        return Err("missing name".to_string());
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((name, Map::new()));
    }
    match serde_json::from_str::<Value>(rest) {
        Ok(Value::Object(map)) => Ok((name, map)),
        Ok(_) => Err("arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON arguments: {e}")),
    }
}

fn print_notifications(client: &mut LocalClient) {
    while let Some(notification) = client.try_notification() {
        let params = notification
            .params
            .map(|p| p.to_string())
            .unwrap_or_default();
        eprintln!("  \x1b[90m\u{2190} {} {params}\x1b[0m", notification.method);
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands, tool names, URIs and prompts.");
    eprintln!();
}

fn cmd_info(client: &LocalClient) {
    let server = client.server();
    let session = client.session();
    eprintln!();
    eprintln!(
        "  Server:   {} v{}",
        server.server_info.name, server.server_info.version
    );
    eprintln!("  Protocol: {}", server.protocol_version);
    eprintln!("  Session:  {} ({})", session.id(), session.state());
    eprintln!(
        "  Capabilities: {}",
        serde_json::to_string(&server.capabilities).unwrap_or_default()
    );
    eprintln!();
}

async fn cmd_tools(client: &LocalClient) {
    match client.list_tools().await {
        Ok(tools) => {
            eprintln!();
            eprintln!("  {} tools available:", tools.len());
            eprintln!();
            for tool in &tools {
                eprintln!(
                    "    {:<28} {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or("")
                );
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Cannot list tools: {e}"),
    }
}

async fn cmd_resources(client: &LocalClient) {
    let resources = client.list_resources().await;
    let templates = client.list_resource_templates().await;
    match (resources, templates) {
        (Ok(resources), Ok(templates)) => {
            eprintln!();
            for resource in &resources {
                eprintln!("    {:<28} {}", resource.uri, resource.name);
            }
            for template in &templates {
                eprintln!("    {:<28} {}", template.uri_template, template.name);
            }
            eprintln!();
        }
        (Err(e), _) | (_, Err(e)) => eprintln!("  Cannot list resources: {e}"),
    }
}

async fn cmd_prompts(client: &LocalClient) {
    match client.list_prompts().await {
        Ok(prompts) => {
            eprintln!();
            for prompt in &prompts {
                let args: Vec<String> = prompt
                    .arguments()
                    .iter()
                    .map(|a| {
                        if a.required {
                            a.name.clone()
                        } else {
                            format!("[{}]", a.name)
                        }
                    })
                    .collect();
                eprintln!("    {:<20} {}", prompt.name, args.join(" "));
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Cannot list prompts: {e}"),
    }
}

async fn cmd_call(client: &LocalClient, args: &str) {
    let (name, arguments) = match parse_invocation(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("  Usage: /call <name> [json-args] ({e})");
            return;
        }
    };
    match client.call_tool(name, Value::Object(arguments)).await {
        Ok(result) if result.is_error() => eprintln!("  \x1b[31m{}\x1b[0m", result.text_content()),
        Ok(result) => println!("{}", result.text_content()),
        Err(e) => eprintln!("  Error: {e}"),
    }
}

async fn cmd_read(client: &LocalClient, args: &str) {
    if args.is_empty() {
        eprintln!("  Usage: /read <uri>");
        return;
    }
    match client.read_resource(args).await {
        Ok(result) => {
            for contents in result.contents {
                println!("{}", contents.text.unwrap_or_default());
            }
        }
        Err(e) => eprintln!("  Error: {e}"),
    }
}

async fn cmd_prompt(client: &LocalClient, args: &str) {
    let (name, arguments) = match parse_invocation(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("  Usage: /prompt <name> [json-args] ({e})");
            return;
        }
    };
    match client.get_prompt(name, arguments).await {
        Ok(result) => {
            if let Some(description) = result.description {
                eprintln!("  \x1b[90m{description}\x1b[0m");
            }
            for message in result.messages {
                println!(
                    "{:?}: {}",
                    message.role,
                    message.content.as_text().unwrap_or("<non-text content>")
                );
            }
        }
        Err(e) => eprintln!("  Error: {e}"),
    }
}

async fn cmd_level(client: &LocalClient, args: &str) {
    let level: LogLevel = match serde_json::from_value(Value::String(args.to_lowercase())) {
        Ok(level) => level,
        Err(_) => {
            eprintln!("  Usage: /level <debug|info|notice|warning|error|critical|alert|emergency>");
            return;
        }
    };
    match client.set_level(level).await {
        Ok(()) => eprintln!("  Minimum log level set to {args}"),
        Err(e) => eprintln!("  Error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invocation() {
        let (name, args) = parse_invocation(r#"add {"a": 1, "b": 2}"#).unwrap();
        assert_eq!(name, "add");
        assert_eq!(args["b"], 2);

        let (name, args) = parse_invocation("logging-test").unwrap();
        assert_eq!(name, "logging-test");
        assert!(args.is_empty());

        assert!(parse_invocation("").is_err());
        assert!(parse_invocation("add [1, 2]").is_err());
        assert!(parse_invocation("add {oops").is_err());
    }
}
