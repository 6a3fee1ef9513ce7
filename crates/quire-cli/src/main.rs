use miette::{IntoDiagnostic, Result, miette};
use quire_client::config::FileStore;
use quire_client::telemetry::{self, TelemetryConfig};
use quire_client::{
    Config, EditorClient, HttpTransport, SessionHandle, SessionOptions, SessionView, spawn_session,
};
use quire_core::{SnippetId, StyleTokens, token};
use quire_renderer::{PreviewRenderer, ThemeKey, theme};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "quire - Markdown documents with embedded HTML snippets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a config file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// GraphQL endpoint of the editor service
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a stored document
    Show {
        document_key: String,
    },
    /// Render a document and print the sanitized preview
    Render {
        document_key: String,

        /// Print only the body HTML, without the stylesheet
        #[arg(long)]
        body: bool,
    },
    /// Replace a document's Markdown, then save and render it
    Save {
        document_key: String,

        /// Markdown file to read (stdin when omitted or `-`)
        file: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,

        /// Theme override, e.g. `--style linkColor=#c00`
        #[arg(long = "style", value_parser = parse_style)]
        styles: Vec<(String, String)>,
    },
    /// Manage HTML snippets
    #[command(subcommand)]
    Snippet(SnippetCommand),
    /// Manage the config file
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the stylesheet for a set of theme overrides
    Theme {
        /// Start from this document's stored overrides
        #[arg(long)]
        document: Option<String>,

        #[arg(long = "style", value_parser = parse_style)]
        styles: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a config file with the defaults (at `--config` or the default path)
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SnippetCommand {
    /// Store a snippet for a document
    Add {
        document_key: String,

        /// HTML file to read (stdin when omitted or `-`)
        file: Option<PathBuf>,

        #[arg(long)]
        name: Option<String>,

        /// Also reference the snippet at the end of the document and save
        #[arg(long)]
        insert: bool,
    },
    /// List a document's snippets
    List {
        document_key: String,
    },
    /// Delete a snippet
    Rm {
        document_key: String,
        id: String,

        /// Also drop references to it from the document
        #[arg(long)]
        strip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Commands::Config(ConfigCommand::Init { force }) = cli.command {
        let path = init_config(cli.config, cli.endpoint, force).await?;
        println!("✓ Wrote {}", path.display());
        return Ok(());
    }
    let config = load_config(cli.config.as_deref(), cli.endpoint).await?;

    match cli.command {
        Commands::Theme { document, styles } => {
            let mut tokens = match document {
                Some(key) => connect(&config)?
                    .load_document(&key)
                    .await?
                    .map(|doc| doc.style_tokens)
                    .unwrap_or_default(),
                None => StyleTokens::new(),
            };
            tokens.extend(styles);
            println!("{}", theme::resolve(&tokens).css);
        }
        Commands::Show { document_key } => {
            show_document(Arc::new(connect(&config)?), document_key).await?;
        }
        Commands::Render { document_key, body } => {
            let client = connect(&config)?;
            let result = client.render(&document_key).await?;
            let mut preview = PreviewRenderer::new(&config.sanitizer());
            preview.apply(&result);
            for warning in &result.warnings {
                eprintln!("⚠ {warning}");
            }
            if body {
                println!("{}", preview.html());
            } else {
                println!("{}", preview.frame().to_html());
            }
        }
        Commands::Save {
            document_key,
            file,
            title,
            styles,
        } => {
            let content = read_input(file.as_deref()).await?;
            let client = Arc::new(connect(&config)?);
            save_document(client, &config, document_key, content, title, styles).await?;
        }
        Commands::Snippet(command) => {
            let client = Arc::new(connect(&config)?);
            run_snippet_command(client, &config, command).await?;
        }
        Commands::Config(ConfigCommand::Init { .. }) => {}
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    telemetry::init(TelemetryConfig::from_env("quire").with_level(level));
}

/// Config file (explicit or default path), then `QUIRE_*` variables, then flags.
async fn load_config(path: Option<&Path>, endpoint: Option<String>) -> Result<Config> {
    let config = match path {
        Some(path) if !path.exists() => {
            return Err(miette!("Config file not found: {}", path.display()));
        }
        Some(path) => Config::load(&FileStore::new(path)).await?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using default config file");
                Config::load(&FileStore::new(path)).await?
            }
            None => Config::default(),
        },
    };

    let mut config = config.with_overrides(|name| std::env::var(name).ok())?;
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    Ok(config)
}

/// Write the defaults, plus `endpoint` when given. Environment overrides are
/// left out so the API key never lands on disk.
async fn init_config(path: Option<PathBuf>, endpoint: Option<String>, force: bool) -> Result<PathBuf> {
    let path = path
        .or_else(Config::default_path)
        .ok_or_else(|| miette!("No config directory on this platform, pass --config"))?;
    if path.exists() && !force {
        return Err(miette!(
            "{} already exists (use --force to replace it)",
            path.display()
        ));
    }

    let mut config = Config::default();
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    config.save(&FileStore::new(&path)).await?;
    tracing::info!(path = %path.display(), "config written");
    Ok(path)
}

fn connect(config: &Config) -> Result<EditorClient<HttpTransport>> {
    tracing::debug!(endpoint = %config.endpoint, "connecting");
    Ok(EditorClient::from_config(config)?)
}

async fn show_document(client: Arc<EditorClient<HttpTransport>>, key: String) -> Result<()> {
    let document = client
        .load_document(&key)
        .await?
        .ok_or_else(|| miette!("No document named {key:?}"))?;
    let snippets = client.snippets(key.as_str()).list().await?;

    if let Some(title) = &document.title {
        eprintln!("title:   {title}");
    }
    eprintln!("updated: {}", document.updated_at.to_rfc3339());
    for (name, value) in &document.style_tokens {
        eprintln!("style:   {name}={value}");
    }
    for id in token::dangling(&document.content_md, snippets.iter().map(|s| &s.id)) {
        eprintln!("⚠ references missing snippet {id}");
    }
    println!("{}", document.content_md);
    Ok(())
}

async fn save_document(
    client: Arc<EditorClient<HttpTransport>>,
    config: &Config,
    key: String,
    content: String,
    title: Option<String>,
    styles: Vec<(String, String)>,
) -> Result<()> {
    let session = open_session(client, config, &key).await?;
    let opened = session.view();

    session.set_content(content).into_diagnostic()?;
    if title.is_some() {
        session.set_title(title).into_diagnostic()?;
    }
    if !styles.is_empty() {
        let mut tokens = opened
            .local
            .map(|draft| draft.style_tokens)
            .unwrap_or_default();
        tokens.extend(styles);
        session.set_style_tokens(tokens).into_diagnostic()?;
    }
    session.flush().into_diagnostic()?;

    let view = finish(session).await?;
    if view.revision == opened.revision {
        println!("✓ {key} is already up to date");
    } else {
        println!("✓ Saved {key}");
    }
    report_preview(&view);
    Ok(())
}

async fn run_snippet_command(
    client: Arc<EditorClient<HttpTransport>>,
    config: &Config,
    command: SnippetCommand,
) -> Result<()> {
    match command {
        SnippetCommand::Add {
            document_key,
            file,
            name,
            insert,
        } => {
            let raw_html = read_input(file.as_deref()).await?;
            let snippet = client
                .snippets(document_key.as_str())
                .create(&raw_html, name.as_deref())
                .await?;
            println!("✓ Created snippet {}", snippet.id);
            for warning in &snippet.warnings {
                eprintln!("⚠ {warning}");
            }

            if insert {
                let session = open_session(client, config, &document_key).await?;
                session.insert_snippet(snippet.id.clone()).into_diagnostic()?;
                let view = finish(session).await?;
                println!("✓ Inserted {} into {document_key}", token::encode(&snippet.id));
                report_preview(&view);
            }
        }
        SnippetCommand::List { document_key } => {
            let snippets = client.snippets(document_key.as_str()).list().await?;
            if snippets.is_empty() {
                eprintln!("No snippets for {document_key}");
            }
            for snippet in snippets {
                println!(
                    "{}\t{}\t{}",
                    snippet.id,
                    snippet.name.as_deref().unwrap_or("-"),
                    snippet.updated_at.to_rfc3339()
                );
            }
        }
        SnippetCommand::Rm {
            document_key,
            id,
            strip,
        } => {
            let id = SnippetId::new(&id).into_diagnostic()?;
            if client.snippets(document_key.as_str()).delete(&id).await? {
                println!("✓ Deleted snippet {id}");
            } else {
                println!("⚠ No snippet {id} in {document_key}");
            }

            if strip {
                let session = open_session(client, config, &document_key).await?;
                let content = session.view().local_md().unwrap_or_default().to_owned();
                if token::contains(&content, &id) {
                    session
                        .set_content(token::remove(&content, &id))
                        .into_diagnostic()?;
                    session.flush().into_diagnostic()?;
                }
                finish(session).await?;
                println!("✓ Removed references from {document_key}");
            }
        }
    }
    Ok(())
}

/// Spawn a session and wait for the stored document to load and render.
async fn open_session(
    client: Arc<EditorClient<HttpTransport>>,
    config: &Config,
    key: &str,
) -> Result<SessionHandle> {
    let (session, _notices) = spawn_session(client, SessionOptions::from(config), key);
    let view = session.settled().await;
    if let Some(error) = view.last_error {
        session.close().await;
        return Err(miette!("Couldn't open {key}: {error}"));
    }
    Ok(session)
}

/// Wait for pending work, close the session and fail if a round trip did.
async fn finish(session: SessionHandle) -> Result<SessionView> {
    let view = session.settled().await;
    session.close().await;
    match view.last_error {
        Some(error) => Err(miette!("{error}")),
        None => Ok(view),
    }
}

fn report_preview(view: &SessionView) {
    for warning in &view.warnings {
        eprintln!("⚠ {warning}");
    }
    tracing::info!(bytes = view.preview.html.len(), "preview rendered");
}

async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => {
            tokio::fs::read_to_string(path).await.into_diagnostic()
        }
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()?;
            Ok(input)
        }
    }
}

fn parse_style(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {arg:?}"))?;
    if ThemeKey::from_name(key).is_none() {
        let known: Vec<&str> = ThemeKey::ALL.iter().map(|k| k.name()).collect();
        return Err(format!("unknown theme key {key:?} (known: {})", known.join(", ")));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_style() {
        assert_eq!(
            parse_style("linkColor=#c00"),
            Ok(("linkColor".to_owned(), "#c00".to_owned()))
        );
        assert_eq!(
            parse_style("fontFamily=a=b"),
            Ok(("fontFamily".to_owned(), "a=b".to_owned()))
        );
        assert!(parse_style("linkColor").is_err());
        assert!(parse_style("colour=red").unwrap_err().contains("linkColor"));
    }

    #[tokio::test]
    async fn test_config_init_writes_loadable_file() {
        let dir = std::env::temp_dir().join(format!("quire-config-init-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        let written = init_config(Some(path.clone()), Some("http://docs.test/graphql".into()), false)
            .await
            .unwrap();
        assert_eq!(written, path);

        let config = Config::load(&FileStore::new(&path)).await.unwrap();
        assert_eq!(config.endpoint, "http://docs.test/graphql");
        assert_eq!(config.autosave_quiet_ms, 650);

        let err = init_config(Some(path.clone()), None, false).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        init_config(Some(path.clone()), None, true).await.unwrap();
        let config = Config::load(&FileStore::new(&path)).await.unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cli_parses_config_init() {
        let cli = Cli::try_parse_from(["quire", "config", "init", "--force", "--config", "q.json"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("q.json")));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Init { force: true })
        ));
    }

    #[test]
    fn test_cli_parses_snippet_add() {
        let cli = Cli::try_parse_from(["quire", "-v", "snippet", "add", "notes", "card.html", "--insert"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Snippet(SnippetCommand::Add {
                document_key,
                file,
                name,
                insert,
            }) => {
                assert_eq!(document_key, "notes");
                assert_eq!(file.as_deref(), Some(Path::new("card.html")));
                assert_eq!(name, None);
                assert!(insert);
            }
            _ => panic!("expected snippet add"),
        }
    }
}
