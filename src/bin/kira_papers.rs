use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use crossterm::style::Stylize;
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use kira_papers::app::{App, SearchOptions, SearchOutcome, SearchResult, SynthesisReport};
use kira_papers::cache::{DEFAULT_CAPACITY, RecordCache};
use kira_papers::config::{Settings, SettingsLoader, SettingsUpdate, validate_prompt, validate_retmax};
use kira_papers::domain::Query;
use kira_papers::error::KiraError;
use kira_papers::eutils::EutilsHttpClient;
use kira_papers::output::{JsonOutput, OutputMode, render_digest};
use kira_papers::progress::TerminalProgress;
use kira_papers::store::Store;
use kira_papers::summarize::OpenAiClient;

#[derive(Parser)]
#[command(name = "kira-papers")]
#[command(about = "Recent PubMed papers by topic, with cached abstracts and an optional LLM synthesis")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search PubMed for a topic and summarize the results")]
    Search(SearchArgs),
    #[command(about = "Show, change or reset persisted settings")]
    Settings(SettingsArgs),
    #[command(about = "Inspect or clear the local abstract cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[arg(required = true, num_args = 1..)]
    topic: Vec<String>,

    #[arg(long, help = "Number of papers to retrieve (overrides settings)")]
    limit: Option<u32>,

    #[arg(long, help = "Skip the LLM synthesis step")]
    no_summary: bool,

    #[arg(long, help = "Prompt template containing {topic} (overrides settings)")]
    prompt: Option<String>,

    #[arg(long, help = "OpenAI API key for this invocation only")]
    api_key: Option<String>,

    #[arg(long, help = "Print the result as JSON")]
    json: bool,
}

#[derive(Args)]
struct SettingsArgs {
    #[command(subcommand)]
    command: SettingsCommand,
}

#[derive(Subcommand)]
enum SettingsCommand {
    #[command(about = "Print current settings (API key masked)")]
    Show,
    #[command(about = "Persist one or more settings")]
    Set(SetArgs),
    #[command(about = "Restore default settings")]
    Reset,
}

#[derive(Args)]
struct SetArgs {
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    retmax: Option<u32>,

    #[arg(long)]
    prompt: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, help = "URL prefix for abstract requests, e.g. https://corsproxy.io/?")]
    proxy: Option<String>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "List cached papers, oldest first")]
    List,
    #[command(about = "Remove every cached paper")]
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidQuery(_)
        | KiraError::InvalidPmid(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidSetting { .. } => 2,
        KiraError::SearchHttp(_)
        | KiraError::SearchStatus { .. }
        | KiraError::SearchParse(_)
        | KiraError::SummaryHttp(_)
        | KiraError::SummaryStatus { .. }
        | KiraError::SummaryParse(_) => 3,
        _ => 1,
    }
}

async fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::new().into_diagnostic()?;

    match cli.command {
        Commands::Search(args) => run_search(args, store, output_mode).await,
        Commands::Settings(args) => run_settings(args.command, &store),
        Commands::Cache(args) => run_cache(args.command, &store, output_mode),
    }
}

async fn run_search(args: SearchArgs, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let SearchArgs {
        topic,
        limit,
        no_summary,
        prompt,
        api_key,
        json,
    } = args;

    let query = topic.join(" ").parse::<Query>()?;
    let settings = SettingsLoader::load(&store)?;
    let options = build_search_options(&settings, limit, prompt, api_key, no_summary)?;

    let mut cache = RecordCache::load(&store.cache_path(), DEFAULT_CAPACITY);
    let pubmed = EutilsHttpClient::new(settings.detail_proxy.clone())?;
    let completion = OpenAiClient::new(settings.completion_endpoint.clone())?;
    let app = App::new(pubmed, completion);

    let mode = if json { OutputMode::NonInteractive } else { output_mode };
    match mode {
        OutputMode::NonInteractive => {
            let outcome = app.search(&query, &options, &mut cache, &JsonOutput).await?;
            JsonOutput::print_search(&outcome).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let progress = TerminalProgress::new();
            let outcome = app.search(&query, &options, &mut cache, &progress).await;
            progress.finish();
            print_search_report(&outcome?);
        }
    }
    Ok(())
}

fn build_search_options(
    settings: &Settings,
    limit: Option<u32>,
    prompt: Option<String>,
    api_key: Option<String>,
    no_summary: bool,
) -> Result<SearchOptions, KiraError> {
    let mut options = SearchOptions::from_settings(settings);
    if let Some(limit) = limit {
        validate_retmax(limit)?;
        options.limit = limit;
    }
    if let Some(prompt) = prompt {
        validate_prompt(&prompt)?;
        options.prompt = prompt;
    }
    if let Some(key) = api_key {
        options.api_key = Some(key.trim().to_string());
    }
    options.summarize = !no_summary;
    Ok(options)
}

fn print_search_report(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::NoResults { .. } => {
            println!("{}", "No recent papers found for this topic on PubMed.".yellow());
        }
        SearchOutcome::Found(result) => print_found(result),
    }
}

fn print_found(result: &SearchResult) {
    println!(
        "{}",
        format!("Recent PubMed Papers for \"{}\":", result.query)
            .bold()
            .cyan()
    );
    println!(
        "{}",
        format!(
            "{} papers, {} served from cache",
            result.papers.len(),
            result.cache_hits
        )
        .dim()
    );
    println!();
    print!("{}", render_digest(&result.papers));
    println!();

    match &result.synthesis {
        SynthesisReport::Skipped => {}
        SynthesisReport::NoCredential => println!(
            "{}",
            "No OpenAI API key configured (expected an sk- key); run `kira-papers settings set --api-key <KEY>` to enable summaries."
                .yellow()
        ),
        SynthesisReport::Completed { text } => {
            println!("{}", "Summary".bold().green());
            println!("{text}");
        }
        SynthesisReport::Failed { message } => println!(
            "{}",
            format!("Error fetching summary from OpenAI: {message}").red()
        ),
    }
}

#[derive(Serialize)]
struct SettingsView {
    openai_api_key: Option<String>,
    retmax: u32,
    prompt: String,
    model: String,
    detail_proxy: Option<String>,
    completion_endpoint: String,
}

impl From<&Settings> for SettingsView {
    fn from(settings: &Settings) -> Self {
        Self {
            openai_api_key: settings.openai_api_key.as_deref().map(mask_key),
            retmax: settings.retmax,
            prompt: settings.prompt.clone(),
            model: settings.model.clone(),
            detail_proxy: settings.detail_proxy.clone(),
            completion_endpoint: settings.completion_endpoint.clone(),
        }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn run_settings(command: SettingsCommand, store: &Store) -> miette::Result<()> {
    let settings = match command {
        SettingsCommand::Show => SettingsLoader::load(store)?,
        SettingsCommand::Set(args) => {
            let mut settings = SettingsLoader::load(store)?;
            settings.apply(SettingsUpdate {
                openai_api_key: args.api_key,
                retmax: args.retmax,
                prompt: args.prompt,
                model: args.model,
                detail_proxy: args.proxy,
            })?;
            SettingsLoader::save(store, &settings)?;
            settings
        }
        SettingsCommand::Reset => SettingsLoader::reset(store)?,
    };
    JsonOutput::print_json(&SettingsView::from(&settings)).into_diagnostic()?;
    Ok(())
}

fn run_cache(command: CacheCommand, store: &Store, output_mode: OutputMode) -> miette::Result<()> {
    let mut cache = RecordCache::load(&store.cache_path(), DEFAULT_CAPACITY);
    match command {
        CacheCommand::List => match output_mode {
            OutputMode::NonInteractive => {
                let papers: Vec<_> = cache.iter().collect();
                JsonOutput::print_json(&papers).into_diagnostic()?;
            }
            OutputMode::Interactive => {
                println!(
                    "{}",
                    format!("{} / {} cached papers", cache.len(), cache.capacity())
                        .bold()
                        .cyan()
                );
                for paper in cache.iter() {
                    let date = if paper.pub_date.is_empty() {
                        "----/--/--"
                    } else {
                        paper.pub_date.as_str()
                    };
                    println!("{:>10}  {date:<10}  {}", paper.id, paper.title);
                }
            }
        },
        CacheCommand::Clear => {
            let removed = cache.len();
            cache.clear();
            cache.save()?;
            println!("{}", format!("Removed {removed} cached papers").green());
        }
    }
    Ok(())
}
