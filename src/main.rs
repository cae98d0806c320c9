use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use readwise_sync::client::blocking::ReadwiseClient;
use readwise_sync::client::{BookQuery, DocumentQuery, HighlightQuery};
use readwise_sync::config::{self, Config};
use readwise_sync::model::{BookCategory, Highlight};
use readwise_sync::workflows::{
    truncate_str, DigestBuilder, DigestFormat, DigestGrouping, DigestOptions, ReadingInbox,
    TagPattern, TagWorkflow,
};
use readwise_sync::{BackgroundPoller, SyncManager, SyncResult};

/// Rows shown before a listing is cut short with "... and N more".
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "readwise-sync", author, version, about = "Readwise SDK CLI")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Path to YAML config file (defaults to ./config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Readwise access token; overrides the config file and READWISE_API_KEY
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version
    Version,
    /// Highlights (v2 API)
    #[command(subcommand)]
    Highlights(HighlightsCommand),
    /// Books (v2 API)
    #[command(subcommand)]
    Books(BooksCommand),
    /// Reader documents (v3 API)
    #[command(subcommand)]
    Reader(ReaderCommand),
    /// Sync highlights, books and documents
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Highlight digests
    #[command(subcommand)]
    Digest(DigestCommand),
    /// Tag maintenance
    #[command(subcommand)]
    Tags(TagsCommand),
    /// Poll for new highlights and documents
    Poll(PollArgs),
}

#[derive(Debug, Subcommand)]
enum HighlightsCommand {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: u64,
    },
    Export {
        #[arg(long, default_value = "markdown")]
        format: DigestFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum BooksCommand {
    List {
        #[arg(long, value_parser = parse_category)]
        category: Option<BookCategory>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: u64,
    },
}

#[derive(Debug, Subcommand)]
enum ReaderCommand {
    Inbox {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    Save {
        url: String,
    },
    Archive {
        id: String,
    },
    Stats,
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    Full(StateFileArg),
    Incremental(StateFileArg),
}

#[derive(Debug, Args)]
struct StateFileArg {
    /// Where sync progress is kept (defaults to sync.state_file)
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum DigestCommand {
    Daily(DigestArgs),
    Weekly(DigestArgs),
    Book {
        id: u64,
        #[command(flatten)]
        args: DigestArgs,
    },
}

#[derive(Debug, Args)]
struct DigestArgs {
    #[arg(long, default_value = "markdown")]
    format: DigestFormat,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum TagsCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Report {
        #[arg(long)]
        json: bool,
    },
    Untagged {
        #[arg(long)]
        json: bool,
    },
    /// Highlights carrying a tag whose name contains QUERY
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    AutoTag {
        #[arg(long)]
        pattern: String,
        #[arg(long)]
        tag: String,
        #[arg(long)]
        apply: bool,
    },
    Rename {
        old: String,
        new: String,
        #[arg(long)]
        apply: bool,
    },
    /// Merge a comma-separated list of tags into one
    Merge {
        sources: String,
        #[arg(long)]
        into: String,
        #[arg(long)]
        apply: bool,
    },
    Delete {
        name: String,
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Debug, Args)]
struct PollArgs {
    /// Seconds between polls (defaults to poller.poll_interval_seconds)
    #[arg(long)]
    interval: Option<u64>,
    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
    #[arg(long)]
    state_file: Option<PathBuf>,
}

fn parse_category(value: &str) -> Result<BookCategory, String> {
    BookCategory::parse(value).ok_or_else(|| {
        format!("unknown category '{value}' (books, articles, tweets, supplementals, podcasts)")
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    if let Command::Version = cli.command {
        println!("readwise-sync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = load_config(&cli)?;
    let client = ReadwiseClient::with_options(cfg.client_options()?)
        .context("building Readwise client")?;

    match cli.command {
        Command::Version => Ok(()),
        Command::Highlights(cmd) => highlights(&client, cmd),
        Command::Books(cmd) => books(&client, cmd),
        Command::Reader(cmd) => reader(&client, cmd),
        Command::Sync(cmd) => sync(&client, &cfg, cmd),
        Command::Digest(cmd) => digest(&client, cmd),
        Command::Tags(cmd) => tags(&client, cmd),
        Command::Poll(args) => poll(client, &cfg, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => {
            config::read(Some(path)).with_context(|| format!("reading {}", path.display()))?
        }
        None if Path::new("config.yaml").exists() => {
            config::read(None).context("reading config.yaml")?
        }
        None => Config::default(),
    };
    cfg.apply_env();
    if let Some(token) = &cli.token {
        cfg.readwise.token = token.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_or_print(
    content: &str,
    output: Option<&Path>,
    saved: impl FnOnce(&Path) -> String,
) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
            println!("{}", saved(path));
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn short(value: &str, max: usize) -> String {
    truncate_str(&value.replace('\n', " "), max).0
}

fn highlights(client: &ReadwiseClient, cmd: HighlightsCommand) -> Result<()> {
    match cmd {
        HighlightsCommand::List { limit, json } => {
            let items: Vec<Highlight> = client
                .list_highlights(HighlightQuery::default())
                .take(limit)
                .collect::<readwise_sync::Result<_>>()?;
            if json {
                let rows: Vec<_> = items
                    .iter()
                    .map(|h| {
                        json!({
                            "id": h.id,
                            "text": short(&h.text, 80),
                            "note": h.note,
                            "book_id": h.book_id,
                            "highlighted_at": h.highlighted_at,
                            "tags": h.tags.iter().map(|t| &t.name).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                return print_json(&rows);
            }
            for h in &items {
                println!("{:>10}  {}", h.id, short(&h.text, 60));
            }
            println!("{} shown", items.len());
        }
        HighlightsCommand::Show { id } => {
            let h = client.get_highlight(id)?;
            println!("Highlight {}", h.id);
            println!();
            println!("{}", h.text);
            println!();
            if let Some(note) = h.note.as_deref().filter(|n| !n.is_empty()) {
                println!("Note: {note}");
            }
            if let Some(location) = h.location {
                println!("Location: {location}");
            }
            if let Some(book_id) = h.book_id {
                println!("Book ID: {book_id}");
            }
            if let Some(at) = h.highlighted_at {
                println!("Highlighted: {}", at.format("%Y-%m-%d %H:%M"));
            }
            if !h.tags.is_empty() {
                let names: Vec<_> = h.tags.iter().map(|t| t.name.as_str()).collect();
                println!("Tags: {}", names.join(", "));
            }
        }
        HighlightsCommand::Export { format, output } => {
            let content = DigestBuilder::new(client).create_custom_digest(&DigestOptions {
                title: "Highlights Export".into(),
                grouping: DigestGrouping::Book,
                format,
                ..Default::default()
            })?;
            write_or_print(&content, output.as_deref(), |p| {
                format!("Exported to {}", p.display())
            })?;
        }
    }
    Ok(())
}

fn books(client: &ReadwiseClient, cmd: BooksCommand) -> Result<()> {
    match cmd {
        BooksCommand::List {
            category,
            limit,
            json,
        } => {
            let query = BookQuery {
                category,
                ..Default::default()
            };
            let items: Vec<_> = client
                .list_books(query)
                .take(limit)
                .collect::<readwise_sync::Result<_>>()?;
            if json {
                let rows: Vec<_> = items
                    .iter()
                    .map(|b| {
                        json!({
                            "id": b.id,
                            "title": b.title,
                            "author": b.author,
                            "category": b.category,
                            "highlights": b.num_highlights,
                        })
                    })
                    .collect();
                return print_json(&rows);
            }
            for b in &items {
                println!(
                    "{:>10}  {:<60}  {:<24}  {:>5}",
                    b.id,
                    short(&b.title, 60),
                    short(b.author.as_deref().unwrap_or(""), 24),
                    b.num_highlights
                );
            }
            println!("{} shown", items.len());
        }
        BooksCommand::Show { id } => {
            let book = client.get_book(id)?;
            println!("{}", book.title);
            if let Some(author) = &book.author {
                println!("Author: {author}");
            }
            if let Some(category) = book.category {
                println!("Category: {category}");
            }
            if let Some(source) = &book.source {
                println!("Source: {source}");
            }
            println!("Highlights: {}", book.num_highlights);
            let highlights: Vec<Highlight> = client
                .list_highlights(HighlightQuery::for_book(id))
                .take(PREVIEW_ROWS)
                .collect::<readwise_sync::Result<_>>()?;
            if !highlights.is_empty() {
                println!();
                for h in &highlights {
                    println!("  - {}", short(&h.text, 80));
                }
            }
        }
    }
    Ok(())
}

fn reader(client: &ReadwiseClient, cmd: ReaderCommand) -> Result<()> {
    match cmd {
        ReaderCommand::Inbox { limit, json } => {
            let docs: Vec<_> = client
                .list_documents(DocumentQuery::inbox())
                .take(limit)
                .collect::<readwise_sync::Result<_>>()?;
            if json {
                let rows: Vec<_> = docs
                    .iter()
                    .map(|d| {
                        json!({
                            "id": d.id,
                            "title": d.title,
                            "url": d.url,
                            "category": d.category,
                            "location": d.location,
                            "created_at": d.created_at,
                        })
                    })
                    .collect();
                return print_json(&rows);
            }
            for d in &docs {
                let category = d.category.map(|c| c.as_str()).unwrap_or("-");
                println!(
                    "{:<26}  {:<8}  {}",
                    d.id,
                    category,
                    short(d.title.as_deref().unwrap_or("(untitled)"), 60)
                );
            }
            println!("{} shown", docs.len());
        }
        ReaderCommand::Save { url } => {
            let saved = client.save_url(&url)?;
            println!("Saved {} ({})", saved.url, saved.id);
        }
        ReaderCommand::Archive { id } => {
            client.archive(&id)?;
            println!("Archived {id}");
        }
        ReaderCommand::Stats => {
            let stats = ReadingInbox::new(client).get_queue_stats()?;
            println!("Inbox: {}", stats.inbox_count);
            println!("Reading list: {}", stats.reading_list_count);
            println!("Total unread: {}", stats.total_unread);
            if stats.total_unread > 0 {
                println!("Older than 7 days: {}", stats.items_older_than_7_days);
                println!("Older than 30 days: {}", stats.items_older_than_30_days);
            }
            if !stats.by_category.is_empty() {
                println!();
                println!("By category:");
                for (category, count) in &stats.by_category {
                    println!("  {category:<12} {count:>5}");
                }
            }
        }
    }
    Ok(())
}

fn sync(client: &ReadwiseClient, cfg: &Config, cmd: SyncCommand) -> Result<()> {
    let (full, state_file) = match cmd {
        SyncCommand::Full(arg) => (true, arg.state_file),
        SyncCommand::Incremental(arg) => (false, arg.state_file),
    };
    let state_file = state_file.or_else(|| cfg.sync.state_file.clone());
    let mut manager = match &state_file {
        Some(path) => SyncManager::with_state_file(client, path),
        None => SyncManager::new(client),
    };

    let result = if full {
        manager.full_sync()?
    } else {
        manager.incremental_sync()?
    };

    let (highlights, books, documents) = if full {
        ("Highlights", "Books", "Documents")
    } else {
        ("New highlights", "New books", "New documents")
    };
    println!("Sync complete");
    println!("{highlights}: {}", result.highlights.len());
    println!("{books}: {}", result.books.len());
    println!("{documents}: {}", result.documents.len());
    println!("Total syncs: {}", manager.state().total_syncs);
    Ok(())
}

fn digest(client: &ReadwiseClient, cmd: DigestCommand) -> Result<()> {
    let builder = DigestBuilder::new(client);
    let (content, args, kind) = match cmd {
        DigestCommand::Daily(args) => (builder.create_daily_digest(args.format)?, args, "daily"),
        DigestCommand::Weekly(args) => (builder.create_weekly_digest(args.format)?, args, "weekly"),
        DigestCommand::Book { id, args } => {
            (builder.create_book_digest(id, args.format)?, args, "book")
        }
    };
    write_or_print(&content, args.output.as_deref(), |p| {
        format!("Saved {kind} digest to {}", p.display())
    })
}

/// Summary for a tag edit: what matched, and how to make it stick.
fn report_affected(ids: &[u64], verb: &str, apply: bool) {
    if ids.is_empty() {
        println!("No highlights found");
        return;
    }
    if apply {
        println!("{} highlights {verb}", ids.len());
    } else {
        println!("DRY RUN: {} highlights would be {verb}", ids.len());
    }
    print_preview(ids.iter().map(|id| format!("  {id}")));
    if !apply {
        println!("Nothing was changed; re-run with --apply to make the changes.");
    }
}

fn print_preview(lines: impl ExactSizeIterator<Item = String>) {
    let total = lines.len();
    for line in lines.take(PREVIEW_ROWS) {
        println!("{line}");
    }
    if total > PREVIEW_ROWS {
        println!("  ... and {} more", total - PREVIEW_ROWS);
    }
}

fn tags(client: &ReadwiseClient, cmd: TagsCommand) -> Result<()> {
    let workflow = TagWorkflow::new(client);
    match cmd {
        TagsCommand::List { json } => {
            let report = workflow.get_tag_report()?;
            if json {
                return print_json(&json!({
                    "total_tags": report.total_tags,
                    "total_usages": report.total_usages,
                    "tags": report.tags_by_usage,
                }));
            }
            for usage in &report.tags_by_usage {
                println!("{:<40} {:>5}", usage.name, usage.count);
            }
            println!("{} tags", report.total_tags);
            if !report.duplicate_candidates.is_empty() {
                println!();
                println!("Potential duplicates:");
                for group in &report.duplicate_candidates {
                    println!("  {}", group.join(", "));
                }
            }
        }
        TagsCommand::Report { json } => {
            let report = workflow.get_tag_report()?;
            let top: Vec<_> = report.tags_by_usage.iter().take(PREVIEW_ROWS).collect();
            if json {
                return print_json(&json!({
                    "summary": {
                        "total_tags": report.total_tags,
                        "total_usages": report.total_usages,
                    },
                    "top_tags": top,
                    "duplicate_candidates": report.duplicate_candidates,
                }));
            }
            println!("Tag Report");
            println!("Total Tags: {}", report.total_tags);
            println!("Total Usages: {}", report.total_usages);
            if !top.is_empty() {
                println!();
                println!("Top tags:");
                for usage in top {
                    println!("  {:<40} {:>5}", usage.name, usage.count);
                }
            }
        }
        TagsCommand::Untagged { json } => {
            let items = workflow.get_untagged_highlights()?;
            print_highlights(&items, json)?;
        }
        TagsCommand::Search { query, json } => {
            let names = workflow.search_tags(&query)?;
            let items: Vec<Highlight> = client
                .list_highlights(HighlightQuery::default())
                .filter(|h| match h {
                    Ok(h) => h.tags.iter().any(|t| names.contains(&t.name)),
                    Err(_) => true,
                })
                .collect::<readwise_sync::Result<_>>()?;
            print_highlights(&items, json)?;
        }
        TagsCommand::AutoTag {
            pattern,
            tag,
            apply,
        } => {
            let pattern = TagPattern::new(&pattern, tag)
                .with_context(|| format!("invalid pattern {pattern:?}"))?;
            let planned = workflow.auto_tag_highlights(&[pattern], !apply)?;
            if planned.is_empty() {
                println!("No highlights matched");
                return Ok(());
            }
            let ids: Vec<u64> = planned.keys().copied().collect();
            report_affected(&ids, "tagged", apply);
        }
        TagsCommand::Rename { old, new, apply } => {
            let ids = workflow.rename_tag(&old, &new, !apply)?;
            report_affected(&ids, &format!("renamed from '{old}' to '{new}'"), apply);
        }
        TagsCommand::Merge {
            sources,
            into,
            apply,
        } => {
            let sources: Vec<&str> = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if sources.is_empty() {
                bail!("no source tags given");
            }
            let ids = workflow.merge_tags(&sources, &into, !apply)?;
            report_affected(&ids, &format!("merged into '{into}'"), apply);
        }
        TagsCommand::Delete { name, apply } => {
            let ids = workflow.delete_tag(&name, !apply)?;
            report_affected(&ids, &format!("untagged from '{name}'"), apply);
        }
    }
    Ok(())
}

fn print_highlights(items: &[Highlight], json: bool) -> Result<()> {
    if json {
        let rows: Vec<_> = items
            .iter()
            .map(|h| {
                json!({
                    "id": h.id,
                    "text": short(&h.text, 80),
                    "tags": h.tags.iter().map(|t| &t.name).collect::<Vec<_>>(),
                })
            })
            .collect();
        return print_json(&rows);
    }
    for h in items {
        println!("{:>10}  {}", h.id, short(&h.text, 60));
    }
    println!("{} shown", items.len());
    Ok(())
}

fn poll(client: ReadwiseClient, cfg: &Config, args: PollArgs) -> Result<()> {
    let mut poller_cfg = cfg.poller_config();
    if let Some(secs) = args.interval {
        if secs == 0 {
            bail!("--interval must be > 0");
        }
        poller_cfg.poll_interval = Duration::from_secs(secs);
        poller_cfg.max_backoff = poller_cfg.max_backoff.max(poller_cfg.poll_interval);
    }
    if args.state_file.is_some() {
        poller_cfg.state_file = args.state_file;
    }

    let mut poller = BackgroundPoller::new(client, poller_cfg);
    if args.once {
        let result = poller.poll_once()?;
        print_poll(&result);
        return Ok(());
    }

    poller.on_sync(|result| {
        print_poll(result);
        Ok(())
    });
    poller.on_error(|err| {
        warn!(error = %err, "poll failed");
        Ok(())
    });
    poller.stop_signal().trip_on_ctrl_c()?;
    info!("polling, press Ctrl-C to stop");
    poller.start();
    Ok(())
}

fn print_poll(result: &SyncResult) {
    println!(
        "{}  new highlights: {}, new documents: {}",
        result.synced_at.format("%Y-%m-%d %H:%M:%S"),
        result.highlights.len(),
        result.documents.len()
    );
}
