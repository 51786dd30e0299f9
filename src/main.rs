use anyhow::{Context, Result, bail};
use appgrid::config::{self, Config};
use appgrid::desktop::ParserConfig;
use appgrid::entries::{EntriesManager, EntryHandle, EntryTable, NullSink, PresentationSink};
use appgrid::matcher::FuzzyMatcher;
use appgrid::model::{Entry, FavoriteEntry};
use appgrid::stats::{self, StatsStore};
use appgrid::watcher::{self, DirectoryWatcher};
use calloop::EventLoop;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Colon-separated list of directories to read .desktop files from
    #[arg(short, long)]
    dirs: Option<String>,

    /// Language used for localized names and comments
    #[arg(short, long)]
    lang: Option<String>,

    /// Command prepended to entries that run in a terminal
    #[arg(short, long)]
    term: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the entries in grid order
    List {
        /// Only show entries matching this query
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Load entries and follow changes on disk
    Watch,
    /// Count a launch of the entry
    Click { id: String },
    /// Pin the entry
    Pin { id: String },
    /// Unpin the entry
    Unpin { id: String },
}

/// Logs every table mutation.
struct LogSink;

impl PresentationSink for LogSink {
    fn on_insert(&mut self, _: EntryHandle, entry: &Entry) {
        info!("+ {} ({})", entry.desktop_id, entry.record.name);
    }
    fn on_update(&mut self, _: EntryHandle, _: EntryHandle, entry: &Entry) {
        info!("~ {} ({})", entry.desktop_id, entry.record.name);
    }
    fn on_erase(&mut self, _: EntryHandle, entry: &Entry) {
        info!("- {} ({})", entry.desktop_id, entry.record.name);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // 1. Load Config
    let config = config::load_config().context("loading config")?;

    let dirs = search_dirs(&args, &config);
    let lang = config::detect_lang(args.lang.as_deref().or(config.general.lang.as_deref()));
    let term = config::detect_terminal(args.term.as_deref().or(config.general.terminal.as_deref()));
    info!("lang={}, term='{}', {} search dirs", lang, term, dirs.len());

    let stats_dir = stats::default_dir().context("no cache directory")?;
    let mut store = StatsStore::open(&stats_dir);

    match args.command {
        Command::List { query } => {
            let manager = load(&dirs, &lang, &term, &config, &store, NullSink);
            print_entries(&manager, query.as_deref());
        }
        Command::Watch => watch(&dirs, &lang, &term, &config, &store, &stats_dir)?,
        Command::Click { id } => {
            ensure_known(&load(&dirs, &lang, &term, &config, &store, NullSink), &id)?;
            let clicks = store.click(&id);
            store.save()?;
            println!("{id}: {clicks}");
        }
        Command::Pin { id } => {
            ensure_known(&load(&dirs, &lang, &term, &config, &store, NullSink), &id)?;
            if !store.pin(&id) {
                bail!("'{id}' is already pinned");
            }
            store.save()?;
        }
        Command::Unpin { id } => {
            if !store.unpin(&id) {
                bail!("'{id}' is not pinned");
            }
            store.save()?;
        }
    }
    Ok(())
}

fn search_dirs(args: &Args, config: &Config) -> Vec<PathBuf> {
    if let Some(spec) = &args.dirs {
        return config::custom_dirs(spec);
    }
    match &config.general.dirs {
        Some(dirs) => config::dedup_dirs(dirs.clone()),
        None => config::app_dirs(),
    }
}

fn load<S: PresentationSink>(
    dirs: &[PathBuf],
    lang: &str,
    term: &str,
    config: &Config,
    store: &StatsStore,
    sink: S,
) -> EntriesManager<S> {
    let (pins, favs) = snapshots(config, store);
    let table = EntryTable::new(sink, pins, favs);
    let mut manager = EntriesManager::new(table, ParserConfig::new(lang, term));
    manager.scan(dirs);
    manager
}

fn snapshots(config: &Config, store: &StatsStore) -> (Vec<String>, Vec<FavoriteEntry>) {
    let pins = if config.general.pins { store.pinned().to_vec() } else { Vec::new() };
    let favs = if config.general.favorites {
        store.favorites(config.general.columns)
    } else {
        Vec::new()
    };
    (pins, favs)
}

fn ensure_known(manager: &EntriesManager, id: &str) -> Result<()> {
    if manager.table().find(id).is_none() {
        bail!("no entry with id '{id}'");
    }
    Ok(())
}

fn print_entries<S: PresentationSink>(manager: &EntriesManager<S>, query: Option<&str>) {
    let rows = match query {
        Some(query) => FuzzyMatcher::new().rank(query, manager.table()),
        None => manager.table().sorted(),
    };
    for (_, entry) in rows {
        println!("{}\t{}\t{}", entry.desktop_id, entry.record.name, entry.record.exec);
    }
}

fn watch(
    dirs: &[PathBuf],
    lang: &str,
    term: &str,
    config: &Config,
    store: &StatsStore,
    stats_dir: &Path,
) -> Result<()> {
    let mut event_loop: EventLoop<EntriesManager<LogSink>> = EventLoop::try_new()?;

    // Subscribe before scanning so nothing written meanwhile is lost;
    // the notifications queue until the loop runs.
    let (tx, rx) = calloop::channel::channel();
    let watchers = DirectoryWatcher::spawn(dirs, &tx);
    for dir in watchers.degraded() {
        warn!("{:?} will not be updated live", dir);
    }
    watcher::attach(&event_loop.handle(), rx)?;

    // `appgrid click`/`pin` from another shell land here
    fs::create_dir_all(stats_dir)?;
    let (stats_tx, stats_rx) = calloop::channel::channel();
    let _stats_watcher = match watcher::watch_stats(stats_dir, stats_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("{e}; statistics will not be reloaded");
            None
        }
    };
    let (reload_dir, reload_config) = (stats_dir.to_path_buf(), config.clone());
    watcher::attach_stats(&event_loop.handle(), stats_rx, move |manager| {
        let store = StatsStore::open(&reload_dir);
        let (pins, favs) = snapshots(&reload_config, &store);
        manager.table_mut().set_snapshots(pins, favs);
    })?;

    let mut manager = load(dirs, lang, term, config, store, LogSink);
    info!("Watching {} directories", watchers.live_count());

    loop {
        event_loop.dispatch(None, &mut manager)?;
    }
}
