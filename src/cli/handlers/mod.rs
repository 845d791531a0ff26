use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::persistence::TaskRepository;
use crate::io::recovery::{self, atomic_write, recovery_log_path};
use crate::io::storage::FileStorage;
use crate::model::task::{Priority, SortBy, SubtaskPatch, Task, TaskDraft, TaskFilter, TaskPatch};
use crate::ops::query::{MatchField, SearchMatcher, derive_view};
use crate::ops::task_ops::{self, TaskError};
use crate::store::TaskStore;
use crate::util::unicode::is_blank;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Environment variable naming the data directory when -C is not given
pub const DATA_DIR_ENV: &str = "TASKPAD_DIR";

/// Data directory used when neither -C nor the environment names one
pub const DEFAULT_DATA_DIR: &str = ".taskpad";

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let dir = resolve_data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        // Read commands
        Commands::List(args) => cmd_list(&dir, args, json),
        Commands::Show(args) => cmd_show(&dir, args, json),
        Commands::Stats => cmd_stats(&dir, json),
        Commands::Export(args) => cmd_export(&dir, args),
        Commands::Recovery(args) => cmd_recovery(&dir, args, json),

        // Write commands
        Commands::Add(args) => cmd_add(&dir, args, json),
        Commands::Toggle(args) => cmd_toggle(&dir, args, json),
        Commands::Edit(args) => cmd_edit(&dir, args),
        Commands::Rm(args) => cmd_rm(&dir, args),
        Commands::Mv(args) => cmd_mv(&dir, args),
        Commands::Sub(args) => cmd_sub(&dir, args, json),
        Commands::Done(args) => cmd_set_completed(&dir, args, true, json),
        Commands::Undone(args) => cmd_set_completed(&dir, args, false, json),
        Commands::ClearDone => cmd_clear_done(&dir, json),
        Commands::Import(args) => cmd_import(&dir, args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// -C wins, then `$TASKPAD_DIR`, then `./.taskpad`.
pub fn resolve_data_dir(override_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = match override_dir {
        Some(dir) => PathBuf::from(dir),
        None => match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()
                .map_err(|e| format!("cannot read current directory: {}", e))?
                .join(DEFAULT_DATA_DIR),
        },
    };
    if dir.exists() && !dir.is_dir() {
        return Err(format!("data directory '{}' is not a directory", dir.display()).into());
    }
    Ok(dir)
}

fn open_store(dir: &Path) -> Result<TaskStore, Box<dyn std::error::Error>> {
    let config = config_io::read_config(dir)?;
    let repo = TaskRepository::new(FileStorage::new(dir), config.storage.keys())
        .with_recovery_dir(dir);
    if dir.is_dir() && repo.needs_migration() {
        repo.migrate();
    }
    Ok(TaskStore::open(repo, &config))
}

/// Fail loudly when the last write stayed in memory only: the process is
/// about to exit and would lose it.
fn ensure_saved(store: &TaskStore) -> CmdResult {
    if store.is_persisted() {
        Ok(())
    } else {
        Err("could not save tasks (a copy was written to the recovery log, see `tp recovery`)".into())
    }
}

fn resolve(store: &TaskStore, prefix: &str) -> Result<String, TaskError> {
    task_ops::resolve_id(store.tasks(), prefix).map(str::to_string)
}

fn resolve_subtask(store: &TaskStore, task_id: &str, prefix: &str) -> Result<String, TaskError> {
    let task = task_ops::find_task(store.tasks(), task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
    task_ops::resolve_subtask_id(task, prefix).map(str::to_string)
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority '{}' (expected: low, medium, high)", s))
}

fn parse_filter(s: &str) -> Result<TaskFilter, String> {
    TaskFilter::parse(s).ok_or_else(|| format!("unknown filter '{}' (expected: all, active, done)", s))
}

fn parse_sort(s: &str) -> Result<SortBy, String> {
    SortBy::parse(s)
        .ok_or_else(|| format!("unknown sort '{}' (expected: priority, updated, created)", s))
}

fn filter_name(filter: TaskFilter) -> &'static str {
    match filter {
        TaskFilter::All => "all",
        TaskFilter::Active => "active",
        TaskFilter::Done => "done",
    }
}

fn sort_name(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Priority => "priority",
        SortBy::Updated => "updated",
        SortBy::Created => "created",
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn print_changed(count: usize, verb: &str, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(&ChangedJson { changed: count })?);
    } else {
        let noun = if count == 1 { "task" } else { "tasks" };
        println!("{} {} {}", verb, count, noun);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(dir: &Path, args: ListArgs, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;

    if args.stored {
        if json {
            let tasks: Vec<TaskJson> = store.tasks().iter().map(task_to_json).collect();
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        } else {
            print_lines(format_positioned_lines(store.tasks()));
        }
        return Ok(());
    }

    let view = store.view().clone();
    let filter = args.filter.as_deref().map(parse_filter).transpose()?.unwrap_or(view.filter);
    let sort_by = args.sort.as_deref().map(parse_sort).transpose()?.unwrap_or(view.sort_by);
    let search = args.search.unwrap_or(view.search_query);

    if args.save {
        store.set_filter(filter);
        store.set_sort_by(sort_by);
        store.set_search_query(&search);
    }

    let tasks = derive_view(store.tasks(), filter, &search, sort_by);
    if json {
        let matcher = SearchMatcher::new(&search);
        let out = TaskListJson {
            filter: filter_name(filter).to_string(),
            sort: sort_name(sort_by).to_string(),
            search,
            tasks: tasks.iter().map(|t| searched_task_json(t, matcher.as_ref())).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_lines(tasks.iter().map(format_task_line).collect());
    }
    Ok(())
}

fn searched_task_json(task: &Task, matcher: Option<&SearchMatcher>) -> TaskJson {
    let mut out = task_to_json(task);
    if let Some(matcher) = matcher {
        out.matched = matcher
            .matched_fields(task)
            .into_iter()
            .map(MatchField::as_str)
            .collect();
    }
    out
}

fn cmd_show(dir: &Path, args: IdArg, json: bool) -> CmdResult {
    let store = open_store(dir)?;
    let id = resolve(&store, &args.id)?;
    let task = store
        .get_task(&id)
        .ok_or_else(|| TaskError::NotFound(args.id.clone()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task_to_json(task))?);
    } else {
        print_lines(format_task_detail(task));
    }
    Ok(())
}

fn cmd_stats(dir: &Path, json: bool) -> CmdResult {
    let store = open_store(dir)?;
    let stats = store.stats();
    let storage = store.repository().storage_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&StatsJson { stats, storage })?);
    } else {
        print_lines(format_stats(&stats, &storage));
    }
    Ok(())
}

fn cmd_export(dir: &Path, args: ExportArgs) -> CmdResult {
    let store = open_store(dir)?;
    let backup = store.repository().export(store.tasks())?;
    match args.file {
        Some(file) => {
            let path = PathBuf::from(&file);
            atomic_write(&path, backup.as_bytes())
                .map_err(|e| format!("could not write {}: {}", file, e))?;
            eprintln!("exported {} tasks to {}", store.tasks().len(), file);
        }
        None => println!("{}", backup),
    }
    Ok(())
}

fn cmd_recovery(dir: &Path, args: RecoveryCmd, json: bool) -> CmdResult {
    match args.action {
        Some(RecoveryAction::Path) => {
            let path = recovery_log_path(dir);
            let abs = std::fs::canonicalize(dir)
                .map(|d| recovery_log_path(&d))
                .unwrap_or(path);
            println!("{}", abs.display());
            Ok(())
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = prune
                .before
                .as_deref()
                .map(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| format!("invalid --before timestamp '{}': {}", s, e))
                })
                .transpose()?;
            let removed = recovery::prune_recovery(dir, before, prune.all)?;
            if json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("removed {} recovery entries", removed);
            }
            Ok(())
        }
        None => {
            let entries = recovery::read_recovery_entries(dir, Some(args.limit.unwrap_or(10)));
            if json {
                println!("{}", serde_json::to_string_pretty(&recovery_to_json(&entries))?);
            } else if entries.is_empty() {
                println!("recovery log is empty");
            } else {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    print_lines(format_recovery_entry(entry));
                }
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(dir: &Path, args: AddArgs, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;

    let mut draft = TaskDraft::new(args.title);
    draft.subtitle = args.subtitle;
    draft.description = args.description;
    draft.notes = args.notes;
    draft.priority = args.priority.as_deref().map(parse_priority).transpose()?;

    let id = store.add_task(&draft).ok_or(TaskError::BlankTitle)?;
    ensure_saved(&store)?;

    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_toggle(dir: &Path, args: IdArg, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;
    let id = resolve(&store, &args.id)?;
    store.toggle_task(&id);
    ensure_saved(&store)?;

    if let Some(task) = store.get_task(&id) {
        if json {
            println!("{}", serde_json::to_string_pretty(&task_to_json(task))?);
        } else {
            println!("{}", format_task_line(task));
        }
    }
    Ok(())
}

fn cmd_edit(dir: &Path, args: EditArgs) -> CmdResult {
    let mut store = open_store(dir)?;
    let id = resolve(&store, &args.id)?;

    if args.title.as_deref().is_some_and(is_blank) {
        return Err(TaskError::BlankTitle.into());
    }
    let patch = TaskPatch {
        title: args.title,
        subtitle: args.subtitle,
        description: args.description,
        notes: args.notes,
        priority: args.priority.as_deref().map(parse_priority).transpose()?,
        completed: None,
    };
    if patch.is_empty() {
        return Err("nothing to change (pass --title, --subtitle, --description, --notes or --priority)".into());
    }

    if store.update_task(&id, &patch) {
        ensure_saved(&store)?;
    } else {
        eprintln!("no changes");
    }
    Ok(())
}

fn cmd_rm(dir: &Path, args: IdArg) -> CmdResult {
    let mut store = open_store(dir)?;
    let id = resolve(&store, &args.id)?;
    store.delete_task(&id);
    ensure_saved(&store)
}

fn cmd_mv(dir: &Path, args: MvArgs) -> CmdResult {
    let mut store = open_store(dir)?;
    let len = store.tasks().len();
    if args.from >= len || args.to >= len {
        return Err(TaskError::InvalidPosition(format!(
            "{} -> {} out of range for {} tasks",
            args.from, args.to, len
        ))
        .into());
    }
    store.reorder(args.from, args.to);
    ensure_saved(&store)
}

fn cmd_sub(dir: &Path, args: SubCmd, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;

    match args.action {
        SubAction::Add(a) => {
            let task_id = resolve(&store, &a.id)?;
            let sub_id = store
                .add_subtask(&task_id, &a.title)
                .ok_or(TaskError::BlankTitle)?;
            ensure_saved(&store)?;
            if json {
                println!("{}", serde_json::json!({ "id": sub_id, "task": task_id }));
            } else {
                println!("{}", sub_id);
            }
        }
        SubAction::Toggle(a) => {
            let task_id = resolve(&store, &a.id)?;
            let sub_id = resolve_subtask(&store, &task_id, &a.sub_id)?;
            store.toggle_subtask(&task_id, &sub_id);
            ensure_saved(&store)?;
        }
        SubAction::Edit(a) => {
            let task_id = resolve(&store, &a.id)?;
            let sub_id = resolve_subtask(&store, &task_id, &a.sub_id)?;
            if is_blank(&a.title) {
                return Err(TaskError::BlankTitle.into());
            }
            let patch = SubtaskPatch {
                title: Some(a.title),
                completed: None,
            };
            if store.update_subtask(&task_id, &sub_id, &patch) {
                ensure_saved(&store)?;
            } else {
                eprintln!("no changes");
            }
        }
        SubAction::Rm(a) => {
            let task_id = resolve(&store, &a.id)?;
            let sub_id = resolve_subtask(&store, &task_id, &a.sub_id)?;
            store.delete_subtask(&task_id, &sub_id);
            ensure_saved(&store)?;
        }
    }
    Ok(())
}

fn cmd_set_completed(dir: &Path, args: IdsArg, completed: bool, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;
    let ids = args
        .ids
        .iter()
        .map(|prefix| resolve(&store, prefix))
        .collect::<Result<Vec<_>, _>>()?;

    let changed = store.bulk_set_completed(&ids, completed);
    ensure_saved(&store)?;
    print_changed(changed, if completed { "completed" } else { "reopened" }, json)
}

fn cmd_clear_done(dir: &Path, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;
    let removed = store.clear_completed();
    ensure_saved(&store)?;
    print_changed(removed, "removed", json)
}

fn cmd_import(dir: &Path, args: ImportArgs, json: bool) -> CmdResult {
    let mut store = open_store(dir)?;
    let text = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("could not read {}: {}", args.file, e))?;
    let tasks = store.repository().import(&text)?;
    let count = tasks.len();

    store.replace_tasks(tasks);
    ensure_saved(&store)?;
    print_changed(count, "imported", json)
}
