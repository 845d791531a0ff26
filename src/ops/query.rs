use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::model::task::{SortBy, Task, TaskFilter, TaskStats};
use crate::util::unicode::{is_blank, trim_blank};

/// Which text field of a task matched a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Title,
    Subtitle,
    Description,
    Notes,
    Subtask,
}

impl MatchField {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchField::Title => "title",
            MatchField::Subtitle => "subtitle",
            MatchField::Description => "description",
            MatchField::Notes => "notes",
            MatchField::Subtask => "subtask",
        }
    }
}

/// Case-insensitive literal substring matcher for a search query.
#[derive(Debug, Clone)]
pub struct SearchMatcher {
    re: Option<Regex>,
    lowered: String,
}

impl SearchMatcher {
    /// Build a matcher. Returns None for an empty or whitespace-only query.
    pub fn new(query: &str) -> Option<Self> {
        if is_blank(query) {
            return None;
        }
        let needle = trim_blank(query);
        let re = RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .ok();
        Some(SearchMatcher {
            re,
            lowered: needle.to_lowercase(),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.re {
            Some(re) => re.is_match(text),
            None => text.to_lowercase().contains(&self.lowered),
        }
    }

    /// Match against the space-joined searchable text of a task.
    pub fn matches_task(&self, task: &Task) -> bool {
        self.is_match(&searchable_text(task))
    }

    /// The individual fields that contain the query on their own.
    pub fn matched_fields(&self, task: &Task) -> Vec<MatchField> {
        let mut fields = Vec::new();
        if self.is_match(&task.title) {
            fields.push(MatchField::Title);
        }
        let optional = [
            (MatchField::Subtitle, &task.subtitle),
            (MatchField::Description, &task.description),
            (MatchField::Notes, &task.notes),
        ];
        for (field, text) in optional {
            if text.as_deref().is_some_and(|t| self.is_match(t)) {
                fields.push(field);
            }
        }
        if task.subtasks.iter().any(|s| self.is_match(&s.title)) {
            fields.push(MatchField::Subtask);
        }
        fields
    }
}

/// Title, optional text fields and subtask titles joined with spaces.
pub fn searchable_text(task: &Task) -> String {
    let mut parts: Vec<&str> = vec![&task.title];
    parts.extend(task.subtitle.as_deref());
    parts.extend(task.description.as_deref());
    parts.extend(task.notes.as_deref());
    parts.extend(task.subtasks.iter().map(|s| s.title.as_str()));
    parts.join(" ")
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

pub fn filter_by_status(tasks: &[Task], filter: TaskFilter) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| match filter {
            TaskFilter::All => true,
            TaskFilter::Active => !t.completed,
            TaskFilter::Done => t.completed,
        })
        .cloned()
        .collect()
}

pub fn filter_by_search(tasks: &[Task], query: &str) -> Vec<Task> {
    match SearchMatcher::new(query) {
        Some(matcher) => tasks
            .iter()
            .filter(|t| matcher.matches_task(t))
            .cloned()
            .collect(),
        None => tasks.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Incomplete first, then the `sort_by` key, then newest creation first.
pub fn compare_tasks(a: &Task, b: &Task, sort_by: SortBy) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| match sort_by {
            SortBy::Priority => b.priority.cmp(&a.priority),
            SortBy::Updated => b.last_touched().cmp(&a.last_touched()),
            SortBy::Created => Ordering::Equal,
        })
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Stable sort into a new vector.
pub fn sort_tasks(tasks: &[Task], sort_by: SortBy) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| compare_tasks(a, b, sort_by));
    sorted
}

/// Status filter, then search, then sort.
pub fn derive_view(tasks: &[Task], filter: TaskFilter, query: &str, sort_by: SortBy) -> Vec<Task> {
    let by_status = filter_by_status(tasks, filter);
    let searched = filter_by_search(&by_status, query);
    sort_tasks(&searched, sort_by)
}

pub fn task_stats(tasks: &[Task]) -> TaskStats {
    let completed = tasks.iter().filter(|t| t.completed).count();
    TaskStats {
        total: tasks.len(),
        active: tasks.len() - completed,
        completed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::{Priority, Subtask};
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn task(id: &str, title: &str, priority: Priority, completed: bool, created: &str) -> Task {
        let mut t = Task::new(id.into(), title.into(), ts(created));
        t.priority = priority;
        t.completed = completed;
        t
    }

    fn sample() -> Vec<Task> {
        let mut groceries = task("a", "Buy Milk", Priority::Low, false, "2025-05-01T00:00:00Z");
        groceries.description = Some("From the corner shop".into());
        let mut report = task("b", "Write report", Priority::High, false, "2025-05-02T00:00:00Z");
        report.subtasks.push(Subtask::new("s1".into(), "Collect figures".into(), ts("2025-05-02T00:00:00Z")));
        let mut call = task("c", "Call plumber", Priority::Medium, true, "2025-05-03T00:00:00Z");
        call.notes = Some("Kitchen sink".into());
        let mut taxes = task("d", "File taxes", Priority::High, false, "2025-05-04T00:00:00Z");
        taxes.subtitle = Some("Before April".into());
        vec![groceries, report, call, taxes]
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn status_filter_partitions_collection() {
        let tasks = sample();
        let active = filter_by_status(&tasks, TaskFilter::Active);
        let done = filter_by_status(&tasks, TaskFilter::Done);
        assert_eq!(ids(&active), vec!["a", "b", "d"]);
        assert_eq!(ids(&done), vec!["c"]);
        assert_eq!(active.len() + done.len(), tasks.len());
        assert_eq!(filter_by_status(&tasks, TaskFilter::All), tasks);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let tasks = sample();
        assert_eq!(ids(&filter_by_search(&tasks, "milk")), vec!["a"]);
        assert_eq!(ids(&filter_by_search(&tasks, "MILK")), vec!["a"]);
        assert_eq!(ids(&filter_by_search(&tasks, "  ort ")), vec!["b"]);
    }

    #[test]
    fn search_covers_optional_fields_and_subtasks() {
        let tasks = sample();
        assert_eq!(ids(&filter_by_search(&tasks, "corner")), vec!["a"]);
        assert_eq!(ids(&filter_by_search(&tasks, "sink")), vec!["c"]);
        assert_eq!(ids(&filter_by_search(&tasks, "april")), vec!["d"]);
        assert_eq!(ids(&filter_by_search(&tasks, "figures")), vec!["b"]);
    }

    #[test]
    fn search_spans_joined_fields() {
        let tasks = sample();
        assert_eq!(ids(&filter_by_search(&tasks, "taxes before")), vec!["d"]);
    }

    #[test]
    fn search_treats_query_literally() {
        let mut tasks = sample();
        tasks[0].title = "Fix a.b (urgent)".into();
        assert_eq!(ids(&filter_by_search(&tasks, "a.b (")), vec!["a"]);
        assert!(filter_by_search(&tasks, "a*b").is_empty());
    }

    #[test]
    fn search_unicode_case_folding() {
        let mut tasks = sample();
        tasks[0].title = "ÉTÉ plans".into();
        assert_eq!(ids(&filter_by_search(&tasks, "été")), vec!["a"]);
    }

    #[test]
    fn blank_query_returns_input() {
        let tasks = sample();
        assert_eq!(filter_by_search(&tasks, ""), tasks);
        assert_eq!(filter_by_search(&tasks, " \u{00A0} "), tasks);
    }

    #[test]
    fn matched_fields_reports_each_field() {
        let tasks = sample();
        let matcher = SearchMatcher::new("sink").unwrap();
        assert_eq!(matcher.matched_fields(&tasks[2]), vec![MatchField::Notes]);
        let matcher = SearchMatcher::new("r").unwrap();
        assert_eq!(
            matcher.matched_fields(&tasks[1]),
            vec![MatchField::Title, MatchField::Subtask]
        );
    }

    #[test]
    fn sort_by_priority() {
        let sorted = sort_tasks(&sample(), SortBy::Priority);
        // incomplete high (newest first), then medium/low, completed last
        assert_eq!(ids(&sorted), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn sort_by_created() {
        let sorted = sort_tasks(&sample(), SortBy::Created);
        assert_eq!(ids(&sorted), vec!["d", "b", "a", "c"]);
        let mut tasks = sample();
        tasks[3].created_at = ts("2024-01-01T00:00:00Z");
        assert_eq!(ids(&sort_tasks(&tasks, SortBy::Created)), vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn sort_by_updated_falls_back_to_created() {
        let mut tasks = sample();
        tasks[0].updated_at = Some(ts("2025-06-01T00:00:00Z"));
        let sorted = sort_tasks(&tasks, SortBy::Updated);
        assert_eq!(ids(&sorted), vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn sort_is_stable_on_full_ties() {
        let tasks = vec![
            task("x", "One", Priority::Medium, false, "2025-05-01T00:00:00Z"),
            task("y", "Two", Priority::Medium, false, "2025-05-01T00:00:00Z"),
            task("z", "Three", Priority::Medium, false, "2025-05-01T00:00:00Z"),
        ];
        assert_eq!(ids(&sort_tasks(&tasks, SortBy::Priority)), vec!["x", "y", "z"]);
    }

    #[test]
    fn derive_view_composes_without_mutating_input() {
        let tasks = sample();
        let before = tasks.clone();
        let view = derive_view(&tasks, TaskFilter::Active, "i", SortBy::Priority);
        // "i" matches Milk, Write report (Write), File taxes; not the done task
        assert_eq!(ids(&view), vec!["d", "b", "a"]);
        assert_eq!(tasks, before);
    }

    #[test]
    fn stats_counts() {
        let stats = task_stats(&sample());
        assert_eq!(
            stats,
            TaskStats {
                total: 4,
                active: 3,
                completed: 1,
            }
        );
        assert_eq!(task_stats(&[]), TaskStats::default());
    }
}
