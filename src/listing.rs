use std::cmp::Ordering;

use crate::models::Task;

pub const PAGE_SIZES: [usize; 4] = [10, 20, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One presented table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub runs: usize,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        TaskRow {
            id: task.id.clone(),
            name: task.name.clone(),
            owner: task.owner.clone(),
            runs: task.run_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameSort {
    #[default]
    None,
    Ascending,
    Descending,
}

impl NameSort {
    /// Next state of the column header toggle.
    pub fn cycle(self) -> Self {
        match self {
            NameSort::None => NameSort::Ascending,
            NameSort::Ascending => NameSort::Descending,
            NameSort::Descending => NameSort::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NameSort::None => "",
            NameSort::Ascending => " ▲",
            NameSort::Descending => " ▼",
        }
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Derives table rows from the held list; ordering is the service's unless sorted by name.
pub fn rows(tasks: &[Task], sort: NameSort) -> Vec<TaskRow> {
    let mut rows: Vec<TaskRow> = tasks.iter().map(TaskRow::from).collect();
    match sort {
        NameSort::None => {}
        NameSort::Ascending => rows.sort_by(|a, b| compare_names(&a.name, &b.name)),
        NameSort::Descending => rows.sort_by(|a, b| compare_names(&b.name, &a.name)),
    }
    rows
}

/// Client-side slicing of an already-fetched row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub size: usize,
    pub index: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Pager::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pager {
    pub fn new(size: usize) -> Self {
        Pager {
            size: size.max(1),
            index: 0,
        }
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.size).max(1)
    }

    /// Keeps the page index valid after the row set shrank.
    pub fn clamp(&mut self, total: usize) {
        self.index = self.index.min(self.page_count(total) - 1);
    }

    pub fn next(&mut self, total: usize) {
        if self.index + 1 < self.page_count(total) {
            self.index += 1;
        }
    }

    pub fn previous(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Steps through [`PAGE_SIZES`], returning to the first page.
    pub fn cycle_size(&mut self) {
        let pos = PAGE_SIZES.iter().position(|s| *s == self.size).unwrap_or(0);
        self.size = PAGE_SIZES[(pos + 1) % PAGE_SIZES.len()];
        self.index = 0;
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.index * self.size).min(items.len());
        let end = (start + self.size).min(items.len());
        &items[start..end]
    }
}

/// Search input line. Submissions fire only on explicit submit, never per keystroke.
#[derive(Debug, Clone, Default)]
pub struct SearchBox {
    pub input: String,
    pub editing: bool,
}

impl SearchBox {
    pub fn begin(&mut self) {
        self.editing = true;
    }

    pub fn push(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Leaves edit mode without firing a search.
    pub fn abandon(&mut self) {
        self.editing = false;
    }

    /// The fragment to hand to refresh, verbatim; empty clears the filter.
    pub fn submit(&mut self) -> String {
        self.editing = false;
        self.input.clone()
    }

    /// Empties the box and yields the fragment that clears the filter.
    pub fn clear(&mut self) -> String {
        self.input.clear();
        self.submit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{execution, task};

    fn sample() -> Vec<Task> {
        let mut deploy = task("T1", "deploy", "Jane", "echo hi");
        deploy.task_executions = vec![
            execution("2024-05-01T10:00:00Z", "2024-05-01T10:00:01Z", ""),
            execution("2024-05-02T10:00:00Z", "2024-05-02T10:00:01Z", ""),
        ];
        vec![
            deploy,
            task("T2", "Backup", "Bob", "tar -czf a.tgz ."),
            task("T3", "cleanup", "Ann", "rm -rf /tmp/x"),
        ]
    }

    #[test]
    fn test_rows_carry_run_count() {
        let rows = rows(&sample(), NameSort::None);
        assert_eq!(rows.iter().map(|r| r.runs).collect::<Vec<_>>(), vec![2, 0, 0]);
        assert_eq!(rows[0].id, "T1");
    }

    #[test]
    fn test_sort_by_name_ignores_case() {
        let asc: Vec<String> = rows(&sample(), NameSort::Ascending)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(asc, vec!["Backup", "cleanup", "deploy"]);

        let desc: Vec<String> = rows(&sample(), NameSort::Descending)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(desc, vec!["deploy", "cleanup", "Backup"]);
    }

    #[test]
    fn test_sort_cycle_returns_to_service_order() {
        let sort = NameSort::default().cycle().cycle().cycle();
        assert_eq!(sort, NameSort::None);
    }

    #[test]
    fn test_pager_slices_and_clamps() {
        let items: Vec<usize> = (0..25).collect();
        let mut pager = Pager::new(10);
        assert_eq!(pager.page_count(items.len()), 3);
        pager.next(items.len());
        pager.next(items.len());
        pager.next(items.len());
        assert_eq!(pager.index, 2);
        assert_eq!(pager.slice(&items), &[20, 21, 22, 23, 24]);

        pager.clamp(8);
        assert_eq!(pager.index, 0);
        assert_eq!(pager.slice(&items[..8]).len(), 8);
    }

    #[test]
    fn test_pager_size_cycle() {
        let mut pager = Pager::new(100);
        pager.index = 3;
        pager.cycle_size();
        assert_eq!(pager.size, 10);
        assert_eq!(pager.index, 0);
    }

    #[test]
    fn test_search_box_submits_verbatim() {
        let mut search = SearchBox::default();
        search.begin();
        for c in " Deploy".chars() {
            search.push(c);
        }
        assert_eq!(search.submit(), " Deploy");
        assert!(!search.editing);
        assert_eq!(search.clear(), "");
    }
}
