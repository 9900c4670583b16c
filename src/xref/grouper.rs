//! Splitting of cross-reference records into subsections.
//!
//! Both the `xref` table and the `/Index` array of a cross-reference stream
//! describe entries as runs of consecutive object numbers.

/// Sort `items` by `key` and split them into maximal runs of consecutive keys.
///
/// Items sharing a key keep only their first occurrence (in input order).
pub fn group<T, F>(items: Vec<T>, key: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> u32,
{
    let mut items = items;
    items.sort_by_key(|item| key(item));
    items.dedup_by_key(|item| key(item));

    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut last: Option<u32> = None;
    for item in items {
        let id = key(&item);
        match (last, groups.last_mut()) {
            (Some(prev), Some(run)) if prev.checked_add(1) == Some(id) => run.push(item),
            _ => groups.push(vec![item]),
        }
        last = Some(id);
    }
    groups
}

/// `(first id, count)` of each run.
pub fn ranges<T, F>(groups: &[Vec<T>], key: F) -> Vec<(u32, usize)>
where
    F: Fn(&T) -> u32,
{
    groups
        .iter()
        .filter_map(|run| run.first().map(|first| (key(first), run.len())))
        .collect()
}
